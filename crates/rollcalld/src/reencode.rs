//! Re-encoding subprocess runner.
//!
//! Rebuilding the encoding store walks every dataset image through both
//! ONNX models, which can take minutes on a large dataset. Running it in
//! a subprocess keeps the daemon's own models and camera loop
//! undisturbed and puts a hard timeout around the whole pass.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum ReencodeError {
    #[error("failed to spawn encoder {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("encoder timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("encoder exited with {code}: {stderr}")]
    Failed { code: i32, stderr: String },
}

/// Run `program args...` with `ROLLCALL_DATA_DIR` pointed at `data_dir`,
/// killed if it exceeds `timeout`. Returns the subprocess stdout.
pub async fn run_reencode(
    program: &str,
    args: &[&str],
    data_dir: &Path,
    timeout: Duration,
) -> Result<String, ReencodeError> {
    tracing::info!(program, ?args, data_dir = %data_dir.display(), "re-encoding dataset");

    let child = Command::new(program)
        .args(args)
        .env("ROLLCALL_DATA_DIR", data_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ReencodeError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => {
            return Err(ReencodeError::Spawn {
                program: program.to_string(),
                source,
            })
        }
        Err(_) => {
            tracing::warn!(secs = timeout.as_secs(), "re-encode timed out, process killed");
            return Err(ReencodeError::Timeout { secs: timeout.as_secs() });
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let code = output.status.code().unwrap_or(-1);
        tracing::warn!(code, stderr = %stderr, "re-encode failed");
        return Err(ReencodeError::Failed { code, stderr });
    }

    tracing::info!("re-encode finished");
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
