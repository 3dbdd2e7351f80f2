use rollcall_core::paths::DataPaths;
use rollcall_core::pipeline::ProcessorSettings;
use rollcall_core::MatchStrategy;
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Resolved data-directory layout.
    pub paths: DataPaths,
    /// Run recognition on every Nth captured frame.
    pub every_nth: u32,
    /// Integer downsampling factor applied before detection.
    pub downsample: u32,
    /// Minimum face width/height in full-resolution pixels.
    pub min_face_size: u32,
    /// Seconds between two ledger marks for the same person.
    pub cooldown_secs: u64,
    /// Match distance tolerance.
    pub match_tolerance: f32,
    pub match_strategy: MatchStrategy,
    /// Liveness displacement threshold; unset disables the gate.
    pub liveness_threshold: Option<f32>,
    /// Timeout for the re-encoding subprocess.
    pub encode_timeout_secs: u64,
    /// Program spawned to rebuild the encoding store.
    pub encode_program: String,
    /// Where the annotated preview JPEG is written, if anywhere.
    pub preview_path: Option<PathBuf>,
    /// Number of warmup frames to discard at startup (camera AGC/AE
    /// stabilization).
    pub warmup_frames: usize,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            camera_device: std::env::var("ROLLCALL_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            paths: DataPaths::resolve(None),
            every_nth: env_u32("ROLLCALL_EVERY_NTH_FRAME", 5).max(1),
            downsample: env_u32("ROLLCALL_DOWNSAMPLE", 2).max(1),
            min_face_size: env_u32("ROLLCALL_MIN_FACE_SIZE", 100),
            cooldown_secs: env_u64("ROLLCALL_COOLDOWN_SECS", 60),
            match_tolerance: env_f32("ROLLCALL_MATCH_TOLERANCE", 1.1),
            match_strategy: MatchStrategy::parse(
                &std::env::var("ROLLCALL_MATCH_STRATEGY").unwrap_or_default(),
            ),
            liveness_threshold: std::env::var("ROLLCALL_LIVENESS_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok()),
            encode_timeout_secs: env_u64("ROLLCALL_ENCODE_TIMEOUT_SECS", 60),
            encode_program: std::env::var("ROLLCALL_ENCODE_PROGRAM")
                .unwrap_or_else(|_| "rollcall".to_string()),
            preview_path: std::env::var("ROLLCALL_PREVIEW_PATH").map(PathBuf::from).ok(),
            warmup_frames: env_u64("ROLLCALL_WARMUP_FRAMES", 4) as usize,
        }
    }

    pub fn processor_settings(&self) -> ProcessorSettings {
        ProcessorSettings {
            every_nth: self.every_nth,
            downsample: self.downsample,
            min_face_size: self.min_face_size,
            cooldown: Duration::from_secs(self.cooldown_secs),
            tolerance: self.match_tolerance,
            strategy: self.match_strategy,
            liveness: self.liveness_threshold,
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
