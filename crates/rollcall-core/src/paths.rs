//! Data-directory layout shared by the daemon and the CLI.

use std::path::PathBuf;

/// Resolved locations of everything rollcall persists.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub root: PathBuf,
    /// One subfolder per person, JPEG reference images inside.
    pub dataset_dir: PathBuf,
    /// Serialized {encodings, names} store.
    pub encodings_file: PathBuf,
    /// Append-only attendance CSV.
    pub ledger_file: PathBuf,
    /// JSON credential store.
    pub users_file: PathBuf,
    /// ONNX model directory.
    pub model_dir: PathBuf,
}

impl DataPaths {
    /// Resolve the data root: explicit override, else `ROLLCALL_DATA_DIR`,
    /// else `$XDG_DATA_HOME/rollcall`, else `~/.local/share/rollcall`.
    pub fn resolve(root_override: Option<PathBuf>) -> DataPaths {
        let root = root_override
            .or_else(|| std::env::var("ROLLCALL_DATA_DIR").map(PathBuf::from).ok())
            .unwrap_or_else(|| {
                std::env::var("XDG_DATA_HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| {
                        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                        PathBuf::from(home).join(".local/share")
                    })
                    .join("rollcall")
            });

        let model_dir = std::env::var("ROLLCALL_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| root.join("models"));

        DataPaths {
            dataset_dir: root.join("dataset"),
            encodings_file: root.join("encodings.json"),
            ledger_file: root.join("attendance_log.csv"),
            users_file: root.join("users.json"),
            model_dir,
            root,
        }
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model(&self) -> PathBuf {
        self.model_dir.join("det_10g.onnx")
    }

    /// Path to the ArcFace embedding model.
    pub fn embedder_model(&self) -> PathBuf {
        self.model_dir.join("w600k_r50.onnx")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_wins() {
        let paths = DataPaths::resolve(Some(PathBuf::from("/srv/rollcall")));
        assert_eq!(paths.root, PathBuf::from("/srv/rollcall"));
        assert_eq!(paths.dataset_dir, PathBuf::from("/srv/rollcall/dataset"));
        assert_eq!(paths.ledger_file, PathBuf::from("/srv/rollcall/attendance_log.csv"));
        assert_eq!(paths.encodings_file, PathBuf::from("/srv/rollcall/encodings.json"));
        assert_eq!(paths.users_file, PathBuf::from("/srv/rollcall/users.json"));
    }

    #[test]
    fn test_model_paths() {
        let paths = DataPaths {
            root: PathBuf::from("/d"),
            dataset_dir: PathBuf::from("/d/dataset"),
            encodings_file: PathBuf::from("/d/encodings.json"),
            ledger_file: PathBuf::from("/d/attendance_log.csv"),
            users_file: PathBuf::from("/d/users.json"),
            model_dir: PathBuf::from("/d/models"),
        };
        assert_eq!(paths.detector_model(), PathBuf::from("/d/models/det_10g.onnx"));
        assert_eq!(paths.embedder_model(), PathBuf::from("/d/models/w600k_r50.onnx"));
    }
}
