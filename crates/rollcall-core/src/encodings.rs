//! Known-face encoding store.
//!
//! The store is a JSON file holding two parallel sequences: one encoding
//! vector and one name per enrolled reference image. It is loaded as a
//! unit, replaced wholesale by the re-encoding pass, and never updated
//! in place. `EncodingStore` is the reloadable handle shared between the
//! frame processor and the dataset-management path.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncodingStoreError {
    #[error("failed to read encoding store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("encoding store {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("encoding store has {encodings} encodings but {names} names")]
    LengthMismatch { encodings: usize, names: usize },
}

/// Serialized form of the store: parallel (encoding, name) sequences.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncodingData {
    pub encodings: Vec<Vec<f32>>,
    pub names: Vec<String>,
}

impl EncodingData {
    /// Load from `path`. A missing file yields an empty store; a present
    /// but unreadable or malformed file is an error.
    pub fn load(path: &Path) -> Result<EncodingData, EncodingStoreError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "encoding store absent, starting empty");
            return Ok(EncodingData::default());
        }

        let raw = std::fs::read(path).map_err(|source| EncodingStoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let data: EncodingData =
            serde_json::from_slice(&raw).map_err(|source| EncodingStoreError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        if data.encodings.len() != data.names.len() {
            return Err(EncodingStoreError::LengthMismatch {
                encodings: data.encodings.len(),
                names: data.names.len(),
            });
        }

        Ok(data)
    }

    /// Persist to `path` via a sibling temp file and rename, so a crashed
    /// writer never leaves a truncated store behind.
    pub fn save(&self, path: &Path) -> Result<(), EncodingStoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| EncodingStoreError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }

        let tmp = path.with_extension("json.tmp");
        let raw = serde_json::to_vec(self).map_err(|source| EncodingStoreError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(&tmp, raw).map_err(|source| EncodingStoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, path).map_err(|source| EncodingStoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Clone-safe, explicitly reloadable handle to the encoding store.
///
/// Readers take a cheap `Arc` snapshot per frame; `reload` swaps the
/// whole structure after the re-encoding pass rewrites the file.
#[derive(Clone)]
pub struct EncodingStore {
    path: PathBuf,
    data: Arc<RwLock<Arc<EncodingData>>>,
}

impl EncodingStore {
    /// Open the store at `path`, loading current contents (empty if absent).
    pub fn open(path: impl Into<PathBuf>) -> Result<EncodingStore, EncodingStoreError> {
        let path = path.into();
        let data = EncodingData::load(&path)?;
        tracing::info!(path = %path.display(), entries = data.len(), "encoding store loaded");
        Ok(EncodingStore {
            path,
            data: Arc::new(RwLock::new(Arc::new(data))),
        })
    }

    /// Re-read the file and replace the cached copy. Returns the new
    /// entry count. Required after the dataset changes and the encoder
    /// has rewritten the file.
    pub fn reload(&self) -> Result<usize, EncodingStoreError> {
        let fresh = EncodingData::load(&self.path)?;
        let count = fresh.len();
        *self.data.write().expect("encoding store lock poisoned") = Arc::new(fresh);
        tracing::info!(path = %self.path.display(), entries = count, "encoding store reloaded");
        Ok(count)
    }

    /// Current contents. The snapshot stays valid across a concurrent reload.
    pub fn snapshot(&self) -> Arc<EncodingData> {
        Arc::clone(&self.data.read().expect("encoding store lock poisoned"))
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EncodingData {
        EncodingData {
            encodings: vec![vec![0.1, 0.2], vec![0.3, 0.4]],
            names: vec!["alice".into(), "bob".into()],
        }
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let data = EncodingData::load(&dir.path().join("nope.json")).unwrap();
        assert!(data.is_empty());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encodings.json");
        sample().save(&path).unwrap();

        let loaded = EncodingData::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.names, vec!["alice", "bob"]);
        assert_eq!(loaded.encodings[1], vec![0.3, 0.4]);
    }

    #[test]
    fn test_load_rejects_length_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encodings.json");
        std::fs::write(&path, r#"{"encodings": [[1.0]], "names": []}"#).unwrap();
        assert!(matches!(
            EncodingData::load(&path),
            Err(EncodingStoreError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encodings.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            EncodingData::load(&path),
            Err(EncodingStoreError::Parse { .. })
        ));
    }

    #[test]
    fn test_store_reload_picks_up_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encodings.json");

        let store = EncodingStore::open(&path).unwrap();
        assert!(store.is_empty());

        sample().save(&path).unwrap();
        // Cached copy is unchanged until an explicit reload.
        assert!(store.is_empty());

        let count = store.reload().unwrap();
        assert_eq!(count, 2);
        assert_eq!(store.snapshot().names[0], "alice");
    }

    #[test]
    fn test_snapshot_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encodings.json");
        sample().save(&path).unwrap();

        let store = EncodingStore::open(&path).unwrap();
        let before = store.snapshot();

        EncodingData::default().save(&path).unwrap();
        store.reload().unwrap();

        assert_eq!(before.len(), 2);
        assert!(store.is_empty());
    }
}
