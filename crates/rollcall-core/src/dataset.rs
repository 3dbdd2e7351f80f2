//! Dataset manager: one folder per person, JPEG reference images inside.
//!
//! Mutations here only touch the image tree. Recognition does not see a
//! change until the re-encoding pass rewrites the encoding store and the
//! store handle is reloaded; that two-step protocol is the caller's
//! responsibility. Deleting a person never removes their ledger history.

use chrono::Local;
use std::path::{Path, PathBuf};
use thiserror::Error;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("person name is empty after sanitization")]
    EmptyName,
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("dataset io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Normalize a person name to a filesystem-safe folder name: trimmed,
/// spaces collapsed to underscores.
pub fn sanitize_name(name: &str) -> String {
    name.trim().split_whitespace().collect::<Vec<_>>().join("_")
}

/// Dataset directory handle.
#[derive(Debug, Clone)]
pub struct Dataset {
    dir: PathBuf,
}

impl Dataset {
    pub fn new(dir: impl Into<PathBuf>) -> Dataset {
        Dataset { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Decode `bytes`, convert to RGB, and save as a uniquely
    /// timestamped JPEG in the person's folder. Returns the saved path.
    pub fn save_image(&self, bytes: &[u8], person: &str) -> Result<PathBuf, DatasetError> {
        let folder = sanitize_name(person);
        if folder.is_empty() {
            return Err(DatasetError::EmptyName);
        }

        let person_dir = self.dir.join(&folder);
        std::fs::create_dir_all(&person_dir)
            .map_err(|source| DatasetError::Io { path: person_dir.clone(), source })?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S_%f");
        let path = person_dir.join(format!("{folder}_{stamp}.jpg"));

        let decoded = image::load_from_memory(bytes)?;
        decoded.to_rgb8().save(&path)?;

        tracing::info!(person = %folder, path = %path.display(), "dataset image saved");
        Ok(path)
    }

    /// Remove a person's entire folder. `Ok(false)` when no folder exists.
    pub fn delete_person(&self, person: &str) -> Result<bool, DatasetError> {
        let folder = sanitize_name(person);
        if folder.is_empty() {
            return Err(DatasetError::EmptyName);
        }

        let person_dir = self.dir.join(&folder);
        if !person_dir.exists() {
            return Ok(false);
        }

        std::fs::remove_dir_all(&person_dir)
            .map_err(|source| DatasetError::Io { path: person_dir.clone(), source })?;
        tracing::info!(person = %folder, "dataset person removed");
        Ok(true)
    }

    /// Sorted person folder names. Missing dataset dir lists as empty.
    pub fn list_people(&self) -> Result<Vec<String>, DatasetError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.dir)
            .map_err(|source| DatasetError::Io { path: self.dir.clone(), source })?;

        let mut people = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|source| DatasetError::Io { path: self.dir.clone(), source })?;
            if entry.path().is_dir() {
                people.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        people.sort();
        Ok(people)
    }

    /// Number of image files in a person's folder.
    pub fn image_count(&self, person: &str) -> Result<usize, DatasetError> {
        Ok(self.person_images(person)?.len())
    }

    /// Image file paths (jpg/jpeg/png) for one person, sorted.
    pub fn person_images(&self, person: &str) -> Result<Vec<PathBuf>, DatasetError> {
        let person_dir = self.dir.join(sanitize_name(person));
        if !person_dir.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&person_dir)
            .map_err(|source| DatasetError::Io { path: person_dir.clone(), source })?;

        let mut images = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|source| DatasetError::Io { path: person_dir.clone(), source })?;
            let path = entry.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if path.is_file() && is_image {
                images.push(path);
            }
        }
        images.sort();
        Ok(images)
    }
}
