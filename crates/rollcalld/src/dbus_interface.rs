//! D-Bus control surface for the attendance daemon.
//!
//! Bus name: org.rollcall.Attendance1
//! Object path: /org/rollcall/Attendance1
//!
//! Dataset mutations (add, remove, re-encode) run the full
//! mutate-reencode-reload sequence under one lock, so a recognition
//! session never observes a dataset that disagrees with the encoding
//! store for longer than a single call.

use crate::engine::EngineHandle;
use crate::reencode;
use rollcall_core::credentials::CredentialStore;
use rollcall_core::dataset::Dataset;
use rollcall_core::EncodingStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use zbus::interface;

pub struct AttendanceService {
    pub engine: EngineHandle,
    pub store: EncodingStore,
    pub dataset: Dataset,
    pub data_root: PathBuf,
    pub users_file: PathBuf,
    pub encode_program: String,
    pub encode_timeout: Duration,
    mutation_lock: Arc<Mutex<()>>,
}

impl AttendanceService {
    pub fn new(
        engine: EngineHandle,
        store: EncodingStore,
        dataset: Dataset,
        data_root: PathBuf,
        users_file: PathBuf,
        encode_program: String,
        encode_timeout: Duration,
    ) -> AttendanceService {
        AttendanceService {
            engine,
            store,
            dataset,
            data_root,
            users_file,
            encode_program,
            encode_timeout,
            mutation_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Rebuild the encoding store in a subprocess and reload the shared
    /// handle. Returns the new encoding count.
    async fn reencode_and_reload(&self) -> zbus::fdo::Result<u32> {
        reencode::run_reencode(
            &self.encode_program,
            &["encode"],
            &self.data_root,
            self.encode_timeout,
        )
        .await
        .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;

        let count = self
            .store
            .reload()
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        Ok(count as u32)
    }
}

#[interface(name = "org.rollcall.Attendance1")]
impl AttendanceService {
    /// Start the camera recognition session.
    async fn start_session(&self) -> zbus::fdo::Result<()> {
        tracing::info!("start_session requested");
        self.engine
            .start_session()
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Stop the camera recognition session.
    async fn stop_session(&self) -> zbus::fdo::Result<()> {
        tracing::info!("stop_session requested");
        self.engine
            .stop_session()
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Daemon status as a JSON object.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let status = self
            .engine
            .status()
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "session_running": status.running,
            "frames_seen": status.frames_seen,
            "marks": status.marks,
            "known_encodings": status.known_encodings,
        })
        .to_string())
    }

    /// Save a reference image for `name` (creating the person if new),
    /// then re-encode and reload. Returns the new encoding count.
    async fn add_person(&self, name: &str, image: Vec<u8>) -> zbus::fdo::Result<u32> {
        tracing::info!(name, bytes = image.len(), "add_person requested");
        let _guard = self.mutation_lock.lock().await;

        self.dataset
            .save_image(&image, name)
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;

        self.reencode_and_reload().await
    }

    /// Remove a person's reference images, then re-encode and reload.
    /// Returns false when no such person exists; ledger history is
    /// never touched.
    async fn remove_person(&self, name: &str) -> zbus::fdo::Result<bool> {
        tracing::info!(name, "remove_person requested");
        let _guard = self.mutation_lock.lock().await;

        let removed = self
            .dataset
            .delete_person(name)
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        if !removed {
            return Ok(false);
        }

        self.reencode_and_reload().await?;
        Ok(true)
    }

    /// Enrolled people with their reference-image counts, as JSON.
    async fn list_people(&self) -> zbus::fdo::Result<String> {
        let people = self
            .dataset
            .list_people()
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;

        let mut out = Vec::with_capacity(people.len());
        for name in people {
            let images = self
                .dataset
                .image_count(&name)
                .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
            out.push(serde_json::json!({ "name": name, "images": images }));
        }
        Ok(serde_json::Value::Array(out).to_string())
    }

    /// Re-encode the whole dataset and reload. Returns the encoding count.
    async fn reencode(&self) -> zbus::fdo::Result<u32> {
        tracing::info!("reencode requested");
        let _guard = self.mutation_lock.lock().await;
        self.reencode_and_reload().await
    }

    /// Re-read the encoding store from disk without re-encoding, for
    /// callers that ran the encoding pass themselves. Returns the count.
    async fn reload_encodings(&self) -> zbus::fdo::Result<u32> {
        tracing::info!("reload_encodings requested");
        let count = self
            .store
            .reload()
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        Ok(count as u32)
    }

    /// Check an operator credential; returns the role name on success.
    async fn authenticate(&self, username: &str, password: &str) -> zbus::fdo::Result<String> {
        let store = CredentialStore::load(&self.users_file)
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        match store.verify(username, password) {
            Some(role) => Ok(role.to_string()),
            None => {
                tracing::warn!(username, "authentication rejected");
                Err(zbus::fdo::Error::AccessDenied("invalid credentials".into()))
            }
        }
    }
}
