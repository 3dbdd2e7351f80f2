//! Credential store: a JSON array of {username, password, role} with
//! argon2 PHC-string password hashes. Small by design; a handful of
//! operator accounts, read fully on each check.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("credential store io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("credential store {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("password hashing failed: {0}")]
    Hash(argon2::password_hash::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::User => write!(f, "user"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserEntry {
    username: String,
    /// Argon2 PHC string, never a plaintext password.
    password: String,
    role: Role,
}

/// File-backed credential store.
pub struct CredentialStore {
    path: PathBuf,
    users: Vec<UserEntry>,
}

impl CredentialStore {
    /// Load from `path`; a missing file is an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<CredentialStore, CredentialError> {
        let path = path.into();
        let users = if path.exists() {
            let raw = std::fs::read(&path)
                .map_err(|source| CredentialError::Io { path: path.clone(), source })?;
            serde_json::from_slice(&raw)
                .map_err(|source| CredentialError::Parse { path: path.clone(), source })?
        } else {
            Vec::new()
        };
        Ok(CredentialStore { path, users })
    }

    /// Verify a username/password pair, returning the role on success.
    ///
    /// Unknown users and wrong passwords are indistinguishable to the
    /// caller; both yield `None`.
    pub fn verify(&self, username: &str, password: &str) -> Option<Role> {
        let entry = self.users.iter().find(|u| u.username == username)?;
        let parsed = PasswordHash::new(&entry.password).ok()?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .ok()
            .map(|_| entry.role)
    }

    /// Add a user or replace an existing one, hashing the password, and
    /// persist the store.
    pub fn upsert(
        &mut self,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<(), CredentialError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(CredentialError::Hash)?
            .to_string();

        match self.users.iter_mut().find(|u| u.username == username) {
            Some(existing) => {
                existing.password = hash;
                existing.role = role;
            }
            None => self.users.push(UserEntry {
                username: username.to_string(),
                password: hash,
                role,
            }),
        }

        self.save()
    }

    pub fn usernames(&self) -> Vec<&str> {
        self.users.iter().map(|u| u.username.as_str()).collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|source| CredentialError::Io { path: self.path.clone(), source })?;
        }
        let raw = serde_json::to_vec_pretty(&self.users)
            .map_err(|source| CredentialError::Parse { path: self.path.clone(), source })?;
        std::fs::write(&self.path, raw)
            .map_err(|source| CredentialError::Io { path: self.path.clone(), source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::load(dir.path().join("users.json")).unwrap();
        assert!(store.usernames().is_empty());
        assert!(store.verify("admin", "admin123").is_none());
    }

    #[test]
    fn test_upsert_verify_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        let mut store = CredentialStore::load(&path).unwrap();
        store.upsert("admin", "admin123", Role::Admin).unwrap();

        // Fresh load must verify against the persisted hash.
        let reloaded = CredentialStore::load(&path).unwrap();
        assert_eq!(reloaded.verify("admin", "admin123"), Some(Role::Admin));
        assert!(reloaded.verify("admin", "wrong").is_none());
        assert!(reloaded.verify("nobody", "admin123").is_none());
    }

    #[test]
    fn test_password_is_not_stored_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        let mut store = CredentialStore::load(&path).unwrap();
        store.upsert("john", "john123", Role::User).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("john123"));
        assert!(raw.contains("$argon2"));
    }

    #[test]
    fn test_upsert_replaces_existing_user() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        let mut store = CredentialStore::load(&path).unwrap();
        store.upsert("john", "old", Role::User).unwrap();
        store.upsert("john", "new", Role::Admin).unwrap();

        let reloaded = CredentialStore::load(&path).unwrap();
        assert_eq!(reloaded.usernames(), vec!["john"]);
        assert!(reloaded.verify("john", "old").is_none());
        assert_eq!(reloaded.verify("john", "new"), Some(Role::Admin));
    }
}
