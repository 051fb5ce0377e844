//! Persistent single-record credential storage.

use std::path::{Path, PathBuf};

use drivecli_common::{Error, Result};

use crate::auth::Credential;

/// Holds one serialized credential record in a local file.
///
/// The file is read and written whole; there is no partial update. Handles
/// are scoped to each call, so nothing stays open between operations.
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Create a store backed by the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a persisted record exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the persisted credential.
    ///
    /// A corrupt or unreadable record is an error; the caller decides
    /// whether that is fatal.
    pub fn load(&self) -> Result<Credential> {
        let data = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&data)
            .map_err(|e| Error::Serialization(format!("Credential record is corrupt: {}", e)))
    }

    /// Persist the credential, replacing any previous record.
    pub fn save(&self, credential: &Credential) -> Result<()> {
        let json = serde_json::to_string_pretty(credential)
            .map_err(|e| Error::Serialization(format!("Failed to serialize credential: {}", e)))?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}
