//! Persisted transport session credentials

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const CREDENTIALS_FILE: &str = "creds.json";

/// Opaque session blob owned by the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(pub Value);

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Credential store I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Stored credentials are corrupt: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Credentials kept as JSON in the auth directory
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self) -> PathBuf {
        self.dir.join(CREDENTIALS_FILE)
    }

    pub async fn load(&self) -> Result<Option<Credentials>, CredentialError> {
        match tokio::fs::read_to_string(self.path()).await {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write atomically via a temp file
    pub async fn save(&self, credentials: &Credentials) -> Result<(), CredentialError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let tmp = self.dir.join(format!("{CREDENTIALS_FILE}.tmp"));
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(credentials)?).await?;
        tokio::fs::rename(&tmp, self.path()).await?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), CredentialError> {
        match tokio::fs::remove_file(self.path()).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
