//! Durable storage for the interpretation-service credential
//!
//! The credential is kept in a small JSON key-value file under a single
//! well-known key. It is read once at startup and rewritten whenever the
//! control surface configures a new value. Its value is never logged.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info};

/// Key under which the credential is stored
pub const CREDENTIAL_KEY: &str = "interpreter_api_key";

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("failed to access credential store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("credential store {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Durable key-value storage for the credential
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Result<Option<String>, CredentialError>;

    async fn save(&self, value: &str) -> Result<(), CredentialError>;
}

/// Credential store backed by a JSON object file
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn io_error(&self, source: std::io::Error) -> CredentialError {
        CredentialError::Io {
            path: self.path.clone(),
            source,
        }
    }

    async fn read_entries(&self) -> Result<BTreeMap<String, String>, CredentialError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| CredentialError::Corrupt {
                path: self.path.clone(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<String>, CredentialError> {
        let entries = self.read_entries().await?;
        let value = entries
            .get(CREDENTIAL_KEY)
            .filter(|v| !v.trim().is_empty())
            .cloned();
        debug!(path = ?self.path, found = value.is_some(), "credential store read");
        Ok(value)
    }

    async fn save(&self, value: &str) -> Result<(), CredentialError> {
        let mut entries = self.read_entries().await?;
        entries.insert(CREDENTIAL_KEY.to_string(), value.to_string());

        let bytes = serde_json::to_vec_pretty(&entries).map_err(|source| CredentialError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        // The store on disk is either the old or the new contents, never partial
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|e| self.io_error(e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| self.io_error(e))?;
        }

        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        info!(path = ?self.path, "credential saved");
        Ok(())
    }
}
