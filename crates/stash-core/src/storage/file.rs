//! File-backed storage tiers.
//!
//! `JsonFileBackend` writes the whole object to one JSON file through a temp
//! file and rename. With a password configured, the file holds an encrypted
//! envelope instead of plain JSON; key derivation and AES-GCM run on the
//! blocking pool.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use zeroize::Zeroizing;

use crate::crypto::{CryptoService, Envelope};
use crate::error::{Result, StashError};
use crate::fs::{remove_if_exists, write_atomic, write_atomic_async};
use crate::storage::traits::{DurableBackend, FastBootMirror};

struct AtRest {
    crypto: CryptoService,
    password: Zeroizing<String>,
}

/// Durable backend stored as a single JSON file.
pub struct JsonFileBackend {
    path: PathBuf,
    at_rest: Option<Arc<AtRest>>,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            at_rest: None,
        }
    }

    /// Encrypt the file at rest with `password`.
    pub fn with_password(mut self, crypto: CryptoService, password: impl Into<String>) -> Self {
        self.at_rest = Some(Arc::new(AtRest {
            crypto,
            password: Zeroizing::new(password.into()),
        }));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_encrypted(&self) -> bool {
        self.at_rest.is_some()
    }
}

impl std::fmt::Debug for JsonFileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonFileBackend")
            .field("path", &self.path)
            .field("encrypted", &self.is_encrypted())
            .finish()
    }
}

async fn run_blocking<T, F>(task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| StashError::Storage(format!("Blocking task failed: {}", e)))?
}

impl DurableBackend for JsonFileBackend {
    async fn load(&self) -> Result<Option<Value>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if text.trim().is_empty() {
            return Ok(None);
        }
        let value: Value = serde_json::from_str(&text).map_err(|e| {
            StashError::Corrupt(format!("{} is not valid JSON: {}", self.path.display(), e))
        })?;

        if Envelope::from_value(&value).is_none() {
            return Ok(Some(value));
        }
        let at_rest = self.at_rest.clone().ok_or_else(|| {
            StashError::InvalidInput(format!(
                "{} is encrypted but no password was configured",
                self.path.display()
            ))
        })?;
        let decrypted =
            run_blocking(move || at_rest.crypto.decrypt_data(&value, &at_rest.password)).await?;
        Ok(Some(decrypted))
    }

    async fn save(&self, value: Value) -> Result<()> {
        let value = match self.at_rest.clone() {
            Some(at_rest) => {
                run_blocking(move || {
                    at_rest
                        .crypto
                        .encrypt_data(&value, &at_rest.password)
                        .map(|envelope| envelope.to_value())
                })
                .await?
            }
            None => value,
        };
        let text = serde_json::to_string(&value)?;
        write_atomic_async(&self.path, text.as_bytes()).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Fast-boot mirror stored as a plain file.
#[derive(Debug, Clone)]
pub struct FileMirror {
    path: PathBuf,
}

impl FileMirror {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FastBootMirror for FileMirror {
    fn read(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, payload: &str) -> Result<()> {
        write_atomic(&self.path, payload.as_bytes())?;
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        remove_if_exists(&self.path)?;
        Ok(())
    }
}
