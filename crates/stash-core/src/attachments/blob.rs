//! Physical storage of attachment bytes.

use std::io;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use super::types::{AttachmentState, FileRecord, Locator};
use crate::error::{Result, StashError};
use crate::fs::write_atomic_async;

const ATTACHMENTS_DIR: &str = "attachments";
const MAX_NAME_LEN: usize = 96;

/// Which blob backend new files go to.
///
/// Existing files are always read through their own [`Locator`], so
/// switching backends does not strand earlier uploads.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlobBackendKind {
    /// Bytes stored inside the attachment durable state
    #[default]
    Embedded,
    /// Bytes written under `<root>/attachments/`
    External { root: PathBuf },
}

impl BlobBackendKind {
    pub(crate) async fn store(
        &self,
        state: &mut AttachmentState,
        file_id: &str,
        name: &str,
        bytes: &[u8],
    ) -> Result<Locator> {
        match self {
            BlobBackendKind::Embedded => {
                state.blobs.insert(file_id.to_string(), STANDARD.encode(bytes));
                Ok(Locator::Embedded)
            }
            BlobBackendKind::External { root } => {
                let path = external_path(root, file_id, name);
                write_atomic_async(&path, bytes).await.map_err(|e| {
                    StashError::Storage(format!(
                        "Failed to write attachment {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Ok(Locator::External { path })
            }
        }
    }
}

/// Read the bytes of `file` through its locator.
pub(crate) async fn read_blob(state: &AttachmentState, file: &FileRecord) -> Result<Vec<u8>> {
    match &file.locator {
        Locator::Embedded => {
            let encoded = state
                .blobs
                .get(&file.id)
                .ok_or_else(|| StashError::not_found("blob", &file.id))?;
            STANDARD
                .decode(encoded)
                .map_err(|e| StashError::Corrupt(format!("blob {}: {}", file.id, e)))
        }
        Locator::External { path } => Ok(tokio::fs::read(path).await?),
    }
}

/// Drop the bytes of `file`. Missing bytes are not an error; other failures
/// are logged.
pub(crate) async fn discard_blob(state: &mut AttachmentState, file: &FileRecord) {
    match &file.locator {
        Locator::Embedded => {
            state.blobs.remove(&file.id);
        }
        Locator::External { path } => match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to remove attachment file"
                );
            }
        },
    }
}

fn external_path(root: &Path, file_id: &str, name: &str) -> PathBuf {
    root.join(ATTACHMENTS_DIR)
        .join(format!("{}-{}", file_id, safe_file_name(name)))
}

/// Reduce a user-supplied name to `[A-Za-z0-9._-]`, never empty or dotted.
pub(crate) fn safe_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_LEN)
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn record(id: &str, locator: Locator) -> FileRecord {
        FileRecord {
            id: id.to_string(),
            item_id: "item".to_string(),
            name: "n".to_string(),
            mime: "application/octet-stream".to_string(),
            size: 3,
            created_at: Utc::now(),
            locator,
        }
    }

    #[test]
    fn test_safe_file_name() {
        assert_eq!(safe_file_name("receipt 2024.pdf"), "receipt_2024.pdf");
        assert_eq!(safe_file_name("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(safe_file_name("..."), "file");
        assert_eq!(safe_file_name(""), "file");
        assert_eq!(safe_file_name(&"x".repeat(500)).len(), MAX_NAME_LEN);
    }

    #[tokio::test]
    async fn test_embedded_store_read_discard() {
        let mut state = AttachmentState::default();
        let locator = BlobBackendKind::Embedded
            .store(&mut state, "f1", "a.bin", b"abc")
            .await
            .unwrap();
        assert_eq!(locator, Locator::Embedded);

        let file = record("f1", locator);
        assert_eq!(read_blob(&state, &file).await.unwrap(), b"abc");

        discard_blob(&mut state, &file).await;
        assert!(matches!(
            read_blob(&state, &file).await,
            Err(StashError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_external_store_read_discard() {
        let temp = TempDir::new().unwrap();
        let backend = BlobBackendKind::External {
            root: temp.path().to_path_buf(),
        };
        let mut state = AttachmentState::default();

        let locator = backend
            .store(&mut state, "f1", "scan 1.png", b"png")
            .await
            .unwrap();
        let expected = temp.path().join("attachments").join("f1-scan_1.png");
        assert_eq!(
            locator,
            Locator::External {
                path: expected.clone()
            }
        );
        assert!(state.blobs.is_empty());

        let file = record("f1", locator);
        assert_eq!(read_blob(&state, &file).await.unwrap(), b"png");

        discard_blob(&mut state, &file).await;
        assert!(!expected.exists());
        // Second discard is quiet.
        discard_blob(&mut state, &file).await;
    }
}
