//! Filesystem utilities for atomic writes.
//!
//! Both the file mirror and the file-backed durable store replace their
//! payload by writing a sibling temp file and renaming it over the target,
//! so a crash mid-write leaves the previous payload intact.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::AsyncWriteExt;

/// Atomically rename a file, with fallback for platforms where rename fails if target exists.
///
/// On some platforms (notably Windows), `fs::rename` fails if the destination already exists.
/// This function handles that case by removing the destination first and retrying.
///
/// If the rename ultimately fails, the temp file is cleaned up.
pub fn rename_with_fallback(temp_path: &Path, destination: &Path) -> io::Result<()> {
    if let Err(initial_err) = fs::rename(temp_path, destination) {
        let _ = fs::remove_file(destination);
        fs::rename(temp_path, destination).map_err(|retry_err| {
            let _ = fs::remove_file(temp_path);
            io::Error::new(
                retry_err.kind(),
                format!(
                    "Atomic rename failed (initial: {}, retry: {})",
                    initial_err, retry_err
                ),
            )
        })?;
    }
    Ok(())
}

/// Sibling temp path for `path`, unique per call.
pub fn temp_sibling(path: &Path) -> io::Result<PathBuf> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Path has no parent"))?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Invalid filename"))?;
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("System time error: {}", e)))?
        .as_nanos();
    Ok(parent.join(format!(".{}.{}.tmp", filename, nanos)))
}

/// Write `data` to `path` through a synced temp file and an atomic rename.
///
/// Missing parent directories are created.
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = temp_sibling(path)?;

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)?;
    let written = file.write_all(data).and_then(|_| file.sync_all());
    if let Err(err) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(err);
    }

    rename_with_fallback(&temp_path, path)
}

/// Async counterpart of [`write_atomic`] built on `tokio::fs`.
///
/// The temp file is synced before the rename, so the target is never
/// replaced by a file whose data has not reached the disk.
pub async fn write_atomic_async(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let temp_path = temp_sibling(path)?;
    if let Err(err) = write_synced_async(&temp_path, data).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(err);
    }
    if let Err(initial_err) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(path).await;
        tokio::fs::rename(&temp_path, path).await.map_err(|retry_err| {
            let _ = std::fs::remove_file(&temp_path);
            io::Error::new(
                retry_err.kind(),
                format!(
                    "Atomic rename failed (initial: {}, retry: {})",
                    initial_err, retry_err
                ),
            )
        })?;
    }
    Ok(())
}

/// Write a fresh file and wait until its contents reach the disk.
async fn write_synced_async(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(data).await?;
    file.sync_all().await
}

/// Remove a file, treating "already gone" as success.
pub fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_rename_new_file() {
        let dir = tempdir().unwrap();
        let temp = dir.path().join("temp.txt");
        let dest = dir.path().join("dest.txt");

        File::create(&temp).unwrap().write_all(b"test").unwrap();

        rename_with_fallback(&temp, &dest).unwrap();

        assert!(!temp.exists());
        assert_eq!(fs::read_to_string(&dest).unwrap(), "test");
    }

    #[test]
    fn test_write_atomic_overwrites_and_creates_parents() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("nested").join("mirror.json");

        write_atomic(&dest, b"old").unwrap();
        write_atomic(&dest, b"new").unwrap();

        assert_eq!(fs::read_to_string(&dest).unwrap(), "new");
        let leftovers: Vec<_> = fs::read_dir(dest.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_remove_if_exists_is_forgiving() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing");
        remove_if_exists(&missing).unwrap();
    }

    #[tokio::test]
    async fn test_write_atomic_async() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("store.json");

        write_atomic_async(&dest, b"{}").await.unwrap();
        write_atomic_async(&dest, b"{\"a\":1}").await.unwrap();

        assert_eq!(fs::read_to_string(&dest).unwrap(), "{\"a\":1}");
    }

    #[tokio::test]
    async fn test_write_atomic_async_replaces_with_full_payload() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("stash.json");
        let payload = vec![b'x'; 256 * 1024];

        write_atomic_async(&dest, b"previous").await.unwrap();
        write_atomic_async(&dest, &payload).await.unwrap();

        assert_eq!(fs::read(&dest).unwrap(), payload);
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_synced_write_never_reuses_a_file() {
        let dir = tempdir().unwrap();
        let existing = dir.path().join("taken.tmp");
        fs::write(&existing, b"keep").unwrap();

        let err = write_synced_async(&existing, b"new").await.unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&existing).unwrap(), b"keep");
    }
}
