//! Hierarchical attachment store: folders, items and their files.
//!
//! State (folders, items, file metadata and embedded bytes) persists after
//! every mutation through its own [`DurableBackend`]. Persist failures are
//! logged; the in-memory state stays authoritative. New file bytes go to the
//! configured [`BlobBackendKind`].
//!
//! All operations take one async lock, so mutations are applied and
//! persisted in call order.

mod blob;
mod tree;
mod types;
mod url_cache;

use std::collections::BTreeMap;

use chrono::Utc;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::{Result, StashError};
use crate::storage::traits::DurableBackend;

pub use blob::BlobBackendKind;
pub use types::{FileMeta, FileRecord, Folder, Item, Locator};
pub use url_cache::{FileUrlBridge, PlatformBridge, UrlCache};

use blob::{discard_blob, read_blob};
use types::AttachmentState;

struct Inner {
    state: AttachmentState,
    urls: UrlCache,
}

/// Folder/item/file store with a pluggable blob backend.
pub struct AttachmentStore<D: DurableBackend> {
    inner: Mutex<Inner>,
    durable: D,
    backend: BlobBackendKind,
    bridge: Box<dyn PlatformBridge>,
}

impl<D: DurableBackend> AttachmentStore<D> {
    /// Load persisted state from `durable`.
    ///
    /// A missing payload starts empty. A load failure or corrupt payload is
    /// logged and also starts empty.
    pub async fn open(durable: D, backend: BlobBackendKind) -> Self {
        let state = match durable.load().await {
            Ok(Some(value)) => match serde_json::from_value::<AttachmentState>(value) {
                Ok(state) => state,
                Err(err) => {
                    tracing::warn!(error = %err, "attachment state corrupt; starting empty");
                    AttachmentState::default()
                }
            },
            Ok(None) => AttachmentState::default(),
            Err(err) => {
                tracing::warn!(error = %err, "attachment state unreadable; starting empty");
                AttachmentState::default()
            }
        };
        tracing::debug!(
            folders = state.folders.len(),
            items = state.items.len(),
            files = state.files.len(),
            "attachment store opened"
        );

        Self {
            inner: Mutex::new(Inner {
                state,
                urls: UrlCache::new(),
            }),
            durable,
            backend,
            bridge: Box::new(FileUrlBridge),
        }
    }

    /// Replace the platform bridge used when bytes cannot be read.
    pub fn with_bridge(mut self, bridge: impl PlatformBridge + 'static) -> Self {
        self.bridge = Box::new(bridge);
        self
    }

    pub fn backend(&self) -> &BlobBackendKind {
        &self.backend
    }

    async fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().await
    }

    async fn persist(&self, state: &AttachmentState) {
        let value = match serde_json::to_value(state) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize attachment state");
                return;
            }
        };
        if let Err(err) = self.durable.save(value).await {
            tracing::warn!(error = %err, "failed to persist attachment state");
        }
    }

    // --- Items ---

    /// Items directly in `folder_id` (`None` = root), in insertion order.
    pub async fn list_items(&self, folder_id: Option<&str>) -> Vec<Item> {
        let inner = self.lock().await;
        inner
            .state
            .items
            .iter()
            .filter(|item| item.folder_id.as_deref() == folder_id)
            .cloned()
            .collect()
    }

    pub async fn all_items(&self) -> Vec<Item> {
        self.lock().await.state.items.clone()
    }

    pub async fn get_item(&self, id: &str) -> Option<Item> {
        self.lock().await.state.item(id).cloned()
    }

    /// Insert or replace an item. An empty id gets a fresh UUID.
    ///
    /// # Errors
    ///
    /// Returns `StashError::InvalidInput` for a blank title and
    /// `StashError::NotFound` if `folder_id` names no folder.
    pub async fn save_item(&self, mut item: Item) -> Result<Item> {
        if item.title.trim().is_empty() {
            return Err(StashError::InvalidInput("Item title cannot be empty".to_string()));
        }
        let mut inner = self.lock().await;
        if let Some(folder_id) = item.folder_id.as_deref() {
            if inner.state.folder(folder_id).is_none() {
                return Err(StashError::not_found("folder", folder_id));
            }
        }
        if item.id.is_empty() {
            item.id = Uuid::new_v4().to_string();
        }

        let items = &mut inner.state.items;
        match items.iter().position(|existing| existing.id == item.id) {
            Some(index) => items[index] = item.clone(),
            None => items.push(item.clone()),
        }
        self.persist(&inner.state).await;
        Ok(item)
    }

    /// Reparent an item to `target` (`None` = root).
    pub async fn move_item(&self, id: &str, target: Option<&str>) -> Result<Item> {
        let mut inner = self.lock().await;
        if let Some(folder_id) = target {
            if inner.state.folder(folder_id).is_none() {
                return Err(StashError::not_found("folder", folder_id));
            }
        }
        let item = inner
            .state
            .item_mut(id)
            .ok_or_else(|| StashError::not_found("item", id))?;
        item.folder_id = target.map(str::to_string);
        let moved = item.clone();
        self.persist(&inner.state).await;
        Ok(moved)
    }

    /// Delete an item and its files. Unknown ids are a no-op.
    pub async fn delete_item(&self, id: &str) -> Result<()> {
        let mut inner = self.lock().await;
        if inner.state.item(id).is_none() {
            return Ok(());
        }
        remove_items(&mut inner, &[id.to_string()]).await;
        self.persist(&inner.state).await;
        Ok(())
    }

    // --- Files ---

    /// Store `bytes` for `item_id` through the active blob backend.
    ///
    /// Image files are appended to the item's `images`.
    ///
    /// # Errors
    ///
    /// Returns `StashError::NotFound` for an unknown item and
    /// `StashError::Storage` if the external backend cannot write.
    pub async fn save_file_blob(
        &self,
        item_id: &str,
        bytes: Vec<u8>,
        meta: FileMeta,
    ) -> Result<FileRecord> {
        let mut inner = self.lock().await;
        if inner.state.item(item_id).is_none() {
            return Err(StashError::not_found("item", item_id));
        }

        let id = Uuid::new_v4().to_string();
        let locator = self
            .backend
            .store(&mut inner.state, &id, &meta.name, &bytes)
            .await?;
        let record = FileRecord {
            id,
            item_id: item_id.to_string(),
            name: meta.name,
            mime: meta.mime,
            size: bytes.len() as u64,
            created_at: Utc::now(),
            locator,
        };

        if record.is_image() {
            if let Some(item) = inner.state.item_mut(item_id) {
                item.images.push(record.id.clone());
            }
        }
        inner.state.files.push(record.clone());
        self.persist(&inner.state).await;
        tracing::debug!(file = %record.id, size = record.size, "attachment saved");
        Ok(record)
    }

    pub async fn list_files(&self, item_id: &str) -> Vec<FileRecord> {
        let inner = self.lock().await;
        inner
            .state
            .files
            .iter()
            .filter(|file| file.item_id == item_id)
            .cloned()
            .collect()
    }

    pub async fn read_file_bytes(&self, file_id: &str) -> Result<Vec<u8>> {
        let inner = self.lock().await;
        let file = inner
            .state
            .file(file_id)
            .ok_or_else(|| StashError::not_found("file", file_id))?;
        read_blob(&inner.state, file).await
    }

    /// Displayable URL for a file.
    ///
    /// Reads the bytes and mints (or reuses) a cached `blob:` URL; when the
    /// bytes cannot be read, asks the platform bridge. `None` for unknown
    /// files or when both paths fail.
    pub async fn get_file_url(&self, file_id: &str) -> Option<String> {
        let mut inner = self.lock().await;
        if let Some(url) = inner.urls.url_for(file_id) {
            return Some(url.to_string());
        }
        let file = inner.state.file(file_id)?.clone();

        let read = read_blob(&inner.state, &file).await;
        match read {
            Ok(bytes) => Some(inner.urls.mint(&file.id, &file.mime, bytes)),
            Err(err) => {
                tracing::debug!(
                    file = %file.id,
                    error = %err,
                    "attachment bytes unreadable; trying platform bridge"
                );
                self.bridge.resolve(&file.locator)
            }
        }
    }

    /// Bytes behind a URL minted by [`get_file_url`](Self::get_file_url).
    pub async fn open_url(&self, url: &str) -> Option<Vec<u8>> {
        let inner = self.lock().await;
        inner.urls.resolve(url).map(|(bytes, _)| bytes.to_vec())
    }

    /// Delete a file's metadata and bytes, revoke its URL, and drop it from
    /// the item's `images`. Unknown ids are a no-op.
    pub async fn delete_file(&self, file_id: &str) -> Result<()> {
        let mut inner = self.lock().await;
        let Some(index) = inner.state.files.iter().position(|file| file.id == file_id) else {
            return Ok(());
        };
        let file = inner.state.files.remove(index);
        if let Some(item) = inner.state.item_mut(&file.item_id) {
            item.images.retain(|image| image != file_id);
        }
        discard_blob(&mut inner.state, &file).await;
        inner.urls.revoke(file_id);
        self.persist(&inner.state).await;
        Ok(())
    }

    // --- Folders ---

    /// Folders directly under `parent_id` (`None` = root).
    pub async fn list_folders(&self, parent_id: Option<&str>) -> Vec<Folder> {
        let inner = self.lock().await;
        inner
            .state
            .folders
            .iter()
            .filter(|folder| folder.parent_id.as_deref() == parent_id)
            .cloned()
            .collect()
    }

    pub async fn get_folder(&self, id: &str) -> Option<Folder> {
        self.lock().await.state.folder(id).cloned()
    }

    pub async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<Folder> {
        let name = folder_name(name)?;
        let mut inner = self.lock().await;
        if let Some(parent) = parent_id {
            if inner.state.folder(parent).is_none() {
                return Err(StashError::not_found("folder", parent));
            }
        }
        let folder = Folder {
            id: Uuid::new_v4().to_string(),
            name,
            parent_id: parent_id.map(str::to_string),
        };
        inner.state.folders.push(folder.clone());
        self.persist(&inner.state).await;
        Ok(folder)
    }

    pub async fn rename_folder(&self, id: &str, name: &str) -> Result<Folder> {
        let name = folder_name(name)?;
        let mut inner = self.lock().await;
        let folder = inner
            .state
            .folder_mut(id)
            .ok_or_else(|| StashError::not_found("folder", id))?;
        folder.name = name;
        let renamed = folder.clone();
        self.persist(&inner.state).await;
        Ok(renamed)
    }

    /// Reparent a folder to `new_parent` (`None` = root).
    ///
    /// # Errors
    ///
    /// Returns `StashError::FolderCycle` when `new_parent` is the folder
    /// itself or one of its descendants.
    pub async fn move_folder(&self, id: &str, new_parent: Option<&str>) -> Result<Folder> {
        let mut inner = self.lock().await;
        if inner.state.folder(id).is_none() {
            return Err(StashError::not_found("folder", id));
        }
        if let Some(parent) = new_parent {
            if inner.state.folder(parent).is_none() {
                return Err(StashError::not_found("folder", parent));
            }
            if tree::is_self_or_ancestor(&inner.state.folders, id, parent) {
                return Err(StashError::FolderCycle {
                    folder: id.to_string(),
                    target: parent.to_string(),
                });
            }
        }
        let folder = inner
            .state
            .folder_mut(id)
            .ok_or_else(|| StashError::not_found("folder", id))?;
        folder.parent_id = new_parent.map(str::to_string);
        let moved = folder.clone();
        self.persist(&inner.state).await;
        Ok(moved)
    }

    /// Delete a folder.
    ///
    /// With `cascade`, descendant folders go first (children before
    /// parents), then every affected item with its files, then the folder.
    /// Unknown ids are a no-op.
    ///
    /// # Errors
    ///
    /// Without `cascade`, returns `StashError::NotEmpty` if the folder has a
    /// child folder or an item.
    pub async fn delete_folder(&self, id: &str, cascade: bool) -> Result<()> {
        let mut inner = self.lock().await;
        if inner.state.folder(id).is_none() {
            return Ok(());
        }

        if !cascade {
            let has_children = inner
                .state
                .folders
                .iter()
                .any(|folder| folder.parent_id.as_deref() == Some(id));
            let has_items = inner
                .state
                .items
                .iter()
                .any(|item| item.folder_id.as_deref() == Some(id));
            if has_children || has_items {
                return Err(StashError::NotEmpty(id.to_string()));
            }
        }

        let mut doomed = tree::descendants_post_order(&inner.state.folders, id);
        doomed.push(id.to_string());
        for folder_id in &doomed {
            let items: Vec<String> = inner
                .state
                .items
                .iter()
                .filter(|item| item.folder_id.as_deref() == Some(folder_id.as_str()))
                .map(|item| item.id.clone())
                .collect();
            remove_items(&mut inner, &items).await;
            inner.state.folders.retain(|folder| &folder.id != folder_id);
        }
        tracing::debug!(folder = id, removed = doomed.len(), "folder deleted");
        self.persist(&inner.state).await;
        Ok(())
    }

    /// Folders from the root down to `id`; empty for an unknown id.
    pub async fn get_folder_path(&self, id: &str) -> Vec<Folder> {
        tree::folder_path(&self.lock().await.state.folders, id)
    }

    /// Attachment bytes per folder, descendants included.
    pub async fn folder_sizes(&self) -> BTreeMap<String, u64> {
        let inner = self.lock().await;
        tree::folder_sizes(&inner.state.folders, &inner.state.items, &inner.state.files)
    }

    /// Remove everything and revoke every cached URL.
    pub async fn clear(&self) -> Result<()> {
        let mut inner = self.lock().await;
        let files = std::mem::take(&mut inner.state.files);
        for file in &files {
            discard_blob(&mut inner.state, file).await;
        }
        inner.state = AttachmentState::default();
        let revoked = inner.urls.revoke_all();
        tracing::debug!(files = files.len(), revoked, "attachment store cleared");
        self.persist(&inner.state).await;
        Ok(())
    }
}

/// Remove `item_ids` and all of their files, revoking cached URLs.
async fn remove_items(inner: &mut Inner, item_ids: &[String]) {
    for item_id in item_ids {
        for file in inner.state.take_files_of(item_id) {
            discard_blob(&mut inner.state, &file).await;
            inner.urls.revoke(&file.id);
        }
        inner.state.items.retain(|item| &item.id != item_id);
    }
}

fn folder_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(StashError::InvalidInput("Folder name cannot be empty".to_string()));
    }
    Ok(trimmed.to_string())
}
