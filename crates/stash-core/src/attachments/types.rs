//! Attachment store data types.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A node in the folder tree. `parent_id == None` means root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

/// An inventory item living in one folder or at root.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Item {
    /// Empty until saved; `save_item` assigns a UUID.
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub notes: String,
    /// File ids used as thumbnails, in display order
    #[serde(default)]
    pub images: Vec<String>,
}

impl Item {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn in_folder(mut self, folder_id: impl Into<String>) -> Self {
        self.folder_id = Some(folder_id.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }
}

/// Where the bytes of a file live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Locator {
    /// Inside the attachment durable state
    Embedded,
    /// A file on disk outside the durable state
    External { path: PathBuf },
}

/// Metadata for one attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub item_id: String,
    pub name: String,
    pub mime: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub locator: Locator,
}

impl FileRecord {
    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }
}

/// Caller-supplied description of an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub name: String,
    pub mime: String,
}

impl FileMeta {
    pub fn new(name: impl Into<String>, mime: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
        }
    }
}

/// Everything the attachment store persists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct AttachmentState {
    #[serde(default)]
    pub folders: Vec<Folder>,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub files: Vec<FileRecord>,
    /// Base64 bytes of embedded files, by file id
    #[serde(default)]
    pub blobs: BTreeMap<String, String>,
}

impl AttachmentState {
    pub fn folder(&self, id: &str) -> Option<&Folder> {
        self.folders.iter().find(|folder| folder.id == id)
    }

    pub fn folder_mut(&mut self, id: &str) -> Option<&mut Folder> {
        self.folders.iter_mut().find(|folder| folder.id == id)
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn item_mut(&mut self, id: &str) -> Option<&mut Item> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    pub fn file(&self, id: &str) -> Option<&FileRecord> {
        self.files.iter().find(|file| file.id == id)
    }

    /// Detach and return the files of `item_id`.
    pub fn take_files_of(&mut self, item_id: &str) -> Vec<FileRecord> {
        let (taken, kept) = std::mem::take(&mut self.files)
            .into_iter()
            .partition(|file| file.item_id == item_id);
        self.files = kept;
        taken
    }
}
