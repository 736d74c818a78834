//! Display URLs for attachments.
//!
//! A file gets at most one minted `blob:stash/<uuid>` URL. The URL stays
//! valid until the file is deleted or the store is cleared; nothing expires
//! it passively.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use super::types::Locator;

const URL_PREFIX: &str = "blob:stash/";

struct CachedUrl {
    url: String,
    mime: String,
    bytes: Arc<[u8]>,
}

/// Minted URLs keyed by file id.
#[derive(Default)]
pub struct UrlCache {
    by_file: HashMap<String, CachedUrl>,
}

impl UrlCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// URL already minted for `file_id`, if any.
    pub fn url_for(&self, file_id: &str) -> Option<&str> {
        self.by_file.get(file_id).map(|cached| cached.url.as_str())
    }

    /// Return the URL for `file_id`, minting it from `bytes` the first time.
    pub fn mint(&mut self, file_id: &str, mime: &str, bytes: Vec<u8>) -> String {
        self.by_file
            .entry(file_id.to_string())
            .or_insert_with(|| CachedUrl {
                url: format!("{}{}", URL_PREFIX, Uuid::new_v4()),
                mime: mime.to_string(),
                bytes: bytes.into(),
            })
            .url
            .clone()
    }

    /// Bytes and mime type behind a minted URL.
    pub fn resolve(&self, url: &str) -> Option<(Arc<[u8]>, &str)> {
        if !url.starts_with(URL_PREFIX) {
            return None;
        }
        self.by_file
            .values()
            .find(|cached| cached.url == url)
            .map(|cached| (Arc::clone(&cached.bytes), cached.mime.as_str()))
    }

    /// Revoke the URL of `file_id`. Returns whether one existed.
    pub fn revoke(&mut self, file_id: &str) -> bool {
        self.by_file.remove(file_id).is_some()
    }

    /// Revoke every URL and return how many there were.
    pub fn revoke_all(&mut self) -> usize {
        let count = self.by_file.len();
        self.by_file.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.by_file.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_file.is_empty()
    }
}

/// Host-side resolution of a locator whose bytes could not be read.
pub trait PlatformBridge: Send + Sync {
    fn resolve(&self, locator: &Locator) -> Option<String>;
}

/// Resolves external locators to `file://` URLs when the path exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileUrlBridge;

impl PlatformBridge for FileUrlBridge {
    fn resolve(&self, locator: &Locator) -> Option<String> {
        match locator {
            Locator::External { path } if path.exists() => {
                Some(format!("file://{}", path.display()))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_mint_once_per_file() {
        let mut cache = UrlCache::new();
        let first = cache.mint("f1", "image/png", vec![1, 2, 3]);
        let second = cache.mint("f1", "image/png", vec![9]);

        assert!(first.starts_with(URL_PREFIX));
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);

        let (bytes, mime) = cache.resolve(&first).unwrap();
        assert_eq!(&*bytes, &[1, 2, 3]);
        assert_eq!(mime, "image/png");
    }

    #[test]
    fn test_revoke() {
        let mut cache = UrlCache::new();
        let url = cache.mint("f1", "text/plain", vec![]);
        cache.mint("f2", "text/plain", vec![]);

        assert!(cache.revoke("f1"));
        assert!(!cache.revoke("f1"));
        assert!(cache.resolve(&url).is_none());
        assert_eq!(cache.revoke_all(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_file_bridge() {
        let bridge = FileUrlBridge;
        assert!(bridge.resolve(&Locator::Embedded).is_none());
        assert!(bridge
            .resolve(&Locator::External {
                path: PathBuf::from("/definitely/not/here.bin")
            })
            .is_none());

        let temp = tempfile::NamedTempFile::new().unwrap();
        let url = bridge
            .resolve(&Locator::External {
                path: temp.path().to_path_buf(),
            })
            .unwrap();
        assert!(url.starts_with("file://"));
    }
}
