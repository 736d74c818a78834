//! # Stash Core
//!
//! Persistence and encryption core for Stash, a local-first personal data
//! manager (finances, credentials, file inventory) that runs on one device.
//!
//! ## Architecture
//!
//! - **entity_store**: one authoritative in-memory snapshot of every
//!   collection, kept consistent with a durable backend and a fast-boot
//!   mirror
//! - **storage**: the two storage tiers and the snapshot types
//! - **schema**: collection names, seeded defaults and metadata keys
//! - **attachments**: folders, items and file attachments with pluggable
//!   blob backends and a URL cache
//! - **crypto**: PBKDF2 + AES-256-GCM password encryption, password
//!   strength and generation
//! - **backup**: backup file encoding (gzip, encrypted envelope)

pub mod attachments;
pub mod backup;
pub mod crypto;
pub mod entity_store;
pub mod error;
pub mod fs;
pub mod schema;
pub mod storage;

pub use attachments::{AttachmentStore, BlobBackendKind, FileMeta, FileRecord, Folder, Item};
pub use backup::{decode_backup, encode_backup, BackupOptions};
pub use crypto::{CryptoService, PasswordStrength};
pub use entity_store::{BootSource, DataChanged, EntityStore};
pub use error::{Result, StashError};
pub use schema::Schema;
pub use storage::{DurableBackend, FastBootMirror, MirrorPolicy, Record};

/// Core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
