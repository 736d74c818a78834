//! Storage abstraction for Stash.
//!
//! This module defines the two storage tiers behind the entity store and
//! the snapshot types they carry.
//!
//! ## Architecture
//!
//! - [`DurableBackend`]: asynchronous source of truth. Memory and JSON file
//!   implementations; the file backend can encrypt at rest.
//! - [`FastBootMirror`]: synchronous startup cache under a
//!   [`MirrorPolicy`]. Memory and file implementations.
//!
//! Both tiers always receive the entire snapshot, never a delta.

pub mod file;
pub mod memory;
pub mod mirror;
pub mod traits;
pub mod types;

// Re-export public types
pub use file::{FileMirror, JsonFileBackend};
pub use memory::{MemoryBackend, MemoryMirror};
pub use mirror::{refresh_mirror, MirrorOutcome, MirrorPolicy, DEFAULT_SOFT_CAP_BYTES};
pub use traits::{DurableBackend, FastBootMirror};
pub use types::{Fields, Record, Snapshot};
