//! Storage trait definitions.
//!
//! Two tiers back the entity store:
//! - [`DurableBackend`]: asynchronous, holds one opaque JSON object, and is
//!   the source of truth across restarts.
//! - [`FastBootMirror`]: synchronous and capacity-limited, read once at
//!   startup so the first paint does not wait on durable I/O.
//!
//! The attachment store reuses `DurableBackend` for its own state.

use std::future::Future;

use serde_json::Value;

use crate::error::Result;

/// Asynchronous store for one JSON object.
///
/// Every `save` replaces the whole object. Implementations must make a
/// save atomic: after a crash `load` returns either the previous or the new
/// object, never a mix.
pub trait DurableBackend: Send + Sync + 'static {
    /// Read the stored object.
    ///
    /// # Returns
    ///
    /// `Ok(None)` when nothing has been stored yet.
    ///
    /// # Errors
    ///
    /// Returns `StashError::Corrupt` if the stored bytes are not a JSON
    /// object, `StashError::Storage`/`Io` if they cannot be read.
    fn load(&self) -> impl Future<Output = Result<Option<Value>>> + Send;

    /// Replace the stored object.
    fn save(&self, value: Value) -> impl Future<Output = Result<()>> + Send;

    /// Remove the stored object.
    fn clear(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Synchronous, size-limited cache of the serialized snapshot.
pub trait FastBootMirror: Send + Sync {
    /// Read the cached payload, if any.
    fn read(&self) -> Result<Option<String>>;

    /// Replace the cached payload.
    ///
    /// # Errors
    ///
    /// Returns `StashError::CapacityExceeded` when the medium refuses the
    /// payload size.
    fn write(&self, payload: &str) -> Result<()>;

    /// Drop the cached payload. Removing an absent payload succeeds.
    fn remove(&self) -> Result<()>;
}
