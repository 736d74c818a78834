//! In-memory storage tiers.
//!
//! Both types are cheap to clone and clones share state, so a test can keep
//! a handle to the backend it passed into a store and boot a second store
//! from it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use crate::error::{Result, StashError};
use crate::storage::traits::{DurableBackend, FastBootMirror};

/// Durable backend held in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    value: Arc<tokio::sync::Mutex<Option<Value>>>,
    fail_saves: Arc<AtomicBool>,
    saves: Arc<AtomicUsize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-populated with `value`.
    pub fn with_value(value: Value) -> Self {
        Self {
            value: Arc::new(tokio::sync::Mutex::new(Some(value))),
            ..Self::default()
        }
    }

    /// Make every subsequent save fail with a storage error.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Current stored object.
    pub async fn stored(&self) -> Option<Value> {
        self.value.lock().await.clone()
    }
}

impl DurableBackend for MemoryBackend {
    async fn load(&self) -> Result<Option<Value>> {
        Ok(self.value.lock().await.clone())
    }

    async fn save(&self, value: Value) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StashError::Storage("Simulated save failure".to_string()));
        }
        *self.value.lock().await = Some(value);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.value.lock().await = None;
        Ok(())
    }
}

/// Fast-boot mirror held in process memory, with an optional quota.
#[derive(Debug, Clone, Default)]
pub struct MemoryMirror {
    payload: Arc<Mutex<Option<String>>>,
    quota: Option<usize>,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror that refuses payloads larger than `quota` bytes.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            quota: Some(quota),
            ..Self::default()
        }
    }

    /// Mirror pre-populated with `payload`.
    pub fn with_payload(payload: impl Into<String>) -> Self {
        Self {
            payload: Arc::new(Mutex::new(Some(payload.into()))),
            quota: None,
        }
    }

    fn lock_payload(&self) -> Result<MutexGuard<'_, Option<String>>> {
        self.payload
            .lock()
            .map_err(|_| StashError::Storage("Mirror lock poisoned".to_string()))
    }
}

impl FastBootMirror for MemoryMirror {
    fn read(&self) -> Result<Option<String>> {
        Ok(self.lock_payload()?.clone())
    }

    fn write(&self, payload: &str) -> Result<()> {
        if let Some(limit) = self.quota {
            if payload.len() > limit {
                return Err(StashError::CapacityExceeded {
                    size: payload.len(),
                    limit,
                });
            }
        }
        *self.lock_payload()? = Some(payload.to_string());
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        *self.lock_payload()? = None;
        Ok(())
    }
}
