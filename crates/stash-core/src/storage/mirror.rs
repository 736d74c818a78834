//! Capacity policy for the fast-boot mirror.
//!
//! The mirror is either an exact copy of the current snapshot or absent.
//! Whenever a write is not allowed or does not succeed, the old payload is
//! removed so the next boot never starts from a stale copy.

use crate::error::StashError;
use crate::storage::traits::FastBootMirror;

/// Default soft cap on the serialized snapshot, just under the common 5 MB
/// browser-style storage quota.
pub const DEFAULT_SOFT_CAP_BYTES: usize = 4_800_000;

/// When the mirror is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorPolicy {
    pub enabled: bool,
    pub soft_cap_bytes: usize,
}

impl Default for MirrorPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            soft_cap_bytes: DEFAULT_SOFT_CAP_BYTES,
        }
    }
}

impl MirrorPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// What a refresh did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorOutcome {
    Written,
    /// Feature turned off; payload removed
    Disabled,
    /// Payload over the soft cap or refused by the medium; payload removed
    OverCapacity,
    /// Write failed for another reason; payload removed if possible
    Failed,
}

/// Bring the mirror in line with `payload` under `policy`.
///
/// Never fails: every error is logged and degrades to a durable-only boot.
pub fn refresh_mirror<M: FastBootMirror + ?Sized>(
    mirror: &M,
    policy: &MirrorPolicy,
    payload: &str,
) -> MirrorOutcome {
    if !policy.enabled {
        drop_mirror(mirror);
        return MirrorOutcome::Disabled;
    }
    if payload.len() > policy.soft_cap_bytes {
        tracing::debug!(
            size = payload.len(),
            limit = policy.soft_cap_bytes,
            "snapshot over mirror soft cap; removing mirror"
        );
        drop_mirror(mirror);
        return MirrorOutcome::OverCapacity;
    }

    match mirror.write(payload) {
        Ok(()) => MirrorOutcome::Written,
        Err(StashError::CapacityExceeded { size, limit }) => {
            tracing::debug!(size, limit, "mirror refused payload; removing mirror");
            drop_mirror(mirror);
            MirrorOutcome::OverCapacity
        }
        Err(err) => {
            tracing::warn!(error = %err, "mirror write failed; removing mirror");
            drop_mirror(mirror);
            MirrorOutcome::Failed
        }
    }
}

fn drop_mirror<M: FastBootMirror + ?Sized>(mirror: &M) {
    if let Err(err) = mirror.remove() {
        tracing::warn!(error = %err, "failed to remove mirror");
    }
}
