//! Key derivation using PBKDF2-HMAC-SHA256.
//!
//! Every ciphertext carries its own random salt, so the same password
//! yields a fresh key per encryption.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::ZeroizeOnDrop;

use crate::error::{Result, StashError};

/// PBKDF2 iteration count used for every stored ciphertext.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Salt length in bytes.
pub const SALT_LENGTH: usize = 16;

/// Length of derived key in bytes (32 bytes = 256 bits for AES-256).
pub const KEY_LENGTH: usize = 32;

/// A cryptographic key derived from a password.
///
/// Key material is zeroized from memory when dropped.
#[derive(Clone, ZeroizeOnDrop)]
pub struct DerivedKey {
    key: [u8; KEY_LENGTH],
}

impl DerivedKey {
    /// Get a reference to the raw key bytes.
    ///
    /// Avoid storing or logging this value. Use only for immediate encryption operations.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Derive a 256-bit key from a password and salt.
///
/// Same password + salt + iterations always produces the same key.
///
/// # Errors
///
/// Returns `StashError::InvalidInput` for an empty password, a salt shorter
/// than [`SALT_LENGTH`], or zero iterations.
pub fn derive_key(password: &str, salt: &[u8], iterations: u32) -> Result<DerivedKey> {
    if password.is_empty() {
        return Err(StashError::InvalidInput(
            "Password cannot be empty".to_string(),
        ));
    }

    if salt.len() < SALT_LENGTH {
        return Err(StashError::InvalidInput(format!(
            "Salt must be at least {} bytes",
            SALT_LENGTH
        )));
    }

    if iterations == 0 {
        return Err(StashError::InvalidInput(
            "Iteration count must be positive".to_string(),
        ));
    }

    let mut key = [0u8; KEY_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    Ok(DerivedKey { key })
}
