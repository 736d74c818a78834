//! Password-based encryption for Stash.
//!
//! ## Format
//!
//! `encrypt` returns `base64(salt ‖ nonce ‖ ciphertext ‖ tag)`:
//! - 16-byte random salt, PBKDF2-HMAC-SHA256 with 100 000 iterations
//! - 12-byte random nonce, AES-256-GCM
//!
//! Salt and nonce are fresh per call, so encrypting the same text twice
//! never yields the same output.
//!
//! ## Capability detection
//!
//! [`CryptoService::detect`] runs a self-test once at startup. If the
//! primitives (including the OS random source) fail it, startup fails with
//! `StashError::CryptoUnavailable` unless the caller explicitly allows the
//! insecure fallback. The fallback only base64-encodes
//! `password + "::" + plaintext`: it is reversible by anyone and provides no
//! confidentiality. Failures during normal operation never switch modes.

pub mod envelope;
pub mod key;
pub mod password;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::Value;

use crate::error::{Result, StashError};

pub use envelope::Envelope;
pub use key::{derive_key, DerivedKey, PBKDF2_ITERATIONS, SALT_LENGTH};
pub use password::{check_password_strength, generate_password, PasswordStrength};

use password::require_password;

/// AES-GCM nonce length in bytes.
pub const NONCE_LENGTH: usize = 12;

/// AES-GCM authentication tag length in bytes.
const TAG_LENGTH: usize = 16;

/// Which primitive set the service runs on, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoMode {
    /// PBKDF2 + AES-256-GCM
    Aead,
    /// Reversible base64 obfuscation. Not encryption.
    InsecureObfuscation,
}

/// Password-based encrypt/decrypt service.
#[derive(Debug, Clone)]
pub struct CryptoService {
    mode: CryptoMode,
}

impl CryptoService {
    /// Build a service after checking the platform primitives.
    ///
    /// # Errors
    ///
    /// Returns `StashError::CryptoUnavailable` when the self-test fails and
    /// `allow_insecure_fallback` is false.
    pub fn detect(allow_insecure_fallback: bool) -> Result<Self> {
        match self_test() {
            Ok(()) => Ok(Self {
                mode: CryptoMode::Aead,
            }),
            Err(err) if allow_insecure_fallback => {
                tracing::error!(
                    error = %err,
                    "crypto self-test failed; using insecure obfuscation fallback"
                );
                Ok(Self {
                    mode: CryptoMode::InsecureObfuscation,
                })
            }
            Err(err) => Err(StashError::CryptoUnavailable(err.to_string())),
        }
    }

    /// Secure service; fails when the primitives are unavailable.
    pub fn new() -> Result<Self> {
        Self::detect(false)
    }

    /// Service in obfuscation mode, for reading payloads written by a
    /// fallback-mode install. Never use it to protect new data.
    pub fn insecure_obfuscation() -> Self {
        Self {
            mode: CryptoMode::InsecureObfuscation,
        }
    }

    pub fn mode(&self) -> CryptoMode {
        self.mode
    }

    pub fn is_secure(&self) -> bool {
        self.mode == CryptoMode::Aead
    }

    /// Encrypt UTF-8 text with a password, returning base64.
    pub fn encrypt(&self, plaintext: &str, password: &str) -> Result<String> {
        require_password(password)?;
        match self.mode {
            CryptoMode::Aead => {
                let blob = seal(plaintext.as_bytes(), password, PBKDF2_ITERATIONS)?;
                Ok(STANDARD.encode(blob))
            }
            CryptoMode::InsecureObfuscation => {
                Ok(STANDARD.encode(format!("{}::{}", password, plaintext)))
            }
        }
    }

    /// Decrypt base64 produced by [`CryptoService::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns `StashError::DecryptionFailed` for a wrong password, tampered
    /// or truncated input, or output that is not UTF-8.
    pub fn decrypt(&self, ciphertext: &str, password: &str) -> Result<String> {
        require_password(password)?;
        let blob = STANDARD
            .decode(ciphertext.trim().as_bytes())
            .map_err(|_| StashError::DecryptionFailed)?;
        match self.mode {
            CryptoMode::Aead => {
                let plaintext = open(&blob, password, PBKDF2_ITERATIONS)?;
                String::from_utf8(plaintext).map_err(|_| StashError::DecryptionFailed)
            }
            CryptoMode::InsecureObfuscation => {
                let text = String::from_utf8(blob).map_err(|_| StashError::DecryptionFailed)?;
                text.strip_prefix(&format!("{}::", password))
                    .map(str::to_string)
                    .ok_or(StashError::DecryptionFailed)
            }
        }
    }

    /// Serialize `value` and wrap its ciphertext in an [`Envelope`].
    pub fn encrypt_data(&self, value: &Value, password: &str) -> Result<Envelope> {
        let plaintext = serde_json::to_string(value)?;
        Ok(Envelope::new(self.encrypt(&plaintext, password)?))
    }

    /// Unwrap either an envelope object or a raw ciphertext string.
    pub fn decrypt_data(&self, input: &Value, password: &str) -> Result<Value> {
        let ciphertext = match (Envelope::from_value(input), input.as_str()) {
            (Some(envelope), _) => envelope.data,
            (None, Some(raw)) => raw.to_string(),
            (None, None) => {
                return Err(StashError::InvalidInput(
                    "Expected an encrypted envelope or ciphertext string".to_string(),
                ))
            }
        };
        let plaintext = self.decrypt(&ciphertext, password)?;
        serde_json::from_str(&plaintext)
            .map_err(|e| StashError::Corrupt(format!("Decrypted payload is not JSON: {}", e)))
    }
}

fn fill_random(buf: &mut [u8]) -> Result<()> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| StashError::Crypto(format!("Random source failed: {}", e)))
}

fn cipher_for(password: &str, salt: &[u8], iterations: u32) -> Result<Aes256Gcm> {
    let key = derive_key(password, salt, iterations)?;
    Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| StashError::Crypto(format!("Invalid key length: {}", e)))
}

fn seal(plaintext: &[u8], password: &str, iterations: u32) -> Result<Vec<u8>> {
    let mut salt = [0u8; SALT_LENGTH];
    fill_random(&mut salt)?;
    let mut nonce_bytes = [0u8; NONCE_LENGTH];
    fill_random(&mut nonce_bytes)?;

    let cipher = cipher_for(password, &salt, iterations)?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| StashError::Crypto("Encryption failed".to_string()))?;

    let mut blob = Vec::with_capacity(SALT_LENGTH + NONCE_LENGTH + ciphertext.len());
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

fn open(blob: &[u8], password: &str, iterations: u32) -> Result<Vec<u8>> {
    if blob.len() < SALT_LENGTH + NONCE_LENGTH + TAG_LENGTH {
        return Err(StashError::DecryptionFailed);
    }
    let (salt, rest) = blob.split_at(SALT_LENGTH);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LENGTH);

    let cipher = cipher_for(password, salt, iterations)?;
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| StashError::DecryptionFailed)
}

/// Round-trip a fixed message with a single KDF iteration.
fn self_test() -> Result<()> {
    let message = b"stash-crypto-self-test";
    let blob = seal(message, "self-test", 1)?;
    let opened = open(&blob, "self-test", 1)?;
    if opened != message {
        return Err(StashError::Crypto("Self-test round trip mismatch".to_string()));
    }
    Ok(())
}
