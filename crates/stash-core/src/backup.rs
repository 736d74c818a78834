//! Backup file encoding.
//!
//! A backup is the JSON object produced by `EntityStore::export_all`,
//! optionally wrapped in an encrypted envelope, optionally gzipped. Decoding
//! detects both layers from the bytes themselves.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;

use crate::crypto::{CryptoService, Envelope};
use crate::error::{Result, StashError};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// How to write a backup.
#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    pub gzip: bool,
    pub password: Option<String>,
}

/// Serialize `value` as a backup file.
pub fn encode_backup(
    crypto: &CryptoService,
    value: &Value,
    options: &BackupOptions,
) -> Result<Vec<u8>> {
    let payload = match options.password.as_deref() {
        Some(password) => crypto.encrypt_data(value, password)?.to_value(),
        None => value.clone(),
    };
    let text = serde_json::to_vec(&payload)?;
    if !options.gzip {
        return Ok(text);
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&text)?;
    Ok(encoder.finish()?)
}

/// Whether `bytes` start with the gzip magic number.
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Whether a decoded backup payload is an encrypted envelope.
pub fn is_encrypted(bytes: &[u8]) -> Result<bool> {
    let value = parse_payload(bytes)?;
    Ok(Envelope::from_value(&value).is_some())
}

/// Parse a backup file back into its JSON object.
///
/// # Errors
///
/// Returns `StashError::Corrupt` for undecodable bytes,
/// `StashError::InvalidInput` for an encrypted backup without a password,
/// and `StashError::DecryptionFailed` for a wrong password.
pub fn decode_backup(
    crypto: &CryptoService,
    bytes: &[u8],
    password: Option<&str>,
) -> Result<Value> {
    let value = parse_payload(bytes)?;
    if Envelope::from_value(&value).is_none() {
        return Ok(value);
    }
    let password = password.ok_or_else(|| {
        StashError::InvalidInput("Backup is encrypted; a password is required".to_string())
    })?;
    crypto.decrypt_data(&value, password)
}

fn parse_payload(bytes: &[u8]) -> Result<Value> {
    let text = if is_gzip(bytes) {
        let mut decoded = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut decoded)
            .map_err(|e| StashError::Corrupt(format!("Backup is not valid gzip: {}", e)))?;
        decoded
    } else {
        bytes.to_vec()
    };
    serde_json::from_slice(&text)
        .map_err(|e| StashError::Corrupt(format!("Backup is not valid JSON: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "accounts": [{"id": "a1", "created_date": "2024-01-01T00:00:00Z",
                          "updated_date": "2024-01-01T00:00:00Z", "name": "Checking"}],
            "backup_timestamp": "2024-05-01T12:00:00Z"
        })
    }

    #[test]
    fn test_plain_backup_is_json() {
        let crypto = CryptoService::new().unwrap();
        let bytes = encode_backup(&crypto, &sample(), &BackupOptions::default()).unwrap();

        assert!(!is_gzip(&bytes));
        assert!(!is_encrypted(&bytes).unwrap());
        assert_eq!(decode_backup(&crypto, &bytes, None).unwrap(), sample());
    }

    #[test]
    fn test_gzip_encrypted_backup() {
        let crypto = CryptoService::new().unwrap();
        let options = BackupOptions {
            gzip: true,
            password: Some("correct horse".to_string()),
        };
        let bytes = encode_backup(&crypto, &sample(), &options).unwrap();

        assert!(is_gzip(&bytes));
        assert!(is_encrypted(&bytes).unwrap());
        assert_eq!(
            decode_backup(&crypto, &bytes, Some("correct horse")).unwrap(),
            sample()
        );
        assert!(matches!(
            decode_backup(&crypto, &bytes, None),
            Err(StashError::InvalidInput(_))
        ));
        assert!(matches!(
            decode_backup(&crypto, &bytes, Some("wrong")),
            Err(StashError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let crypto = CryptoService::new().unwrap();
        assert!(matches!(
            decode_backup(&crypto, b"not json", None),
            Err(StashError::Corrupt(_))
        ));
        assert!(matches!(
            decode_backup(&crypto, &[0x1f, 0x8b, 0, 1, 2], None),
            Err(StashError::Corrupt(_))
        ));
    }
}
