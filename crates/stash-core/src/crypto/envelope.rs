//! Self-describing wrapper for encrypted JSON payloads.
//!
//! `{"isEncrypted": true, "data": "<base64>"}` can always be told apart from
//! a plain backup object without any external metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Encrypted payload wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "isEncrypted")]
    pub is_encrypted: bool,

    /// Base64 ciphertext as produced by `CryptoService::encrypt`
    pub data: String,
}

impl Envelope {
    pub fn new(data: String) -> Self {
        Self {
            is_encrypted: true,
            data,
        }
    }

    /// Recognise an envelope inside an arbitrary JSON value.
    ///
    /// Only objects with `isEncrypted == true` and a string `data` qualify.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        if object.get("isEncrypted").and_then(Value::as_bool) != Some(true) {
            return None;
        }
        let data = object.get("data")?.as_str()?;
        Some(Self::new(data.to_string()))
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "isEncrypted": self.is_encrypted,
            "data": self.data,
        })
    }
}
