//! Input and parsing helper functions for the CLI.

use std::io::IsTerminal;
use std::path::Path;

use dialoguer::Password;
use serde_json::Value;
use zeroize::Zeroizing;

use stash_core::storage::Fields;

const PASSWORD_ENV: &str = "STASH_PASSWORD";

fn password_from_env() -> Option<Zeroizing<String>> {
    match std::env::var(PASSWORD_ENV) {
        Ok(value) if !value.trim().is_empty() => Some(Zeroizing::new(value)),
        _ => None,
    }
}

/// Read a password from STASH_PASSWORD, or prompt on a terminal.
pub fn read_password(prompt: &str) -> anyhow::Result<Zeroizing<String>> {
    if let Some(password) = password_from_env() {
        return Ok(password);
    }
    if !std::io::stdin().is_terminal() {
        return Err(anyhow::anyhow!(
            "No password provided and no TTY available. Set {}.",
            PASSWORD_ENV
        ));
    }
    Password::new()
        .with_prompt(prompt)
        .interact()
        .map(Zeroizing::new)
        .map_err(|e| anyhow::anyhow!("Failed to read password: {}", e))
}

/// Like [`read_password`], with confirmation when prompting.
pub fn read_new_password(prompt: &str) -> anyhow::Result<Zeroizing<String>> {
    if let Some(password) = password_from_env() {
        return Ok(password);
    }
    if !std::io::stdin().is_terminal() {
        return Err(anyhow::anyhow!(
            "No password provided and no TTY available. Set {}.",
            PASSWORD_ENV
        ));
    }
    Password::new()
        .with_prompt(prompt)
        .with_confirmation("Confirm password", "Passwords do not match")
        .interact()
        .map(Zeroizing::new)
        .map_err(|e| anyhow::anyhow!("Failed to read password: {}", e))
}

/// Parse `key=value`. The value is JSON when it parses as JSON, otherwise a
/// string.
pub fn parse_field(raw: &str) -> anyhow::Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("Invalid field \"{}\": expected KEY=VALUE", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow::anyhow!("Invalid field \"{}\": empty key", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

pub fn parse_fields(raw: &[String]) -> anyhow::Result<Fields> {
    let mut fields = Fields::new();
    for field in raw {
        let (key, value) = parse_field(field)?;
        fields.insert(key, value);
    }
    Ok(fields)
}

/// MIME type from a file extension.
pub fn guess_mime(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "pdf" => "application/pdf",
        "txt" | "md" => "text/plain",
        "json" => "application/json",
        "csv" => "text/csv",
        _ => "application/octet-stream",
    }
}
