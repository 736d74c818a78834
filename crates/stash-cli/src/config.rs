use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use stash_core::storage::DEFAULT_SOFT_CAP_BYTES;
use stash_core::{BlobBackendKind, MirrorPolicy};

const MIRROR_FILE: &str = "stash.mirror.json";
const ATTACHMENTS_FILE: &str = "attachments.json";

#[derive(Debug, Serialize, Deserialize)]
pub struct StashConfig {
    pub data: DataSection,
    #[serde(default)]
    pub mirror: MirrorSection,
    #[serde(default)]
    pub attachments: AttachmentsSection,
    #[serde(default)]
    pub crypto: CryptoSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DataSection {
    pub path: String,
    #[serde(default)]
    pub encrypt_at_rest: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MirrorSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_soft_cap")]
    pub soft_cap_bytes: usize,
}

impl Default for MirrorSection {
    fn default() -> Self {
        Self {
            enabled: true,
            soft_cap_bytes: DEFAULT_SOFT_CAP_BYTES,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct AttachmentsSection {
    #[serde(default)]
    pub backend: AttachmentBackend,
    /// Root for external files; defaults to the data directory
    pub root: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentBackend {
    #[default]
    Embedded,
    External,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct CryptoSection {
    #[serde(default)]
    pub allow_insecure_fallback: bool,
}

fn default_true() -> bool {
    true
}

fn default_soft_cap() -> usize {
    DEFAULT_SOFT_CAP_BYTES
}

impl StashConfig {
    pub fn new(data_path: PathBuf, encrypt_at_rest: bool, backend: AttachmentBackend) -> Self {
        Self {
            data: DataSection {
                path: data_path.to_string_lossy().to_string(),
                encrypt_at_rest,
            },
            mirror: MirrorSection::default(),
            attachments: AttachmentsSection {
                backend,
                root: None,
            },
            crypto: CryptoSection::default(),
        }
    }

    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data.path)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    pub fn mirror_path(&self) -> PathBuf {
        self.data_dir().join(MIRROR_FILE)
    }

    pub fn attachments_path(&self) -> PathBuf {
        self.data_dir().join(ATTACHMENTS_FILE)
    }

    /// The mirror is plaintext, so it stays off when data is encrypted at rest.
    pub fn mirror_policy(&self) -> MirrorPolicy {
        if self.data.encrypt_at_rest {
            return MirrorPolicy::disabled();
        }
        MirrorPolicy {
            enabled: self.mirror.enabled,
            soft_cap_bytes: self.mirror.soft_cap_bytes,
        }
    }

    pub fn blob_backend(&self) -> BlobBackendKind {
        match self.attachments.backend {
            AttachmentBackend::Embedded => BlobBackendKind::Embedded,
            AttachmentBackend::External => BlobBackendKind::External {
                root: self
                    .attachments
                    .root
                    .as_ref()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| self.data_dir()),
            },
        }
    }
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(xdg_config_dir()?.join("config.toml"))
}

pub fn default_data_path() -> anyhow::Result<PathBuf> {
    Ok(xdg_data_dir()?.join("stash.json"))
}

pub fn read_config(path: &Path) -> anyhow::Result<StashConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))?;
    toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse config {}: {}", path.display(), e))
}

pub fn write_config(path: &Path, config: &StashConfig) -> anyhow::Result<()> {
    let contents =
        toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("TOML error: {}", e))?;
    stash_core::fs::write_atomic(path, contents.as_bytes())
        .map_err(|e| anyhow::anyhow!("Failed to write config {}: {}", path.display(), e))?;
    Ok(())
}

pub fn xdg_config_dir() -> anyhow::Result<PathBuf> {
    if let Ok(value) = std::env::var("XDG_CONFIG_HOME") {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value).join("stash"));
        }
    }
    Ok(home_dir()?.join(".config").join("stash"))
}

pub fn xdg_data_dir() -> anyhow::Result<PathBuf> {
    if let Ok(value) = std::env::var("XDG_DATA_HOME") {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value).join("stash"));
        }
    }
    Ok(home_dir()?.join(".local").join("share").join("stash"))
}

fn home_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| anyhow::anyhow!("HOME is not set; cannot resolve default paths"))?;
    Ok(PathBuf::from(home))
}
