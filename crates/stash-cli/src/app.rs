//! Application context for the Stash CLI.
//!
//! Bundles CLI arguments with the lazily-loaded config and opens the
//! stores the commands work on.

use std::path::PathBuf;

use once_cell::unsync::OnceCell;
use zeroize::Zeroizing;

use stash_core::storage::{FileMirror, JsonFileBackend};
use stash_core::{AttachmentStore, CryptoService, DurableBackend, EntityStore, Schema};

use crate::cli::Cli;
use crate::config::{default_config_path, read_config, StashConfig};
use crate::helpers::read_password;

pub type Entities = EntityStore<JsonFileBackend, FileMirror>;
pub type Attachments = AttachmentStore<JsonFileBackend>;

pub struct AppContext<'a> {
    cli: &'a Cli,
    config: OnceCell<StashConfig>,
    crypto: OnceCell<CryptoService>,
    password: OnceCell<Zeroizing<String>>,
}

impl<'a> AppContext<'a> {
    pub fn new(cli: &'a Cli) -> Self {
        Self {
            cli,
            config: OnceCell::new(),
            crypto: OnceCell::new(),
            password: OnceCell::new(),
        }
    }

    pub fn quiet(&self) -> bool {
        self.cli.quiet
    }

    pub fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.cli.config {
            Some(path) => Ok(path.clone()),
            None => default_config_path(),
        }
    }

    pub fn config(&self) -> anyhow::Result<&StashConfig> {
        self.config.get_or_try_init(|| {
            let path = self.config_path()?;
            if !path.exists() {
                return Err(anyhow::anyhow!(missing_config_message(&path)));
            }
            read_config(&path)
        })
    }

    /// Crypto service honouring the configured fallback policy.
    pub fn crypto(&self) -> anyhow::Result<&CryptoService> {
        self.crypto.get_or_try_init(|| {
            let allow_fallback = self.config()?.crypto.allow_insecure_fallback;
            Ok(CryptoService::detect(allow_fallback)?)
        })
    }

    /// Password for data encrypted at rest, asked for at most once.
    fn data_password(&self) -> anyhow::Result<&str> {
        let password = self
            .password
            .get_or_try_init(|| read_password("Stash password"))?;
        Ok(password.as_str())
    }

    /// File backend for `path`, encrypted when configured.
    ///
    /// An encrypted file is read once up front so a wrong password fails
    /// here instead of booting an empty store that would overwrite it.
    async fn durable_backend(&self, path: PathBuf) -> anyhow::Result<JsonFileBackend> {
        let config = self.config()?;
        let backend = JsonFileBackend::new(path);
        if !config.data.encrypt_at_rest {
            return Ok(backend);
        }
        let password = self.data_password()?.to_string();
        let backend = backend.with_password(self.crypto()?.clone(), password);
        backend.load().await.map_err(|e| {
            anyhow::anyhow!("Failed to open {}: {}", backend.path().display(), e)
        })?;
        Ok(backend)
    }

    /// Boot the entity store from the configured data file.
    pub async fn open_entities(&self) -> anyhow::Result<Entities> {
        let config = self.config()?;
        let durable = self.durable_backend(config.data_path()).await?;
        let store = EntityStore::boot(
            Schema::default(),
            durable,
            FileMirror::new(config.mirror_path()),
            config.mirror_policy(),
        )
        .await?;
        Ok(store)
    }

    /// Open the attachment store next to the data file.
    pub async fn open_attachments(&self) -> anyhow::Result<Attachments> {
        let config = self.config()?;
        let durable = self.durable_backend(config.attachments_path()).await?;
        Ok(AttachmentStore::open(durable, config.blob_backend()).await)
    }
}

pub fn missing_config_message(path: &std::path::Path) -> String {
    format!(
        "No config found at {}.\nHint: Run `stash init` to create one.",
        path.display()
    )
}
