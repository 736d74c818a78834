use stash_core::storage::JsonFileBackend;
use stash_core::{CryptoService, DurableBackend, Schema};

use crate::app::AppContext;
use crate::cli::InitArgs;
use crate::config::{default_data_path, write_config, AttachmentBackend, StashConfig};
use crate::helpers::read_new_password;

pub async fn handle_init(ctx: &AppContext<'_>, args: &InitArgs) -> anyhow::Result<()> {
    let config_path = ctx.config_path()?;
    if config_path.exists() && !args.force {
        return Err(anyhow::anyhow!(
            "Config already exists at {}.\nHint: Use --force to overwrite it.",
            config_path.display()
        ));
    }

    let data_path = match &args.data_path {
        Some(path) => path.clone(),
        None => default_data_path()?,
    };
    let backend = if args.external_attachments {
        AttachmentBackend::External
    } else {
        AttachmentBackend::Embedded
    };
    let config = StashConfig::new(data_path.clone(), args.encrypt, backend);

    if !data_path.exists() {
        let mut durable = JsonFileBackend::new(&data_path);
        if args.encrypt {
            let crypto = CryptoService::detect(config.crypto.allow_insecure_fallback)?;
            let password = read_new_password("New stash password")?;
            durable = durable.with_password(crypto, password.as_str());
        }
        durable.save(Schema::default().defaults().to_value()).await?;
    } else if !ctx.quiet() {
        println!("Using existing data file {}", data_path.display());
    }

    write_config(&config_path, &config)?;
    tracing::info!(config = %config_path.display(), "config written");

    if !ctx.quiet() {
        println!("Initialized stash at {}", data_path.display());
        println!("Config written to {}", config_path.display());
    }
    Ok(())
}
