use stash_core::backup::is_encrypted;
use stash_core::{decode_backup, encode_backup, BackupOptions};

use crate::app::AppContext;
use crate::cli::{ExportArgs, ImportArgs};
use crate::helpers::{read_new_password, read_password};

pub async fn handle_export(ctx: &AppContext<'_>, args: &ExportArgs) -> anyhow::Result<()> {
    let store = ctx.open_entities().await?;
    let password = if args.encrypt {
        Some(read_new_password("Backup password")?)
    } else {
        None
    };

    let backup = store.export_all()?;
    let options = BackupOptions {
        gzip: args.gzip,
        password: password.as_ref().map(|p| p.as_str().to_string()),
    };
    let bytes = encode_backup(ctx.crypto()?, &backup, &options)?;
    stash_core::fs::write_atomic(&args.destination, &bytes).map_err(|e| {
        anyhow::anyhow!(
            "Failed to write backup {}: {}",
            args.destination.display(),
            e
        )
    })?;
    store.flush().await;

    if !ctx.quiet() {
        println!(
            "Exported backup to {} ({} bytes)",
            args.destination.display(),
            bytes.len()
        );
    }
    Ok(())
}

pub async fn handle_import(ctx: &AppContext<'_>, args: &ImportArgs) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.source).map_err(|e| {
        anyhow::anyhow!("Failed to read backup {}: {}", args.source.display(), e)
    })?;
    let password = if is_encrypted(&bytes)? {
        Some(read_password("Backup password")?)
    } else {
        None
    };

    let data = decode_backup(ctx.crypto()?, &bytes, password.as_deref().map(String::as_str))?;
    let store = ctx.open_entities().await?;
    store.import_all(&data)?;
    store.flush().await;

    if !ctx.quiet() {
        println!("Imported backup from {}", args.source.display());
    }
    Ok(())
}
