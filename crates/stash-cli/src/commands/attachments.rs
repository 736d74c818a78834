use std::collections::BTreeSet;

use stash_core::{FileMeta, Item};

use crate::app::AppContext;
use crate::cli::{AttachArgs, FolderCommand, ItemCommand, SizesArgs};
use crate::helpers::guess_mime;
use crate::output::{file_line, folders_table, items_table, print_json, sizes_json, sizes_table};

pub async fn handle_folder(ctx: &AppContext<'_>, command: &FolderCommand) -> anyhow::Result<()> {
    let store = ctx.open_attachments().await?;
    match command {
        FolderCommand::Create { name, parent } => {
            let folder = store.create_folder(name, parent.as_deref()).await?;
            if ctx.quiet() {
                println!("{}", folder.id);
            } else {
                println!("Created folder {} ({})", folder.name, folder.id);
            }
        }
        FolderCommand::List { parent, json } => {
            let folders = store.list_folders(parent.as_deref()).await;
            if *json {
                return print_json(&folders);
            }
            if folders.is_empty() {
                if !ctx.quiet() {
                    println!("No folders.");
                }
                return Ok(());
            }
            println!("{}", folders_table(&folders));
        }
        FolderCommand::Rename { id, name } => {
            let folder = store.rename_folder(id, name).await?;
            if !ctx.quiet() {
                println!("Renamed folder {} to {}", folder.id, folder.name);
            }
        }
        FolderCommand::Move { id, parent } => {
            store.move_folder(id, parent.as_deref()).await?;
            if !ctx.quiet() {
                println!("Moved folder {}", id);
            }
        }
        FolderCommand::Delete { id, cascade } => {
            if store.get_folder(id).await.is_none() {
                return Err(anyhow::anyhow!("Folder {} not found", id));
            }
            store.delete_folder(id, *cascade).await.map_err(|e| match e {
                stash_core::StashError::NotEmpty(_) => anyhow::anyhow!(
                    "{}\nHint: Use --cascade to delete its contents too.",
                    e
                ),
                other => other.into(),
            })?;
            if !ctx.quiet() {
                println!("Deleted folder {}", id);
            }
        }
    }
    Ok(())
}

pub async fn handle_item(ctx: &AppContext<'_>, command: &ItemCommand) -> anyhow::Result<()> {
    let store = ctx.open_attachments().await?;
    match command {
        ItemCommand::Add {
            title,
            folder,
            tag,
            notes,
        } => {
            let item = Item {
                folder_id: folder.clone(),
                tags: tag.iter().cloned().collect::<BTreeSet<_>>(),
                notes: notes.clone().unwrap_or_default(),
                ..Item::new(title.as_str())
            };
            let item = store.save_item(item).await?;
            if ctx.quiet() {
                println!("{}", item.id);
            } else {
                println!("Created item {} ({})", item.title, item.id);
            }
        }
        ItemCommand::List { folder, all, json } => {
            let items = if *all {
                store.all_items().await
            } else {
                store.list_items(folder.as_deref()).await
            };
            if *json {
                return print_json(&items);
            }
            if items.is_empty() {
                if !ctx.quiet() {
                    println!("No items.");
                }
                return Ok(());
            }
            println!("{}", items_table(&items));
        }
        ItemCommand::Move { id, folder } => {
            store.move_item(id, folder.as_deref()).await?;
            if !ctx.quiet() {
                println!("Moved item {}", id);
            }
        }
        ItemCommand::Delete { id } => {
            if store.get_item(id).await.is_none() {
                return Err(anyhow::anyhow!("Item {} not found", id));
            }
            store.delete_item(id).await?;
            if !ctx.quiet() {
                println!("Deleted item {}", id);
            }
        }
    }
    Ok(())
}

pub async fn handle_attach(ctx: &AppContext<'_>, args: &AttachArgs) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.file)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", args.file.display(), e))?;
    let name = args
        .file
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    let mime = args
        .mime
        .clone()
        .unwrap_or_else(|| guess_mime(&args.file).to_string());

    let store = ctx.open_attachments().await?;
    let file = store
        .save_file_blob(&args.item_id, bytes, FileMeta::new(name, mime))
        .await?;

    if ctx.quiet() {
        println!("{}", file.id);
    } else {
        println!("Attached {}", file_line(&file));
    }
    Ok(())
}

pub async fn handle_sizes(ctx: &AppContext<'_>, args: &SizesArgs) -> anyhow::Result<()> {
    let store = ctx.open_attachments().await?;
    let sizes = store.folder_sizes().await;
    if args.json {
        return print_json(&sizes_json(&sizes));
    }
    if sizes.is_empty() {
        if !ctx.quiet() {
            println!("No folders.");
        }
        return Ok(());
    }

    let mut rows = Vec::with_capacity(sizes.len());
    for (id, bytes) in &sizes {
        let path: Vec<String> = store
            .get_folder_path(id)
            .await
            .into_iter()
            .map(|folder| folder.name)
            .collect();
        rows.push((path.join("/"), *bytes));
    }
    rows.sort();
    println!("{}", sizes_table(&rows));
    Ok(())
}
