use crate::app::AppContext;
use crate::cli::{AddArgs, DeleteArgs, ListArgs, UpdateArgs};
use crate::helpers::parse_fields;
use crate::output::{print_json, records_table};

fn ensure_collection(collection: &str, known: impl Iterator<Item = String>) -> anyhow::Result<()> {
    let known: Vec<String> = known.collect();
    if known.iter().any(|name| name == collection) {
        return Ok(());
    }
    Err(anyhow::anyhow!(
        "Unknown collection \"{}\".\nHint: Available collections: {}",
        collection,
        known.join(", ")
    ))
}

pub async fn handle_list(ctx: &AppContext<'_>, args: &ListArgs) -> anyhow::Result<()> {
    let store = ctx.open_entities().await?;
    ensure_collection(
        &args.collection,
        store.schema().collection_names().map(str::to_string),
    )?;

    let records = store.list(&args.collection)?;
    if args.json {
        return print_json(&*records);
    }
    if records.is_empty() {
        if !ctx.quiet() {
            println!("No records in {}.", args.collection);
        }
        return Ok(());
    }
    println!("{}", records_table(&records));
    Ok(())
}

pub async fn handle_add(ctx: &AppContext<'_>, args: &AddArgs) -> anyhow::Result<()> {
    let fields = parse_fields(&args.fields)?;
    let store = ctx.open_entities().await?;
    ensure_collection(
        &args.collection,
        store.schema().collection_names().map(str::to_string),
    )?;

    let record = store.create(&args.collection, fields)?;
    store.flush().await;

    if args.json {
        return print_json(&record);
    }
    if ctx.quiet() {
        println!("{}", record.id);
    } else {
        println!("Added {} to {}", record.id, args.collection);
    }
    Ok(())
}

pub async fn handle_update(ctx: &AppContext<'_>, args: &UpdateArgs) -> anyhow::Result<()> {
    let fields = parse_fields(&args.fields)?;
    let store = ctx.open_entities().await?;

    let record = store.update(&args.collection, &args.id, fields)?;
    store.flush().await;

    if args.json {
        return print_json(&record);
    }
    if !ctx.quiet() {
        println!("Updated {}", record.id);
    }
    Ok(())
}

pub async fn handle_delete(ctx: &AppContext<'_>, args: &DeleteArgs) -> anyhow::Result<()> {
    let store = ctx.open_entities().await?;
    if store.get(&args.collection, &args.id)?.is_none() {
        return Err(anyhow::anyhow!(
            "Record {} not found in {}",
            args.id,
            args.collection
        ));
    }

    store.delete(&args.collection, &args.id)?;
    store.flush().await;

    if !ctx.quiet() {
        println!("Deleted {}", args.id);
    }
    Ok(())
}
