//! Stash CLI - local-first personal data manager
//!
//! Thin command-line surface over `stash-core`: collection records, backups,
//! attachment folders and password tools.

mod app;
mod cli;
mod commands;
mod config;
mod helpers;
mod output;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::app::AppContext;
use crate::cli::{Cli, Commands};
use crate::commands::{attachments, backup, init, passwords, records};

const LOG_ENV: &str = "STASH_LOG";

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let ctx = AppContext::new(&cli);

    match &cli.command {
        Commands::Init(args) => init::handle_init(&ctx, args).await,
        Commands::List(args) => records::handle_list(&ctx, args).await,
        Commands::Add(args) => records::handle_add(&ctx, args).await,
        Commands::Update(args) => records::handle_update(&ctx, args).await,
        Commands::Delete(args) => records::handle_delete(&ctx, args).await,
        Commands::Export(args) => backup::handle_export(&ctx, args).await,
        Commands::Import(args) => backup::handle_import(&ctx, args).await,
        Commands::Passgen(args) => passwords::handle_passgen(args),
        Commands::Strength(args) => passwords::handle_strength(args),
        Commands::Folder(command) => attachments::handle_folder(&ctx, command).await,
        Commands::Item(command) => attachments::handle_item(&ctx, command).await,
        Commands::Attach(args) => attachments::handle_attach(&ctx, args).await,
        Commands::Sizes(args) => attachments::handle_sizes(&ctx, args).await,
    }
}
