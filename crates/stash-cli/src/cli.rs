use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use stash_core::VERSION;

/// Stash - local-first personal data manager
#[derive(Parser)]
#[command(name = "stash")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the config file
    #[arg(short, long, global = true, env = "STASH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a config file and create the data store
    Init(InitArgs),

    /// List records of a collection
    List(ListArgs),

    /// Add a record to a collection
    Add(AddArgs),

    /// Update fields of a record
    Update(UpdateArgs),

    /// Delete a record
    Delete(DeleteArgs),

    /// Write a backup file
    Export(ExportArgs),

    /// Replace all collections from a backup file
    Import(ImportArgs),

    /// Generate a random password
    Passgen(PassgenArgs),

    /// Rate a password
    Strength(StrengthArgs),

    /// Manage attachment folders
    #[command(subcommand)]
    Folder(FolderCommand),

    /// Manage attachment items
    #[command(subcommand)]
    Item(ItemCommand),

    /// Attach a file to an item
    Attach(AttachArgs),

    /// Show attachment bytes per folder
    Sizes(SizesArgs),
}

/// Arguments for the `init` command
#[derive(Args)]
pub struct InitArgs {
    /// Where the data file will live
    #[arg(long, value_name = "PATH")]
    pub data_path: Option<PathBuf>,

    /// Encrypt the data file with a password
    #[arg(long)]
    pub encrypt: bool,

    /// Store attachment bytes as files next to the data file
    #[arg(long)]
    pub external_attachments: bool,

    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `list` command
#[derive(Args)]
pub struct ListArgs {
    /// Collection name
    #[arg(value_name = "COLLECTION")]
    pub collection: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `add` command
#[derive(Args)]
pub struct AddArgs {
    /// Collection name
    #[arg(value_name = "COLLECTION")]
    pub collection: String,

    /// Field to set; values parse as JSON when they can
    #[arg(short, long = "field", value_name = "KEY=VALUE")]
    pub fields: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `update` command
#[derive(Args)]
pub struct UpdateArgs {
    /// Collection name
    #[arg(value_name = "COLLECTION")]
    pub collection: String,

    /// Record ID
    #[arg(value_name = "ID")]
    pub id: String,

    /// Field to set; values parse as JSON when they can
    #[arg(short, long = "field", value_name = "KEY=VALUE", required = true)]
    pub fields: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `delete` command
#[derive(Args)]
pub struct DeleteArgs {
    /// Collection name
    #[arg(value_name = "COLLECTION")]
    pub collection: String,

    /// Record ID
    #[arg(value_name = "ID")]
    pub id: String,
}

/// Arguments for the `export` command
#[derive(Args)]
pub struct ExportArgs {
    /// Destination file
    #[arg(value_name = "DEST")]
    pub destination: PathBuf,

    /// Gzip the backup
    #[arg(long)]
    pub gzip: bool,

    /// Encrypt the backup with a password
    #[arg(long)]
    pub encrypt: bool,
}

/// Arguments for the `import` command
#[derive(Args)]
pub struct ImportArgs {
    /// Backup file (plain, gzipped or encrypted)
    #[arg(value_name = "SRC")]
    pub source: PathBuf,
}

/// Arguments for the `passgen` command
#[derive(Args)]
pub struct PassgenArgs {
    /// Password length
    #[arg(short, long, default_value_t = 20)]
    pub length: usize,

    /// Letters and digits only
    #[arg(long)]
    pub no_symbols: bool,
}

/// Arguments for the `strength` command
#[derive(Args)]
pub struct StrengthArgs {
    /// Password to rate (prompted when omitted)
    #[arg(value_name = "PASSWORD")]
    pub password: Option<String>,
}

#[derive(Subcommand)]
pub enum FolderCommand {
    /// Create a folder
    Create {
        /// Folder name
        #[arg(value_name = "NAME")]
        name: String,

        /// Parent folder ID (root when omitted)
        #[arg(long)]
        parent: Option<String>,
    },

    /// List folders under a parent
    List {
        /// Parent folder ID (root when omitted)
        #[arg(long)]
        parent: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rename a folder
    Rename {
        #[arg(value_name = "ID")]
        id: String,

        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Move a folder under another folder
    Move {
        #[arg(value_name = "ID")]
        id: String,

        /// New parent folder ID (root when omitted)
        #[arg(long)]
        parent: Option<String>,
    },

    /// Delete a folder
    Delete {
        #[arg(value_name = "ID")]
        id: String,

        /// Also delete subfolders, items and files
        #[arg(long)]
        cascade: bool,
    },
}

#[derive(Subcommand)]
pub enum ItemCommand {
    /// Create an item
    Add {
        /// Item title
        #[arg(value_name = "TITLE")]
        title: String,

        /// Folder ID (root when omitted)
        #[arg(long)]
        folder: Option<String>,

        /// Add a tag
        #[arg(short, long, value_name = "TAG")]
        tag: Vec<String>,

        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// List items in a folder
    List {
        /// Folder ID (root when omitted)
        #[arg(long)]
        folder: Option<String>,

        /// List items in every folder
        #[arg(long, conflicts_with = "folder")]
        all: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Move an item to another folder
    Move {
        #[arg(value_name = "ID")]
        id: String,

        /// Target folder ID (root when omitted)
        #[arg(long)]
        folder: Option<String>,
    },

    /// Delete an item and its files
    Delete {
        #[arg(value_name = "ID")]
        id: String,
    },
}

/// Arguments for the `attach` command
#[derive(Args)]
pub struct AttachArgs {
    /// Item ID
    #[arg(value_name = "ITEM_ID")]
    pub item_id: String,

    /// File to attach
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// MIME type (guessed from the extension when omitted)
    #[arg(long)]
    pub mime: Option<String>,
}

/// Arguments for the `sizes` command
#[derive(Args)]
pub struct SizesArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
