use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "docmirror")]
#[command(about = "Back up document collections into a relational mirror and recover deletions")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to the mirror database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional directory holding `<collection>.jsonl` exports
    #[arg(long, global = true, value_name = "DIR")]
    pub source_dir: Option<PathBuf>,

    /// Optional config file (defaults to docmirror.json in the config dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Snapshot collections into their mirror tables
    Sync {
        /// Collection to sync instead of the configured list (repeatable)
        #[arg(short, long = "collection", value_name = "NAME")]
        collections: Vec<String>,
    },
    /// List documents flagged deleted in the mirror
    List {
        /// Only this collection
        collection: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Restore one deleted document into the primary store
    Recover {
        /// Collection name
        collection: String,
        /// Document id
        id: String,
    },
    /// Restore every deleted document of a collection
    RecoverAll {
        /// Collection name
        collection: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show recent backup runs and mirror table counts
    Stats {
        /// Number of backup runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the resolved configuration
    Config,
}
