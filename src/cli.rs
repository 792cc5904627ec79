//! Command-line interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "shelf", version, about = "Keep a personal library's covers and backups in order")]
pub struct Cli {
    /// Read configuration from this TOML file instead of the default location.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download every missing or stale cover.
    Covers,
    /// Show whether the cover cache still needs a rebuild after an import.
    Flag,
    /// Write a scrubbed snapshot of the library into a directory.
    Export {
        /// Directory to write the snapshot into.
        directory: PathBuf,
        /// Snapshot file name.
        #[arg(long)]
        name: Option<String>,
    },
    /// Replace the library with a snapshot.
    Import {
        /// A path or `file://` URI.
        source: String,
        /// Don't ask for confirmation.
        #[arg(long, short)]
        yes: bool,
    },
    /// Move the library to the trash and start over.
    Reset {
        #[arg(long, short)]
        yes: bool,
    },
    /// Swap the trashed library back in.
    Restore {
        #[arg(long, short)]
        yes: bool,
    },
}
