//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// dashsync - move dashboard snapshots between environments
#[derive(Parser, Debug)]
#[command(name = "dashsync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.dashsync/data/dashsync.db)
    #[arg(long, global = true, env = "DASHSYNC_DB")]
    pub db: Option<PathBuf>,

    /// Blob store directory (default: ~/.dashsync/blobs)
    #[arg(long, global = true, env = "DASHSYNC_BLOB_DIR")]
    pub blob_dir: Option<PathBuf>,

    /// Sync status directory (default: ~/.dashsync/status)
    #[arg(long, global = true, env = "DASHSYNC_STATUS_DIR")]
    pub status_dir: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database, blob store and status directories
    Init {
        /// Re-run initialization on an existing database
        #[arg(long)]
        force: bool,
    },

    /// Print version information
    Version,

    /// Export a snapshot of the synced tables
    Export {
        /// Only export these tables (comma-separated)
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,

        /// Sync version to stamp on the payload (default: current Unix time)
        #[arg(long)]
        sync_version: Option<i64>,

        /// Write the payload to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Upload a payload file in chunks and print its sync key
    Upload {
        /// Payload file
        file: PathBuf,

        /// Sync key to store under (default: generated)
        #[arg(long)]
        key: Option<String>,

        /// Chunk size in bytes (default from config, 10 MiB)
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Drive the multipart upload protocol one step at a time
    Transport {
        #[command(subcommand)]
        command: TransportCommands,
    },

    /// Apply a snapshot to the database
    Import(ImportArgs),

    /// Show or maintain sync status records
    Status(StatusArgs),

    /// List sync ledger entries
    Ledger {
        /// Only entries for this sync version
        #[arg(long)]
        sync_version: Option<i64>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Transport Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum TransportCommands {
    /// Open an upload session
    Start {
        /// Sync key to store under (default: generated)
        #[arg(long)]
        key: Option<String>,

        /// Chunk size in bytes (default from config, 10 MiB)
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Upload one part
    Part {
        /// Sync key
        key: String,

        /// Upload ID returned by `start`
        #[arg(long)]
        upload_id: String,

        /// 1-based part number
        #[arg(long)]
        part_number: u32,

        /// File holding the part bytes
        file: PathBuf,

        /// FILE is the whole payload; upload only this part's byte range
        #[arg(long)]
        slice: bool,
    },

    /// Assemble the uploaded parts into the stored blob
    Complete {
        /// Sync key
        key: String,

        /// Upload ID returned by `start`
        #[arg(long)]
        upload_id: String,

        /// Parts in order, as NUMBER:ETAG (comma-separated)
        #[arg(long, value_delimiter = ',', value_parser = parse_part_ref, required = true)]
        parts: Vec<crate::sync::PartRef>,
    },

    /// Discard an upload session and its parts
    Abort {
        /// Sync key
        key: String,

        /// Upload ID returned by `start`
        #[arg(long)]
        upload_id: String,
    },

    /// List open upload sessions
    List,
}

/// Parse `NUMBER:ETAG` into a part reference.
fn parse_part_ref(s: &str) -> std::result::Result<crate::sync::PartRef, String> {
    let (number, etag) = s
        .split_once(':')
        .ok_or_else(|| format!("expected NUMBER:ETAG, got '{s}'"))?;
    let part_number = number
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("bad part number '{number}': {e}"))?;
    let etag = etag.trim();
    if etag.is_empty() {
        return Err(format!("missing etag for part {part_number}"));
    }
    Ok(crate::sync::PartRef {
        part_number,
        etag: etag.to_string(),
    })
}

// ============================================================================
// Import / Status
// ============================================================================

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Sync key of a completed upload
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub key: Option<String>,

    /// Payload file to import directly
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Sync version (default: the version in the payload)
    #[arg(long)]
    pub sync_version: Option<i64>,

    /// Insert batch size (default from config, 100)
    #[arg(long)]
    pub batch_size: Option<usize>,
}

#[derive(Args, Debug)]
#[command(args_conflicts_with_subcommands = true)]
pub struct StatusArgs {
    #[command(subcommand)]
    pub command: Option<StatusCommands>,

    /// Sync key to show
    pub key: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum StatusCommands {
    /// Delete expired status records
    Purge,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_part_ref() {
        let part = parse_part_ref("2:abc123").unwrap();
        assert_eq!(part.part_number, 2);
        assert_eq!(part.etag, "abc123");

        assert!(parse_part_ref("abc123").is_err());
        assert!(parse_part_ref("x:abc").is_err());
        assert!(parse_part_ref("1:").is_err());
    }

    #[test]
    fn test_import_requires_source() {
        assert!(Cli::try_parse_from(["dashsync", "import"]).is_err());
        assert!(Cli::try_parse_from(["dashsync", "import", "--key", "k", "--file", "f"]).is_err());
        assert!(Cli::try_parse_from(["dashsync", "import", "--key", "sync-1"]).is_ok());
    }

    #[test]
    fn test_status_key_or_purge() {
        let cli = Cli::try_parse_from(["dashsync", "status", "purge"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Status(StatusArgs {
                command: Some(StatusCommands::Purge),
                ..
            })
        ));

        let cli = Cli::try_parse_from(["dashsync", "status", "sync-1-abc"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Status(StatusArgs { key: Some(ref k), .. }) if k == "sync-1-abc"
        ));
    }

    #[test]
    fn test_export_tables_list() {
        let cli = Cli::try_parse_from([
            "dashsync",
            "export",
            "--tables",
            "authors,content_items",
            "--sync-version",
            "7",
        ])
        .unwrap();
        let Commands::Export {
            tables,
            sync_version,
            ..
        } = cli.command
        else {
            panic!("expected export");
        };
        assert_eq!(tables, ["authors", "content_items"]);
        assert_eq!(sync_version, Some(7));
    }
}
