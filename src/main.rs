//! dashsync CLI entry point.

use clap::Parser;
use dashsync::cli::commands;
use dashsync::cli::{Cli, Commands};
use dashsync::config::load_settings;
use dashsync::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    // Resolve effective JSON mode: --json OR non-TTY stdout
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    // Run the command and handle errors
    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    let db = cli.db.as_ref();
    let blob_dir = cli.blob_dir.as_ref();
    let status_dir = cli.status_dir.as_ref();

    match &cli.command {
        Commands::Init { force } => commands::init::execute(db, blob_dir, status_dir, *force, json),
        Commands::Version => commands::version::execute(json),
        Commands::Completions { shell } => commands::completions::execute(shell),

        // Source side
        Commands::Export {
            tables,
            sync_version,
            out,
        } => commands::export::execute(db, tables, *sync_version, out.as_ref(), json),
        Commands::Upload {
            file,
            key,
            chunk_size,
        } => {
            let settings = load_settings()?;
            commands::upload::execute(file, key.as_deref(), *chunk_size, blob_dir, status_dir, &settings, json)
        }
        Commands::Transport { command } => {
            let settings = load_settings()?;
            commands::transport::execute(command, blob_dir, status_dir, &settings, json)
        }

        // Target side
        Commands::Import(args) => {
            let settings = load_settings()?;
            commands::import::execute(args, db, blob_dir, status_dir, &settings, json)
        }
        Commands::Status(args) => {
            let settings = load_settings()?;
            commands::status::execute(args, status_dir, &settings, json)
        }
        Commands::Ledger { sync_version } => commands::ledger::execute(db, *sync_version, json),
    }
}
