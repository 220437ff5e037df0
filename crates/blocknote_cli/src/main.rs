//! Command-line access to a BlockNote data directory.
//!
//! # Responsibility
//! - List notes and run JSON export/import without the mobile shell.
//! - Resolve config the same way the app does: file, then env, then defaults.

use blocknote_core::{
    core_version, init_logging, ping, CoreConfig, ExportOptions, FsImageStore, NoteId,
    NoteService, SqliteNoteRepository, SystemClock, TransferService,
};
use clap::{Parser, Subcommand};
use log::info;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

type CliResult<T> = Result<T, Box<dyn Error>>;

/// BlockNote command-line tools
#[derive(Parser)]
#[clap(version, about = "Inspect, export and import BlockNote notes")]
struct Cli {
    /// JSON config file; `BLOCKNOTE_*` environment variables apply otherwise
    #[clap(short = 'c', long, value_parser)]
    config: Option<PathBuf>,

    /// Data directory holding the database, images and logs
    #[clap(long, value_parser)]
    data_dir: Option<PathBuf>,

    /// Write debug logs to the data directory's log folder
    #[clap(short, long)]
    verbose: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print core version and resolved paths
    Info,

    /// List notes, newest first
    List,

    /// Export notes as JSON
    Export {
        /// Note ids to export; all notes when omitted
        #[clap(long, value_delimiter = ',')]
        ids: Vec<NoteId>,

        /// Embed image files as base64
        #[clap(long)]
        include_images: bool,

        /// Include drawing overlay data
        #[clap(long)]
        include_drawings: bool,

        /// Output file; stdout when omitted
        #[clap(short, long, value_parser)]
        out: Option<PathBuf>,
    },

    /// Import notes from a JSON export file
    Import {
        #[clap(value_parser)]
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<()> {
    let config = resolve_config(&cli)?;
    if cli.verbose {
        let log_dir = config.log_dir();
        init_logging("debug", &log_dir.to_string_lossy())?;
    }

    match cli.command {
        Commands::Info => {
            println!("blocknote_core ping={}", ping());
            println!("blocknote_core version={}", core_version());
            println!("database={}", config.db_path().display());
            println!("images={}", config.image_dir().display());
        }
        Commands::List => list_notes(&config)?,
        Commands::Export {
            ids,
            include_images,
            include_drawings,
            out,
        } => export_notes(
            &config,
            &ids,
            ExportOptions {
                include_images,
                include_drawings,
            },
            out,
        )?,
        Commands::Import { file } => import_notes(&config, file)?,
    }
    Ok(())
}

fn resolve_config(cli: &Cli) -> CliResult<CoreConfig> {
    let mut config = match &cli.config {
        Some(path) => CoreConfig::from_json_file(path)?,
        None => CoreConfig::from_env()?,
    };
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    std::fs::create_dir_all(&config.data_dir)?;
    Ok(config)
}

fn list_notes(config: &CoreConfig) -> CliResult<()> {
    let repo = SqliteNoteRepository::open(config.db_path())?;
    let service = NoteService::new(repo, SystemClock).with_preview_chars(config.preview_chars);
    let notes = service.list_notes()?;
    if notes.is_empty() {
        println!("No notes.");
        return Ok(());
    }
    for note in notes {
        let title = if note.title.is_empty() {
            "(untitled)"
        } else {
            note.title.as_str()
        };
        println!("{:>6}  {}  {}", note.id, title, note.preview);
    }
    Ok(())
}

fn export_notes(
    config: &CoreConfig,
    ids: &[NoteId],
    options: ExportOptions,
    out: Option<PathBuf>,
) -> CliResult<()> {
    let service = TransferService::new(
        SqliteNoteRepository::open(config.db_path())?,
        FsImageStore::open(config.image_dir())?,
        SystemClock,
    );
    let report = service.export_notes(ids, options)?;
    for uri in &report.skipped_images {
        eprintln!("warning: skipped unreadable image {uri}");
    }
    match out {
        Some(path) => {
            std::fs::write(&path, &report.json)?;
            info!(
                "event=cli_export module=cli status=ok exported={}",
                report.exported
            );
            println!("Exported {} note(s) to {}", report.exported, path.display());
        }
        None => println!("{}", report.json),
    }
    Ok(())
}

fn import_notes(config: &CoreConfig, file: PathBuf) -> CliResult<()> {
    let json = std::fs::read_to_string(&file)?;
    let service = TransferService::new(
        SqliteNoteRepository::open(config.db_path())?,
        FsImageStore::open(config.image_dir())?,
        SystemClock,
    );
    let report = service.import_notes(&json)?;
    for entry in &report.skipped_entries {
        eprintln!("warning: skipped entry {}: {}", entry.index, entry.reason);
    }
    for name in &report.skipped_images {
        eprintln!("warning: skipped image {name}");
    }
    println!("Imported {} note(s)", report.new_ids.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn export_parses_comma_separated_ids() {
        let cli = Cli::parse_from([
            "blocknote",
            "--data-dir",
            "/tmp/bn",
            "export",
            "--ids",
            "3,5",
            "--include-images",
        ]);
        match cli.command {
            Commands::Export {
                ids,
                include_images,
                include_drawings,
                out,
            } => {
                assert_eq!(ids, vec![3, 5]);
                assert!(include_images);
                assert!(!include_drawings);
                assert!(out.is_none());
            }
            _ => panic!("expected export"),
        }
    }

    #[test]
    fn import_requires_file() {
        assert!(Cli::try_parse_from(["blocknote", "import"]).is_err());
    }
}
