//! fmpdump: dump tables, columns, and row values from a FileMaker file.
//!
//! Usage:
//!   fmpdump Contacts.fmp12
//!   fmpdump --table People Contacts.fmp12
//!
//! Values are written to stdout as tab-separated
//! `table, row, column, value` lines; diagnostics go to stderr via the
//! logger (set `RUST_LOG=debug` for per-phase progress).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{debug, info};

use fmp_reader::{FmpFile, HandlerStatus};

#[derive(Parser, Debug)]
#[command(name = "fmpdump")]
#[command(about = "Dump tables and values from FileMaker fp3/fp5/fp7/fmp12 files")]
#[command(version)]
struct Args {
    /// FileMaker database file to read
    input: PathBuf,

    /// Only dump the named table
    #[arg(long)]
    table: Option<String>,

    /// Disable the decoded-block cache (accepted for compatibility)
    #[arg(long)]
    no_cache: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    if args.no_cache {
        debug!("--no-cache has no effect at this layer");
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("fmpdump: {}", message);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), String> {
    let mut file = FmpFile::open(&args.input).map_err(|e| e.to_string())?;
    info!(
        "{}: version {}, {} blocks",
        args.input.display(),
        file.version().number(),
        file.num_blocks()
    );

    let metadata = file.discover_all_metadata().map_err(|e| e.to_string())?;
    for table in &metadata.tables {
        info!("table {} ({}): {} columns", table.index, table.name, table.columns.len());
    }

    match &args.table {
        Some(name) => {
            let table = metadata
                .tables
                .iter()
                .find(|t| t.name == *name)
                .ok_or_else(|| format!("no table named {:?}", name))?;
            file.read_values(table, |row, column, value| {
                println!("{}\t{}\t{}\t{}", table.name, row, column.name, value);
                HandlerStatus::Continue
            })
            .map_err(|e| e.to_string())
        }
        None => file
            .read_all_values(&metadata, |table_index, row, column, value| {
                let table_name = metadata
                    .table_by_index(table_index)
                    .map(|t| t.name.as_str())
                    .unwrap_or("?");
                println!("{}\t{}\t{}\t{}", table_name, row, column.name, value);
                HandlerStatus::Continue
            })
            .map_err(|e| e.to_string()),
    }
}
