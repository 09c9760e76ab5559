use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use counterscope::error::Error;
use counterscope::report::{
    SortKey, diff_traces, format_rows, format_table, load_trace, summarize,
};

#[derive(Parser)]
#[command(
    name = "counterscope",
    about = "Inspect per-call hardware counter traces",
    version,
    after_help = "Traces are written by programs instrumented with counterscope-runtime \
                  (-trace-events=<list> -output-file=<path>)."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a trace per function.
    Report {
        /// Trace file (CSV).
        trace: PathBuf,

        /// Sort by this column, descending: `wall` or an event name.
        #[arg(long, value_name = "COLUMN")]
        sort: Option<String>,

        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List every invocation in completion order.
    Rows {
        /// Trace file (CSV).
        trace: PathBuf,
    },
    /// Compare two traces function by function.
    Diff {
        /// Baseline trace.
        a: PathBuf,
        /// Trace to compare against the baseline.
        b: PathBuf,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    match cli.command {
        Commands::Report { trace, sort, json } => cmd_report(trace, sort, json),
        Commands::Rows { trace } => cmd_rows(trace),
        Commands::Diff { a, b } => cmd_diff(a, b),
    }
}

fn cmd_report(path: PathBuf, sort: Option<String>, json: bool) -> Result<(), Error> {
    let trace = load_trace(&path)?;
    log::debug!("loaded {} rows from {}", trace.rows.len(), path.display());
    let key = SortKey::resolve(&trace, sort.as_deref())?;
    let report = summarize(&trace, key);
    if json {
        let mut text = serde_json::to_string_pretty(&report)?;
        text.push('\n');
        emit(&text)
    } else {
        emit(&format_table(&report))
    }
}

fn cmd_rows(path: PathBuf) -> Result<(), Error> {
    let trace = load_trace(&path)?;
    emit(&format_rows(&trace))
}

fn cmd_diff(a: PathBuf, b: PathBuf) -> Result<(), Error> {
    let before = load_trace(&a)?;
    let after = load_trace(&b)?;
    if before.events != after.events {
        log::warn!(
            "event lists differ ({} vs {}); comparing shared events only",
            before.events.join(","),
            after.events.join(",")
        );
    }
    emit(&diff_traces(&before, &after))
}

/// Write to stdout; a closed pipe becomes `Error::Io`.
fn emit(text: &str) -> Result<(), Error> {
    let mut out = io::stdout().lock();
    out.write_all(text.as_bytes())?;
    out.flush()?;
    Ok(())
}
