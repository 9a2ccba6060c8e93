//! fieldsafe - submit safety alerts and reports from field devices
//!
//! Events go straight to the configured endpoint when it is reachable and
//! are queued locally otherwise. Queued events are replayed by `sync`, at the
//! start of every command that submits, and continuously by `watch`.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Queue database: $XDG_DATA_HOME/fieldsafe/queue.db (~/.local/share/fieldsafe/queue.db)
//! - Logs: $XDG_STATE_HOME/fieldsafe/fieldsafe.log (~/.local/state/fieldsafe/fieldsafe.log)
//! - Config: $XDG_CONFIG_HOME/fieldsafe/config.toml (~/.config/fieldsafe/config.toml)

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fieldsafe_core::{Config, EventKind};

#[derive(Parser)]
#[command(name = "fieldsafe")]
#[command(about = "Submit safety alerts and reports, queueing them while offline")]
#[command(version)]
struct Args {
    /// Mirror logs to stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show configuration and pending queue sizes
    Status,

    /// Send a silent panic alert
    Sos {
        /// Latitude of the current position
        #[arg(long, requires = "lon", allow_negative_numbers = true)]
        lat: Option<f64>,

        /// Longitude of the current position
        #[arg(long, requires = "lat", allow_negative_numbers = true)]
        lon: Option<f64>,

        /// Queue without trying the network
        #[arg(long)]
        offline: bool,
    },

    /// Submit an anonymous incident report
    Report {
        /// Report text
        text: String,

        /// Queue without trying the network
        #[arg(long)]
        offline: bool,
    },

    /// Replay queued events if the endpoint is reachable
    Sync,

    /// List queued events as JSON lines
    Queue {
        /// Only this queue (sos or report)
        #[arg(long, value_parser = parse_kind)]
        kind: Option<EventKind>,
    },

    /// Discard every event in one queue
    Purge {
        /// Queue to discard (sos or report)
        #[arg(long, value_parser = parse_kind)]
        kind: EventKind,

        /// Confirm the purge
        #[arg(long)]
        yes: bool,
    },

    /// Probe connectivity and sync on every reconnection until Ctrl+C
    Watch {
        /// Probe interval in milliseconds (default: from config)
        #[arg(long)]
        poll: Option<u64>,
    },
}

fn parse_kind(s: &str) -> std::result::Result<EventKind, String> {
    EventKind::parse(s).ok_or_else(|| format!("unknown queue {:?} (expected sos or report)", s))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard = fieldsafe_core::logging::init(&config.logging, args.verbose)
        .context("failed to initialize logging")?;

    // Single-threaded: storage calls are synchronous, network calls interleave
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create async runtime")?;

    runtime.block_on(async move {
        match args.command {
            Command::Status => commands::status(&config).await,
            Command::Sos { lat, lon, offline } => commands::sos(&config, lat.zip(lon), offline).await,
            Command::Report { text, offline } => commands::report(&config, &text, offline).await,
            Command::Sync => commands::sync(&config).await,
            Command::Queue { kind } => commands::queue(kind),
            Command::Purge { kind, yes } => commands::purge(kind, yes),
            Command::Watch { poll } => commands::watch(&config, poll).await,
        }
    })
}
