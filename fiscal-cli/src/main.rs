//! # fiscalctl
//!
//! Runs one command against a configured fiscal printer and prints every
//! event it produces.
//!
//! ## Usage
//!
//! ```bash
//! # Query the printer status
//! fiscalctl status
//!
//! # Daily Z close with an explicit configuration file
//! fiscalctl --config ./printer.json daily-close --kind Z
//!
//! # Print a non-fiscal document
//! fiscalctl print-text "Table 4" "2 coffees"
//! ```
//!
//! The configuration is a JSON `PrinterConfig`; by default it is read from
//! `<config dir>/fiscal/printer.json`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDateTime};
use clap::{Parser, Subcommand};
use fiscal_engine::{FiscalEvent, FiscalPrinter, PrinterConfig};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// fiscalctl - drive Epson and Hasar fiscal printers
#[derive(Parser, Debug)]
#[command(name = "fiscalctl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Printer configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Seconds to wait for each event before giving up
    #[arg(long, default_value = "30")]
    wait: u64,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Request the printer status
    Status,

    /// Daily close report
    DailyClose {
        /// Report type: Z closes the fiscal day, X only reports it
        #[arg(long, default_value = "Z")]
        kind: char,
    },

    /// Open the cash drawer
    OpenDrawer,

    /// Set the printer clock (defaults to the local time)
    SetDateTime {
        /// Date and time as YYYY-MM-DDTHH:MM:SS
        at: Option<NaiveDateTime>,
    },

    /// Print lines on a non-fiscal document
    PrintText {
        /// Lines to print
        #[arg(required = true)]
        lines: Vec<String>,
    },
}

impl Commands {
    /// Queue the command; returns true when a status event ends it
    fn submit(&self, printer: &FiscalPrinter) -> bool {
        match self {
            Commands::Status => {
                printer.status_request();
                true
            }
            Commands::DailyClose { kind } => {
                printer.daily_close(*kind);
                false
            }
            Commands::OpenDrawer => {
                printer.open_drawer();
                false
            }
            Commands::SetDateTime { at } => {
                let at = at.unwrap_or_else(|| Local::now().naive_local());
                printer.set_date_time(at);
                false
            }
            Commands::PrintText { lines } => {
                printer.open_non_fiscal_receipt();
                for line in lines {
                    printer.print_non_fiscal_text(line);
                }
                printer.close_non_fiscal_receipt();
                false
            }
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("fiscal").join("printer.json"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "fiscalctl=info,fiscal_protocol=info,fiscal_engine=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let Some(path) = cli.config.clone().or_else(default_config_path) else {
        bail!("no configuration directory; pass --config");
    };
    let config = PrinterConfig::load(&path)
        .with_context(|| format!("loading {}", path.display()))?;
    tracing::info!("Using {} on {}", config.model, config.port);

    let mut printer = FiscalPrinter::open(&config).context("opening printer")?;
    let mut events = printer
        .take_events()
        .context("event channel already taken")?;

    // The status request goes last so its reply marks the end of the run
    let ends_itself = cli.command.submit(&printer);
    if !ends_itself {
        printer.status_request();
    }

    let failed = report(&mut events, Duration::from_secs(cli.wait), cli.json).await?;
    printer.finish().await;

    if failed {
        bail!("printer reported a failure");
    }
    Ok(())
}

/// Print events until a status event arrives; returns true if it was a failure
async fn report(
    events: &mut mpsc::Receiver<FiscalEvent>,
    wait: Duration,
    json: bool,
) -> Result<bool> {
    loop {
        let event = match tokio::time::timeout(wait, events.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => bail!("engine stopped"),
            Err(_) => bail!("no event within {}s", wait.as_secs()),
        };

        if json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            println!("{}", describe(&event));
        }
        if let FiscalEvent::Status { cause, .. } = &event {
            return Ok(cause.is_some());
        }
    }
}

fn describe(event: &FiscalEvent) -> String {
    match event {
        FiscalEvent::ReceiptNumber { id, number, kind } => {
            let doc = if *kind == 1 { "credit note" } else { "document" };
            format!("{} {} closed as number {}", doc, id, number)
        }
        FiscalEvent::Status { state, cause: None } => format!("status: {:?}", state),
        FiscalEvent::Status {
            state,
            cause: Some(cause),
        } => format!("status: {:?} ({})", state, cause),
        FiscalEvent::Data { kind, payload } => {
            format!("{:?}: {}", kind, String::from_utf8_lossy(payload))
        }
    }
}
