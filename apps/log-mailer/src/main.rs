//! log-mailer
//!
//! Mails log records through the log_mailer sink. Records come from the
//! command line (`send`) or from stdin, one per line (`pipe`). With
//! `--forward-errors` the binary's own error events are mailed as well.

use clap::{Parser, Subcommand};
use eyre::{eyre, Result};
use log_mailer::{Delivery, MailLayer, MailSink, Record, SinkEvent};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

mod config;
mod telemetry;

use config::Config;
use telemetry::{init_tracing, install_color_eyre};

#[derive(Parser)]
#[command(name = "log-mailer")]
#[command(about = "Forward log records as email")]
struct Cli {
    /// Also mail this program's own error events
    #[arg(long, global = true)]
    forward_errors: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mail a single record and print the delivery info
    Send {
        /// Severity label
        #[arg(short, long, default_value = "error")]
        level: String,

        /// Message text
        #[arg(short, long)]
        message: String,

        /// Extra metadata as key=value; values that parse as JSON keep their type
        #[arg(short, long = "field", value_parser = parse_field)]
        fields: Vec<(String, Value)>,
    },

    /// Mail every line read from stdin
    Pipe {
        /// Severity label for all lines
        #[arg(short, long, default_value = "error")]
        level: String,
    },
}

fn parse_field(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    if key.trim().is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.trim().to_string(), value))
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let sink = MailSink::new(config.mailer_options())?;

    let mail_layer = cli.forward_errors.then(|| MailLayer::new(sink.clone()));
    init_tracing(&config.environment, mail_layer);

    info!(
        to = %config.to,
        backend = ?config.backend,
        "Log mailer ready"
    );

    let reporter = tokio::spawn(report_events(sink.subscribe()));

    let result = match cli.command {
        Commands::Send {
            level,
            message,
            fields,
        } => send(&sink, level, message, fields).await,
        Commands::Pipe { level } => pipe(&sink, level).await,
    };

    // Mails raised by --forward-errors may still be in flight
    sink.flush().await;
    reporter.abort();

    result
}

async fn send(
    sink: &MailSink,
    level: String,
    message: String,
    fields: Vec<(String, Value)>,
) -> Result<()> {
    let record = fields
        .into_iter()
        .fold(Record::new(level, message), |record, (key, value)| {
            record.with_field(key, value)
        });

    match sink.deliver(record).await {
        Delivery::Logged(info) => {
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
        Delivery::Failed(err) => Err(eyre!(err).wrap_err("Mail delivery failed")),
        Delivery::Filtered => {
            println!("record filtered, nothing sent");
            Ok(())
        }
    }
}

async fn pipe(sink: &MailSink, level: String) -> Result<()> {
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut dispatched = 0usize;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let done_tx = done_tx.clone();
        let record = Record::new(level.as_str(), line.as_str()).with_display_text(line);
        sink.log(record, move || {
            let _ = done_tx.send(());
        });
        dispatched += 1;
    }
    drop(done_tx);

    let mut completed = 0usize;
    while done_rx.recv().await.is_some() {
        completed += 1;
    }

    info!(dispatched, completed, "Finished mailing stdin");
    Ok(())
}

/// Log the outcome of every dispatch.
///
/// Failures are reported at `warn` so `--forward-errors` never mails them.
async fn report_events(mut events: mpsc::UnboundedReceiver<SinkEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SinkEvent::Logged(info) => {
                info!(message_id = %info.message_id, to = ?info.envelope.to, "Mail delivered");
            }
            SinkEvent::Error(err) => {
                warn!(error = %err, "Mail delivery failed");
            }
        }
    }
}
