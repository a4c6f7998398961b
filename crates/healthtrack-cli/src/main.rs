//! healthtrack - command-line client for the healthtrack activity service.
//!
//! Logs in against the service, keeps the session in the configured
//! credential store and lists or updates workouts, meals and step counts.

mod commands;
mod entry;
mod format;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use healthtrack_core::{ApiClient, Config, SessionEvent};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::Command;

#[derive(Parser)]
#[command(name = "healthtrack", version, about = "Track workouts, meals and steps")]
struct Cli {
    /// Service base URL, overriding the config file
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Write logs to a daily rolling file in this directory instead of stderr
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

/// Initialize the tracing subscriber for logging.
///
/// `RUST_LOG` controls the level (default `warn`). The returned guard must
/// be held until exit so buffered file output is flushed.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "healthtrack.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

/// Print the session notifications raised while the command ran.
///
/// When the command failed its error already says what went wrong, so only
/// the ones asking the user to log in again are shown.
fn report_events(events: &mut broadcast::Receiver<SessionEvent>, command_failed: bool) {
    loop {
        match events.try_recv() {
            Ok(event) => {
                if command_failed && !event.requires_login() {
                    continue;
                }
                eprintln!("{}: {}", event.title(), event.description());
                if event.requires_login() && event.is_error() {
                    eprintln!("Run `healthtrack login` to sign in.");
                }
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_dir.as_deref());

    let mut config = Config::load()?;
    if let Some(url) = cli.base_url {
        config.base_url = url;
    }
    info!(base_url = %config.base_url, backend = ?config.credential_backend, "healthtrack starting");

    let client = ApiClient::from_config(&config)?;
    let mut events = client.subscribe();

    let result = commands::run(cli.command, &client, &config, cli.json).await;
    report_events(&mut events, result.is_err());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use healthtrack_core::ActivityKind;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_kind_and_globals() {
        let cli = Cli::try_parse_from(["healthtrack", "toggle", "meals", "7", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Command::Toggle { kind: ActivityKind::Meal, id: 7 }
        ));
    }

    #[test]
    fn test_parse_add_fields() {
        let cli = Cli::try_parse_from([
            "healthtrack", "add", "meal", "--food", "Oatmeal", "--calories", "350",
            "--date", "2024-05-01",
        ])
        .unwrap();

        match cli.command {
            Command::Add { kind, fields } => {
                assert_eq!(kind, ActivityKind::Meal);
                assert_eq!(fields.food.as_deref(), Some("Oatmeal"));
                assert_eq!(fields.calories, Some(350));
                assert_eq!(fields.date, chrono::NaiveDate::from_ymd_opt(2024, 5, 1));
            }
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        assert!(Cli::try_parse_from(["healthtrack", "list", "naps"]).is_err());
    }
}
