use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod config;
mod prompt;

use cli::{Args, Command};
use config::Config;
use pgcluster_converge::error::UserDeclinedConfirmation;

/// Initialize tracing with two outputs:
/// 1. Console output (stderr) - progress for the operator
/// 2. File output (~/.pgcluster/pgcluster.log) - every run, appended
///
/// The returned guard flushes the file writer when dropped; keep it alive
/// until main returns.
fn initialize_tracing() -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,pgcluster=debug".into());

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let log_dir = PathBuf::from(home).join(".pgcluster");
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        // Console logging still works without the file
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();
        tracing::warn!("Log file disabled, cannot create {}: {}", log_dir.display(), e);
        return Ok(None);
    }

    let file_appender = tracing_appender::rolling::never(&log_dir, "pgcluster.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(Some(guard))
}

/// The operator said no before anything changed
fn is_declined(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause.is::<UserDeclinedConfirmation>()
            || cause
                .downcast_ref::<pgcluster_converge::Error>()
                .is_some_and(pgcluster_converge::Error::is_declined)
    })
}

/// dump and restore ask before touching anything, so a "no" there is a
/// clean exit. setup may already have changed servers when it asks.
fn declines_cleanly(command: &Command) -> bool {
    matches!(command, Command::Dump { .. } | Command::Restore { .. })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Parse command line arguments
    let args = Args::parse();

    let _guard = initialize_tracing()?;
    let config = Config::from_args(&args);

    let clean_decline = declines_cleanly(&args.command);

    // Route to appropriate handler
    let result = match args.command {
        Command::Setup { settle_seconds, on_config_change } => {
            commands::setup::run_setup(&config, settle_seconds, on_config_change.into()).await
        }
        Command::Plan { output } => commands::setup::run_plan(&config, &output).await,
        Command::Status { domain, output } => {
            commands::status::run_status(&config, domain.as_deref(), &output).await
        }
        Command::Dump { file, database } => commands::database::run_dump(&config, &file, &database).await,
        Command::Restore { file, database } => {
            commands::database::run_restore(&config, &file, &database).await
        }
        Command::Interactive { domain, port, print } => {
            commands::interactive::run_interactive(&config, domain.as_deref(), port, print)
        }
        Command::ListRoles => commands::status::run_list_roles(&config).await,
        Command::ListDatabases => commands::status::run_list_databases(&config).await,
        Command::StreamingStatus => commands::status::run_streaming_status(&config).await,
        Command::Check => commands::init::run_check(&config),
        Command::Init { in_place } => commands::init::run_init(&config, in_place),
    };

    match result {
        Err(err) if clean_decline && is_declined(&err) => {
            tracing::warn!("{}; nothing was changed", UserDeclinedConfirmation);
            Ok(())
        }
        Err(err) => {
            tracing::error!("{:#}", err);
            Err(err)
        }
        Ok(()) => Ok(()),
    }
}
