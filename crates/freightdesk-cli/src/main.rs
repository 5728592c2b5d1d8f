//! freightdesk - operator console for carrier sessions.
//!
//! A thin wrapper over `freightdesk-core` for logging in to carriers,
//! inspecting token state and sending authorized carrier requests.

mod cli;
mod commands;

use std::io;

use anyhow::Result;
use clap::Parser;
use freightdesk_core::{CarrierSession, Config, RetryPolicy};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::Cli;

/// Initialize the tracing subscriber for logging
fn init_tracing(verbosity: u8) {
    // RUST_LOG wins over -v flags
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load()?;
    info!(api = %config.api_base_url, "freightdesk starting");

    let reporter = commands::RetryReporter::new();
    let hook = reporter.clone();
    let session = CarrierSession::from_config(&config)?.with_retry_policy(
        RetryPolicy::new()
            .max_retries(config.max_retries)
            .on_retry(move |err, attempt, retry_after| hook.report(err, attempt, retry_after)),
    );
    let result = commands::run(cli.command, &session, &config).await;
    reporter.finish();
    session.shutdown();
    result
}
