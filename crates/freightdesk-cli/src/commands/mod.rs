//! Subcommand implementations.

mod login;
mod logout;
mod send;
mod status;

use anyhow::Result;
use freightdesk_core::{CarrierSession, Config, RequestError};

use crate::cli::Commands;

pub use send::RetryReporter;

pub async fn run(command: Commands, session: &CarrierSession, config: &Config) -> Result<()> {
    match command {
        Commands::Login {
            carrier,
            username,
            remember,
        } => login::run(session, carrier, &username, remember).await,
        Commands::Status => status::run(session, config),
        Commands::Token { carrier } => status::token(session, carrier).await,
        Commands::Send {
            carrier,
            endpoint,
            body,
        } => send::run(session, carrier, endpoint.into(), body.as_deref()).await,
        Commands::Pdf { carrier, body, out } => send::pdf(session, carrier, &body, &out).await,
        Commands::Logout { carrier, forget } => logout::run(session, carrier, forget),
    }
}

/// Turn a request failure into something the operator can act on
fn explain(err: RequestError) -> anyhow::Error {
    match err {
        RequestError::Login(failure) => anyhow::anyhow!(
            "{}\nRun `freightdesk login {} --username <user>` to log in manually.",
            failure,
            failure.carrier
        ),
        RequestError::Api(e) => e.into(),
    }
}
