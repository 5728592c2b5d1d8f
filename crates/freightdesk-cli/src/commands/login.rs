use anyhow::{Context, Result};
use freightdesk_core::auth::{CredentialStore, Credentials};
use freightdesk_core::{CarrierId, CarrierSession};
use tracing::warn;

pub async fn run(session: &CarrierSession, carrier: CarrierId, username: &str, remember: bool) -> Result<()> {
    let password = rpassword::prompt_password(format!("{} password for {}: ", carrier.display_name(), username))
        .context("Failed to read password")?;
    if password.is_empty() {
        anyhow::bail!("Password required");
    }

    eprintln!("Authenticating...");
    session
        .orchestrator()
        .login(carrier, username, &password)
        .await
        .with_context(|| format!("Login to {} failed", carrier.display_name()))?;

    if remember {
        if let Err(e) = CredentialStore::store(carrier, &Credentials::new(username, password)) {
            warn!(error = %e, "Failed to store credentials");
        }
    }

    eprintln!("Logged in to {}", carrier.display_name());
    Ok(())
}
