use anyhow::Result;
use freightdesk_core::{CarrierId, CarrierSession, Config, TokenState};

use super::explain;

pub fn run(session: &CarrierSession, config: &Config) -> Result<()> {
    let orchestrator = session.orchestrator();
    println!("API: {}", config.api_base_url);

    for carrier in CarrierId::ALL {
        let state = orchestrator.state(carrier);
        let detail = match orchestrator.tokens().record(carrier) {
            Some(record) if state == TokenState::Valid => format!(
                "{} (stale in {}m)",
                record.label,
                record.minutes_until_stale(orchestrator.max_token_age_minutes())
            ),
            Some(record) => format!("{} (issued {})", record.label, record.issued_at.format("%Y-%m-%d %H:%M UTC")),
            None => "-".to_string(),
        };
        println!("{:<6} {:<16} {}", carrier.as_str(), format!("{:?}", state), detail);
    }
    Ok(())
}

pub async fn token(session: &CarrierSession, carrier: CarrierId) -> Result<()> {
    let token = session
        .orchestrator()
        .ensure_token(carrier)
        .await
        .map_err(|failure| explain(failure.into()))?;
    println!("{}", token);
    Ok(())
}
