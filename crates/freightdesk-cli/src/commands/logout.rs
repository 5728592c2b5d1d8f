use anyhow::Result;
use freightdesk_core::auth::CredentialStore;
use freightdesk_core::{CarrierId, CarrierSession};
use tracing::debug;

pub fn run(session: &CarrierSession, carrier: Option<CarrierId>, forget: bool) -> Result<()> {
    let orchestrator = session.orchestrator();
    let carriers = match carrier {
        Some(carrier) => {
            orchestrator.logout(carrier);
            vec![carrier]
        }
        None => {
            orchestrator.logout_all();
            CarrierId::ALL.to_vec()
        }
    };

    if forget {
        for carrier in carriers {
            // Nothing stored is not an error here
            if let Err(e) = CredentialStore::delete(carrier) {
                debug!(%carrier, error = %e, "No keychain entry removed");
            }
        }
    }

    eprintln!("Logged out");
    Ok(())
}
