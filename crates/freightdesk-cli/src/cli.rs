//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use freightdesk_core::{CarrierEndpoint, CarrierId};

/// Operator console for carrier sessions.
#[derive(Parser, Debug)]
#[command(name = "freightdesk")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in to a carrier with a username and password
    ///
    /// The password is only cached for this run. Later runs refresh expired
    /// tokens through auto-login, so pass --remember (or set
    /// FREIGHTDESK_<CARRIER>_USERNAME/PASSWORD) to stay logged in.
    Login {
        /// Carrier name (xpo, expo, estes)
        carrier: CarrierId,

        #[arg(long)]
        username: String,

        /// Remember the credentials in the OS keychain; used by auto-login
        /// unless `credential_source` is `env` or `none`
        #[arg(long)]
        remember: bool,
    },

    /// Show token state for every carrier
    Status,

    /// Print a usable bearer token, refreshing it if needed
    Token { carrier: CarrierId },

    /// POST a JSON payload to a carrier endpoint
    Send {
        carrier: CarrierId,

        #[arg(value_enum)]
        endpoint: Endpoint,

        /// JSON payload file; reads stdin when omitted
        #[arg(long)]
        body: Option<PathBuf>,
    },

    /// Download a bill of lading PDF
    Pdf {
        carrier: CarrierId,

        /// JSON payload file identifying the bill of lading
        #[arg(long)]
        body: PathBuf,

        /// Where to write the PDF
        #[arg(long, short)]
        out: PathBuf,
    },

    /// Clear tokens and cached credentials
    Logout {
        /// Only this carrier; all carriers when omitted
        carrier: Option<CarrierId>,

        /// Also delete credentials remembered in the OS keychain
        #[arg(long)]
        forget: bool,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum Endpoint {
    RateQuote,
    BillOfLading,
    PickupRequest,
}

impl From<Endpoint> for CarrierEndpoint {
    fn from(endpoint: Endpoint) -> Self {
        match endpoint {
            Endpoint::RateQuote => CarrierEndpoint::RateQuote,
            Endpoint::BillOfLading => CarrierEndpoint::BillOfLading,
            Endpoint::PickupRequest => CarrierEndpoint::PickupRequest,
        }
    }
}
