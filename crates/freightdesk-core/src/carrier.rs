//! Carrier identities.
//!
//! Raw carrier names come from UI selections, config files and API payloads
//! in whatever casing the caller used. Everything that touches storage goes
//! through [`CarrierId`] so that aliases resolve to one key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw names that resolve to [`CarrierId::Xpo`].
const XPO_ALIASES: &[&str] = &["xpo", "expo"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown carrier: {0}")]
pub struct UnknownCarrier(pub String);

/// A normalized carrier identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CarrierId {
    Estes,
    Xpo,
}

impl CarrierId {
    pub const ALL: [CarrierId; 2] = [CarrierId::Estes, CarrierId::Xpo];

    /// Normalized identity sent as `shippingCompany` to the Authenticate endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            CarrierId::Estes => "estes",
            CarrierId::Xpo => "xpo",
        }
    }

    /// Human-readable label used when the API doesn't echo one back.
    pub fn display_name(&self) -> &'static str {
        match self {
            CarrierId::Estes => "Estes",
            CarrierId::Xpo => "XPO",
        }
    }

    /// Every raw name that maps to this identity, canonical name first.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            CarrierId::Estes => &["estes"],
            CarrierId::Xpo => XPO_ALIASES,
        }
    }
}

impl FromStr for CarrierId {
    type Err = UnknownCarrier;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        CarrierId::ALL
            .into_iter()
            .find(|carrier| carrier.aliases().contains(&normalized.as_str()))
            .ok_or_else(|| UnknownCarrier(raw.to_string()))
    }
}

impl fmt::Display for CarrierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
