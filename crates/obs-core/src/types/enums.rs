//! Enumerations used throughout the rate observer.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Trade side of a P2P advertisement query
// ---------------------------------------------------------------------------

/// Side of a quote query, as the upstream API spells it (`"BUY"` / `"SELL"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeType {
    Buy,
    Sell,
}

impl TradeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for TradeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TradeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            other => Err(format!("unknown trade type: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot tables
// ---------------------------------------------------------------------------

/// The three flat tables of one bulk snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Currencies,
    Exchangers,
    Rates,
}

impl std::fmt::Display for TableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Currencies => write!(f, "currencies"),
            Self::Exchangers => write!(f, "exchangers"),
            Self::Rates => write!(f, "rates"),
        }
    }
}
