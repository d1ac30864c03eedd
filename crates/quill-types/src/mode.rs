use serde::{Deserialize, Serialize};

/// How the gate's decision binds downstream actions.
///
/// Advisory reports the decision without blocking anything; Enforced blocks
/// publish and token issuance on anything short of an audited PASS.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateMode {
    Advisory,
    Enforced,
}

impl GateMode {
    pub fn is_enforced(&self) -> bool {
        matches!(self, GateMode::Enforced)
    }
}

/// Token ledger operating mode.
///
/// Off is a no-op, Shadow records intended effects without touching real
/// balances, Live appends entries and maintains the cached balance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerMode {
    Off,
    Shadow,
    Live,
}

impl LedgerMode {
    pub fn is_live(&self) -> bool {
        matches!(self, LedgerMode::Live)
    }
}

impl std::fmt::Display for GateMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateMode::Advisory => write!(f, "advisory"),
            GateMode::Enforced => write!(f, "enforced"),
        }
    }
}

impl std::fmt::Display for LedgerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerMode::Off => write!(f, "off"),
            LedgerMode::Shadow => write!(f, "shadow"),
            LedgerMode::Live => write!(f, "live"),
        }
    }
}
