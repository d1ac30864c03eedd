use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{EntryId, UserId};

/// Balance-changing event kinds.
///
/// EARN and positive ADJUSTMENT increase a balance; SPEND, PENALTY and
/// negative ADJUSTMENT decrease it. The sign lives on the entry amount; the
/// kind records intent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEventType {
    Earn,
    Spend,
    Penalty,
    Adjustment,
}

impl std::fmt::Display for LedgerEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LedgerEventType::Earn => "EARN",
            LedgerEventType::Spend => "SPEND",
            LedgerEventType::Penalty => "PENALTY",
            LedgerEventType::Adjustment => "ADJUSTMENT",
        };
        write!(f, "{}", name)
    }
}

/// One immutable row in the token ledger.
///
/// Append-only: entries are never edited or deleted after creation, and
/// `balance_after` equals the user's previous `balance_after` plus `amount`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub user_id: UserId,
    pub event_type: LedgerEventType,
    pub reason_code: String,
    pub amount: i64,
    pub balance_after: i64,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Shadow-mode twin of a ledger entry.
///
/// Records the intended effect without a `balance_after`; never touches a
/// real balance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendingEntry {
    pub id: EntryId,
    pub user_id: UserId,
    pub event_type: LedgerEventType,
    pub reason_code: String,
    pub amount: i64,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}
