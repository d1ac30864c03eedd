use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decision::DecisionStatus;
use crate::ids::{ReceiptId, WorkflowId};
use crate::mode::GateMode;

/// A time-limited, single-use token proving a workflow's gate outcome.
///
/// Issued once per workflow after the terminal decision; required to publish
/// or to issue tokens when enforcement is active. Consumed at most once —
/// the consuming transition is atomic in the receipt service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcementReceipt {
    pub receipt_id: ReceiptId,
    pub workflow_id: WorkflowId,
    pub status: DecisionStatus,
    /// Whether every audit write for the workflow succeeded. Token issuance
    /// requires this to be true.
    pub audit_ok: bool,
    pub mode: GateMode,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl EnforcementReceipt {
    pub fn is_expired(&self, at: DateTime<Utc>) -> bool {
        at >= self.expires_at
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }

    /// A receipt that can authorize token issuance: unexpired, unconsumed,
    /// PASS outcome with a complete audit trail.
    pub fn authorizes_issuance(&self, at: DateTime<Utc>) -> bool {
        !self.is_expired(at)
            && !self.is_consumed()
            && self.status == DecisionStatus::Pass
            && self.audit_ok
    }
}
