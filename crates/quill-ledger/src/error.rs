use thiserror::Error;

use quill_types::{LedgerEventType, ReceiptId, UserId, WorkflowId};

/// Errors from the enforcement receipt service.
///
/// Every variant is a distinct denial code on the dependent action — a
/// receipt problem never surfaces as a generic failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReceiptError {
    #[error("no receipt found for request {0}")]
    NotFound(WorkflowId),

    #[error("receipt for request {0} has expired")]
    Expired(WorkflowId),

    #[error("receipt for request {0} was already consumed")]
    AlreadyConsumed(WorkflowId),

    #[error("a receipt is required before this action")]
    Required,
}

impl ReceiptError {
    pub fn code(&self) -> &'static str {
        match self {
            ReceiptError::NotFound(_) => "RECEIPT_NOT_FOUND",
            ReceiptError::Expired(_) => "RECEIPT_EXPIRED",
            ReceiptError::AlreadyConsumed(_) => "RECEIPT_ALREADY_CONSUMED",
            ReceiptError::Required => "RECEIPT_REQUIRED",
        }
    }
}

/// Errors from the cached balance primitive.
#[derive(Error, Debug)]
pub enum BalanceError {
    #[error("balance store unavailable: {0}")]
    Unavailable(String),

    #[error("balance store lock poisoned")]
    Lock,
}

/// Errors from the token ledger engine.
///
/// An attempted mutation of an existing row or an arithmetic mismatch is
/// rejected outright, never coerced.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger integrity violation for {user}: {detail}")]
    IntegrityViolation { user: UserId, detail: String },

    #[error("invalid amount {amount} for {event_type} entry")]
    InvalidAmount {
        event_type: LedgerEventType,
        amount: i64,
    },

    #[error("cached balance error: {0}")]
    Balance(#[from] BalanceError),

    #[error("ledger storage error: {0}")]
    Storage(String),

    #[error("guardrail state lock poisoned")]
    Lock,
}

/// Denials and failures on the token issuance path.
///
/// Eligibility denials each carry a specific reason code; callers surface
/// `code()` on the dependent action.
#[derive(Error, Debug)]
pub enum IssuanceError {
    #[error("receipt error: {0}")]
    Receipt(ReceiptError),

    #[error("receipt {presented} does not match the receipt issued for request {request}")]
    ReceiptMismatch {
        request: WorkflowId,
        presented: ReceiptId,
    },

    #[error("decision for request {0} did not pass the policy gate")]
    DecisionNotPass(WorkflowId),

    #[error("audit trail incomplete for request {0}")]
    AuditIncomplete(WorkflowId),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl IssuanceError {
    pub fn code(&self) -> &'static str {
        match self {
            IssuanceError::Receipt(err) => err.code(),
            IssuanceError::ReceiptMismatch { .. } => "RECEIPT_MISMATCH",
            IssuanceError::DecisionNotPass(_) => "DECISION_NOT_PASS",
            IssuanceError::AuditIncomplete(_) => "AUDIT_INCOMPLETE",
            IssuanceError::Ledger(_) => "LEDGER_ERROR",
        }
    }
}

impl From<ReceiptError> for IssuanceError {
    fn from(err: ReceiptError) -> Self {
        IssuanceError::Receipt(err)
    }
}
