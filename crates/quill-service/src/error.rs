use thiserror::Error;

use quill_gate::GateError;
use quill_ledger::{IssuanceError, LedgerError};

/// Errors surfaced by the service facade.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The operation exceeded its time budget. Retryable; the issuance
    /// path's idempotency key makes the retry safe against double
    /// issuance.
    #[error("operation {op} timed out after {timeout_ms}ms")]
    InfraTimeout { op: &'static str, timeout_ms: u64 },

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Issuance(#[from] IssuanceError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ServiceError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::InfraTimeout { .. } => true,
            ServiceError::Gate(err) => err.is_retryable(),
            ServiceError::Issuance(_) => false,
            ServiceError::Ledger(_) => false,
        }
    }

    /// Denial code for the dependent action, when one applies.
    pub fn denial_code(&self) -> Option<&'static str> {
        match self {
            ServiceError::Issuance(err) => Some(err.code()),
            _ => None,
        }
    }
}
