use thiserror::Error;

/// Errors from the workflow pipeline.
#[derive(Error, Debug)]
pub enum GateError {
    #[error("stage {stage} failed: {reason}")]
    StageFailed { stage: String, reason: String },

    #[error("stage {stage} timed out after {timeout_ms}ms")]
    StageTimeout { stage: String, timeout_ms: u64 },

    #[error("pipeline state lock poisoned")]
    Lock,

    #[error("audit error: {0}")]
    Audit(#[from] AuditError),
}

impl GateError {
    /// Infra-class failures are retryable by the caller; nothing in this
    /// error type is a policy outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GateError::StageFailed { .. } | GateError::StageTimeout { .. }
        )
    }
}

/// Errors raised by individual pipeline stages. All are infra-class;
/// a stage has no way to express a policy denial.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("stage dependency unavailable: {0}")]
    Unavailable(String),

    #[error("missing upstream artifact: {0}")]
    MissingInput(String),
}

/// Errors from the append-only audit store.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("audit write failed: {0}")]
    WriteFailed(String),

    #[error("audit store lock poisoned")]
    Lock,
}
