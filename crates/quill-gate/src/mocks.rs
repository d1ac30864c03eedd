//! Mock collaborators for pipeline tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;

use quill_types::{
    DecisionStatus, EnforcementReceipt, GateMode, ReceiptId, WorkflowId,
};

use crate::audit::{AuditRecord, AuditStore};
use crate::context::WorkflowContext;
use crate::error::{AuditError, StageError};
use crate::traits::{PipelineStage, ReceiptIssuer};

/// Receipt issuer that records everything it issues.
#[derive(Default)]
pub struct MockReceiptIssuer {
    issued: Mutex<Vec<EnforcementReceipt>>,
}

impl MockReceiptIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issued(&self) -> Vec<EnforcementReceipt> {
        match self.issued.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ReceiptIssuer for MockReceiptIssuer {
    fn issue(
        &self,
        workflow_id: WorkflowId,
        status: DecisionStatus,
        audit_ok: bool,
        mode: GateMode,
    ) -> EnforcementReceipt {
        let now = Utc::now();
        let receipt = EnforcementReceipt {
            receipt_id: ReceiptId::new(),
            workflow_id,
            status,
            audit_ok,
            mode,
            issued_at: now,
            expires_at: now + Duration::minutes(15),
            consumed_at: None,
        };
        match self.issued.lock() {
            Ok(mut guard) => guard.push(receipt.clone()),
            Err(poisoned) => poisoned.into_inner().push(receipt.clone()),
        }
        receipt
    }
}

/// Remote-control handle for a [`FlakyStage`].
#[derive(Clone)]
pub struct FlakyHandle {
    remaining: Arc<AtomicU32>,
}

impl FlakyHandle {
    /// Make the stage fail its next `n` runs.
    pub fn fail_next(&self, n: u32) {
        self.remaining.store(n, Ordering::SeqCst);
    }
}

/// Advisory stage that fails a configured number of runs, then succeeds.
pub struct FlakyStage {
    name: &'static str,
    remaining: Arc<AtomicU32>,
}

impl FlakyStage {
    pub fn failing(name: &'static str, failures: u32) -> Self {
        Self {
            name,
            remaining: Arc::new(AtomicU32::new(failures)),
        }
    }

    pub fn handle(&self) -> FlakyHandle {
        FlakyHandle {
            remaining: self.remaining.clone(),
        }
    }
}

#[async_trait]
impl PipelineStage for FlakyStage {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn run(&self, _ctx: &mut WorkflowContext) -> Result<String, StageError> {
        let remaining = self.remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining.store(remaining - 1, Ordering::SeqCst);
            Err(StageError::Unavailable("simulated outage".into()))
        } else {
            Ok("flaky stage completed".to_string())
        }
    }

    fn snapshot(&self, _ctx: &WorkflowContext) -> Option<Value> {
        None
    }

    fn restore(&self, _ctx: &mut WorkflowContext, _snapshot: &Value) -> bool {
        false
    }

    fn fallback(&self, _ctx: &mut WorkflowContext) -> String {
        "no artifact to substitute".to_string()
    }
}

/// Audit store whose writes always fail.
pub struct FailingAuditStore;

impl AuditStore for FailingAuditStore {
    fn append(&self, _record: AuditRecord) -> Result<(), AuditError> {
        Err(AuditError::WriteFailed("injected audit failure".into()))
    }

    fn records_for(&self, _workflow_id: &WorkflowId) -> Result<Vec<AuditRecord>, AuditError> {
        Ok(Vec::new())
    }

    fn count(&self) -> Result<usize, AuditError> {
        Ok(0)
    }
}
