use async_trait::async_trait;
use serde_json::Value;

use quill_types::{DecisionStatus, EnforcementReceipt, GateMode, WorkflowId};

use crate::context::WorkflowContext;
use crate::error::StageError;

/// One non-gating pipeline stage.
///
/// Stages read and write artifacts on the [`WorkflowContext`]; a successful
/// run returns a short human-readable summary for the stage record. Stages
/// cannot block a workflow — the policy evaluator is the only component
/// that can produce a failing decision.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &mut WorkflowContext) -> Result<String, StageError>;

    /// Serialize this stage's artifact so the breaker can replay it later.
    /// Returns `None` when the stage has nothing snapshot-worthy.
    fn snapshot(&self, ctx: &WorkflowContext) -> Option<Value>;

    /// Re-apply a previously captured snapshot onto the context. Returns
    /// false when the snapshot no longer deserializes.
    fn restore(&self, ctx: &mut WorkflowContext, snapshot: &Value) -> bool;

    /// Produce a degraded-but-valid artifact with no history to replay.
    /// Returns the warning attached to the stage record.
    fn fallback(&self, ctx: &mut WorkflowContext) -> String;
}

/// Seam to the enforcement receipt service.
///
/// The pipeline issues exactly one receipt per completed workflow, binding
/// the workflow id to its terminal decision and audit flag. Implemented by
/// the receipt service in the ledger crate; mockable for tests.
pub trait ReceiptIssuer: Send + Sync {
    fn issue(
        &self,
        workflow_id: WorkflowId,
        status: DecisionStatus,
        audit_ok: bool,
        mode: GateMode,
    ) -> EnforcementReceipt;
}
