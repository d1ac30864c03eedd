use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quill_types::{ContentRequest, Decision, Draft, Platform, ReceiptId, WorkflowId};

/// Classification attached to every recorded stage failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Transient or environmental: timeouts, unavailable dependencies.
    /// Retryable by the caller.
    Infra,
    /// A deterministic policy rejection. Only the policy gate stage records
    /// this kind.
    Policy,
}

/// Outcome of a single pipeline stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum StageStatus {
    Completed,
    /// The breaker substituted a previous or fallback output.
    Degraded { warning: String },
    Failed { kind: FailureKind, error: String },
}

impl StageStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, StageStatus::Completed)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, StageStatus::Degraded { .. })
    }
}

/// One recorded stage result. Records are append-only within a workflow and
/// mirrored to the audit store as they happen.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: String,
    pub status: StageStatus,
    pub summary: String,
    pub recorded_at: DateTime<Utc>,
}

/// Strategy brief produced by the strategy stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StrategyBrief {
    pub angle: String,
    pub audience: String,
    pub tone: String,
}

/// Research notes produced by the research stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResearchNotes {
    pub talking_points: Vec<String>,
    pub citations: Vec<String>,
}

/// Publish payload prepared after the gate. `ready` is false when the
/// decision failed; the publish collaborator must still present a receipt.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublishIntent {
    pub platform: Platform,
    pub body: String,
    pub hashtags: Vec<String>,
    pub ready: bool,
}

/// Analytics registration prepared after the gate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalyticsIntent {
    pub workflow_id: WorkflowId,
    pub platform: Platform,
    pub track_events: Vec<String>,
}

/// Context threaded through all stages of one workflow.
///
/// Accumulates stage artifacts, the terminal decision and the audit flag as
/// the request flows through the pipeline.
pub struct WorkflowContext {
    pub workflow_id: WorkflowId,
    pub request: ContentRequest,
    pub strategy: Option<StrategyBrief>,
    pub research: Option<ResearchNotes>,
    pub draft: Option<Draft>,
    pub decision: Option<Decision>,
    pub publish_intent: Option<PublishIntent>,
    pub analytics_intent: Option<AnalyticsIntent>,
    /// True while every audit write for this workflow has succeeded.
    pub audit_ok: bool,
    pub records: Vec<StageRecord>,
}

impl WorkflowContext {
    pub fn new(workflow_id: WorkflowId, request: ContentRequest) -> Self {
        Self {
            workflow_id,
            request,
            strategy: None,
            research: None,
            draft: None,
            decision: None,
            publish_intent: None,
            analytics_intent: None,
            audit_ok: true,
            records: Vec::new(),
        }
    }

    /// Record a stage result. Results are never dropped or overwritten.
    pub fn record_stage(
        &mut self,
        stage: impl Into<String>,
        status: StageStatus,
        summary: impl Into<String>,
    ) {
        self.records.push(StageRecord {
            stage: stage.into(),
            status,
            summary: summary.into(),
            recorded_at: Utc::now(),
        });
    }

    pub fn completed_stages(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status.is_completed())
            .count()
    }

    pub fn degraded_warnings(&self) -> Vec<String> {
        self.records
            .iter()
            .filter_map(|r| match &r.status {
                StageStatus::Degraded { warning } => Some(warning.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn has_failure(&self) -> bool {
        self.records
            .iter()
            .any(|r| matches!(r.status, StageStatus::Failed { .. }))
    }
}

/// Terminal emission of one workflow: the full decision bundle handed back
/// to the calling collaborator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecisionBundle {
    pub workflow_id: WorkflowId,
    pub decisions: Vec<Decision>,
    pub qa_summary: String,
    pub audit_ok: bool,
    /// True only when the gate runs enforced and the decision failed.
    pub would_block: bool,
    /// Absent when enforcement withheld the receipt (unaudited PASS).
    pub receipt_id: Option<ReceiptId>,
    /// Warning flags from degraded stages.
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_types::{Platform, UserId};

    fn test_context() -> WorkflowContext {
        let request = ContentRequest::new(UserId::new("creator-1"), "spring launch", Platform::X);
        WorkflowContext::new(WorkflowId::new(), request)
    }

    #[test]
    fn new_context_is_clean() {
        let ctx = test_context();
        assert!(ctx.audit_ok);
        assert!(!ctx.has_failure());
        assert_eq!(ctx.completed_stages(), 0);
    }

    #[test]
    fn context_records_stage_results() {
        let mut ctx = test_context();
        ctx.record_stage("strategy", StageStatus::Completed, "brief ready");
        ctx.record_stage(
            "research",
            StageStatus::Failed {
                kind: FailureKind::Infra,
                error: "timeout".into(),
            },
            "research failed",
        );

        assert_eq!(ctx.records.len(), 2);
        assert_eq!(ctx.completed_stages(), 1);
        assert!(ctx.has_failure());
    }

    #[test]
    fn degraded_warnings_are_collected() {
        let mut ctx = test_context();
        ctx.record_stage(
            "writer",
            StageStatus::Degraded {
                warning: "substituted last known good output".into(),
            },
            "degraded",
        );
        assert_eq!(ctx.degraded_warnings().len(), 1);
    }
}
