use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use quill_types::{ContentRequest, Decision, GateMode, WorkflowId};

use crate::audit::AuditRecorder;
use crate::breaker::CircuitBreaker;
use crate::context::{DecisionBundle, FailureKind, StageStatus, WorkflowContext};
use crate::error::GateError;
use crate::policy::PolicyEvaluator;
use crate::stages::{
    AnalyticsIntentStage, PublishIntentStage, ResearchStage, StrategyStage, WriterStage,
};
use crate::traits::{PipelineStage, ReceiptIssuer};

/// Configuration for the workflow pipeline.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Whether the gate's decision binds downstream actions.
    pub mode: GateMode,
    /// Consecutive failures per stage scope before the breaker trips.
    pub breaker_threshold: u32,
    /// Upper bound on a single stage execution. Elapse is an infra failure.
    pub stage_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: GateMode::Advisory,
            breaker_threshold: 3,
            stage_timeout: Duration::from_secs(10),
        }
    }
}

/// The workflow pipeline.
///
/// Runs stages sequentially for one request: strategy → research → writer →
/// policy gate → publish-intent → analytics-intent. Workflows run
/// concurrently across requests; all pipeline state is shared-nothing or
/// behind keyed locks, so `run` takes `&self`.
///
/// Invariants:
/// - Only the policy evaluator can fail the decision; stage errors are
///   infra-class and retryable.
/// - Every stage outcome is recorded and audited; audit rows are never
///   retracted, even when a later stage errors the workflow.
/// - An unaudited PASS in enforced mode issues no receipt.
pub struct Pipeline {
    advisory: Vec<Box<dyn PipelineStage>>,
    intents: Vec<Box<dyn PipelineStage>>,
    evaluator: PolicyEvaluator,
    auditor: AuditRecorder,
    breaker: CircuitBreaker,
    receipts: Arc<dyn ReceiptIssuer>,
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a pipeline with no stages. Stages MUST be added in pipeline
    /// order.
    pub fn new(
        evaluator: PolicyEvaluator,
        auditor: AuditRecorder,
        receipts: Arc<dyn ReceiptIssuer>,
        config: PipelineConfig,
    ) -> Self {
        let breaker = CircuitBreaker::new(config.breaker_threshold);
        Self {
            advisory: Vec::new(),
            intents: Vec::new(),
            evaluator,
            auditor,
            breaker,
            receipts,
            config,
        }
    }

    /// Create a pipeline wired with the built-in stages. The research and
    /// writer stages share the evaluator's citation tags and disclosure map
    /// so compliant drafts are produced by construction.
    pub fn with_default_stages(
        evaluator: PolicyEvaluator,
        auditor: AuditRecorder,
        receipts: Arc<dyn ReceiptIssuer>,
        config: PipelineConfig,
    ) -> Self {
        let citation_tags = evaluator.config().citation_tags.clone();
        let disclosures = evaluator.config().required_disclosures.clone();
        let mut pipeline = Self::new(evaluator, auditor, receipts, config);
        pipeline.add_advisory_stage(StrategyStage::new());
        pipeline.add_advisory_stage(ResearchStage::new(citation_tags));
        pipeline.add_advisory_stage(WriterStage::new(disclosures));
        pipeline.add_intent_stage(PublishIntentStage::new());
        pipeline.add_intent_stage(AnalyticsIntentStage::new());
        pipeline
    }

    /// Add a non-gating stage that runs before the policy gate.
    pub fn add_advisory_stage(&mut self, stage: impl PipelineStage + 'static) {
        self.advisory.push(Box::new(stage));
    }

    /// Add a non-gating stage that runs after the policy gate.
    pub fn add_intent_stage(&mut self, stage: impl PipelineStage + 'static) {
        self.intents.push(Box::new(stage));
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Run one workflow end to end and assemble its decision bundle.
    ///
    /// This is THE entry point. The terminal decision comes from the policy
    /// evaluator alone; everything else can only complete, degrade or raise
    /// a retryable infra error.
    pub async fn run(&self, request: ContentRequest) -> Result<DecisionBundle, GateError> {
        let workflow_id = WorkflowId::new();
        info!(
            workflow = %workflow_id,
            user = %request.user_id,
            platform = %request.platform,
            "workflow started"
        );
        let mut ctx = WorkflowContext::new(workflow_id, request);

        for stage in &self.advisory {
            self.run_stage(stage.as_ref(), &mut ctx).await?;
        }

        let decision = self.evaluate_gate(&mut ctx);
        ctx.decision = Some(decision.clone());

        for stage in &self.intents {
            self.run_stage(stage.as_ref(), &mut ctx).await?;
        }

        // Receipt issuance. An unaudited PASS must never authorize anything
        // downstream in enforced mode, so the receipt is withheld entirely.
        let withheld = self.config.mode.is_enforced() && decision.is_pass() && !ctx.audit_ok;
        let receipt_id = if withheld {
            warn!(
                workflow = %ctx.workflow_id,
                "audit incomplete for a PASS in enforced mode; receipt withheld"
            );
            None
        } else {
            let receipt = self.receipts.issue(
                ctx.workflow_id.clone(),
                decision.status,
                ctx.audit_ok,
                self.config.mode,
            );
            Some(receipt.receipt_id)
        };

        let would_block = self.config.mode.is_enforced() && !decision.is_pass();
        let qa_summary = format!(
            "{}/{} stages completed; decision {:?}; {} violation(s); {} degraded",
            ctx.completed_stages(),
            ctx.records.len(),
            decision.status,
            decision.violation_codes.len(),
            ctx.degraded_warnings().len(),
        );

        let bundle = DecisionBundle {
            workflow_id: ctx.workflow_id.clone(),
            decisions: vec![decision],
            qa_summary,
            audit_ok: ctx.audit_ok,
            would_block,
            receipt_id,
            warnings: ctx.degraded_warnings(),
        };

        // Terminal emission. A receipt, if any, already exists at this
        // point, so a failed bundle write is logged rather than reversed.
        if let Err(err) = self.auditor.record_bundle(&bundle) {
            warn!(workflow = %bundle.workflow_id, error = %err, "terminal bundle audit failed");
        }

        info!(
            workflow = %bundle.workflow_id,
            would_block = bundle.would_block,
            audit_ok = bundle.audit_ok,
            "workflow finished"
        );
        Ok(bundle)
    }

    /// The policy gate. Completed on PASS; a FAIL is recorded as a
    /// policy-class stage failure, never dropped.
    fn evaluate_gate(&self, ctx: &mut WorkflowContext) -> Decision {
        let draft = ctx.draft.clone().unwrap_or_default();
        let decision =
            self.evaluator
                .evaluate(&draft, ctx.request.platform, &ctx.request.policy_tags);

        if decision.is_pass() {
            debug!(workflow = %ctx.workflow_id, "policy gate passed");
            ctx.record_stage("policy_gate", StageStatus::Completed, "decision PASS");
        } else {
            let codes: Vec<String> = decision
                .violation_codes
                .iter()
                .map(|c| c.to_string())
                .collect();
            warn!(
                workflow = %ctx.workflow_id,
                violations = %codes.join(","),
                "policy gate rejected draft"
            );
            ctx.record_stage(
                "policy_gate",
                StageStatus::Failed {
                    kind: FailureKind::Policy,
                    error: format!("{} violation(s)", decision.violation_codes.len()),
                },
                format!("decision FAIL: {}", codes.join(", ")),
            );
        }
        self.audit_last_record(ctx);

        if let Err(err) = self.auditor.record_decision(&ctx.workflow_id, &decision) {
            warn!(workflow = %ctx.workflow_id, error = %err, "decision audit write failed");
            ctx.audit_ok = false;
        }
        decision
    }

    async fn run_stage(
        &self,
        stage: &dyn PipelineStage,
        ctx: &mut WorkflowContext,
    ) -> Result<(), GateError> {
        let scope = stage.name();
        let was_tripped = self.breaker.is_tripped(scope)?;

        debug!(stage = scope, "running stage");
        match tokio::time::timeout(self.config.stage_timeout, stage.run(ctx)).await {
            Ok(Ok(summary)) => {
                self.breaker.record_success(scope, stage.snapshot(ctx))?;
                ctx.record_stage(scope, StageStatus::Completed, summary);
                self.audit_last_record(ctx);
                Ok(())
            }
            Ok(Err(err)) => {
                self.handle_stage_failure(stage, ctx, was_tripped, err.to_string(), false)
            }
            Err(_) => {
                let reason = format!(
                    "timed out after {}ms",
                    self.config.stage_timeout.as_millis()
                );
                self.handle_stage_failure(stage, ctx, was_tripped, reason, true)
            }
        }
    }

    /// Failure path for a non-gating stage. Below the trip point the
    /// failure is recorded and propagated as retryable; once tripped, the
    /// last known good snapshot (or the stage fallback) is substituted and
    /// the workflow continues with a warning flag.
    fn handle_stage_failure(
        &self,
        stage: &dyn PipelineStage,
        ctx: &mut WorkflowContext,
        was_tripped: bool,
        reason: String,
        timed_out: bool,
    ) -> Result<(), GateError> {
        let scope = stage.name();
        let failures = self.breaker.record_failure(scope)?;

        if was_tripped {
            let warning = match self.breaker.last_good(scope)? {
                Some(snapshot) if stage.restore(ctx, &snapshot) => {
                    "substituted last known good output".to_string()
                }
                _ => stage.fallback(ctx),
            };
            warn!(
                stage = scope,
                failures,
                reason = %reason,
                "stage failing past threshold; degraded output substituted"
            );
            ctx.record_stage(
                scope,
                StageStatus::Degraded {
                    warning: format!("{}: {}", scope, warning),
                },
                format!("degraded ({})", reason),
            );
            self.audit_last_record(ctx);
            return Ok(());
        }

        warn!(stage = scope, failures, reason = %reason, "stage failed");
        ctx.record_stage(
            scope,
            StageStatus::Failed {
                kind: FailureKind::Infra,
                error: reason.clone(),
            },
            "stage failed",
        );
        self.audit_last_record(ctx);

        if timed_out {
            Err(GateError::StageTimeout {
                stage: scope.to_string(),
                timeout_ms: self.config.stage_timeout.as_millis() as u64,
            })
        } else {
            Err(GateError::StageFailed {
                stage: scope.to_string(),
                reason,
            })
        }
    }

    /// Mirror the newest stage record to the audit store. Advisory mode
    /// logs and continues on failure; the enforced-mode consequence (no
    /// receipt for an unaudited PASS) is applied at issuance time.
    fn audit_last_record(&self, ctx: &mut WorkflowContext) {
        let record = match ctx.records.last() {
            Some(record) => record.clone(),
            None => return,
        };
        if let Err(err) = self.auditor.record_stage(&ctx.workflow_id, &record) {
            warn!(
                workflow = %ctx.workflow_id,
                stage = %record.stage,
                error = %err,
                "stage audit write failed"
            );
            ctx.audit_ok = false;
        }
    }
}
