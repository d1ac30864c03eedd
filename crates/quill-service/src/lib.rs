//! Quill service — the creator-rewards core behind one API.
//!
//! Wires the content gate, the enforcement receipt service, the token
//! ledger, the guardrail engine and the reconciliation job together:
//!
//! - [`QuillService::run_workflow`] — gate a content request and issue its
//!   receipt.
//! - [`QuillService::get_receipt`] — the publish action's receipt check.
//! - [`QuillService::issue_for_publish`] — consume the receipt and credit
//!   the (guardrail-reduced) publish reward.
//! - [`QuillService::reconcile`] — detect and correct balance drift.
//!
//! Every operation is bounded by the configured timeout; elapse surfaces
//! as a retryable [`ServiceError::InfraTimeout`].

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use quill_gate::{
    AuditRecorder, AuditStore, DecisionBundle, InMemoryAuditStore, Pipeline, PipelineConfig,
    PolicyConfig, PolicyEvaluator,
};
use quill_ledger::{
    CachedBalanceStore, GuardrailEngine, InMemoryBalanceStore, IssuanceResponse,
    LedgerStorageConfig, PostgresLedgerStore, ReceiptLookup, ReceiptService,
    ReconciliationReport, Reconciler, TokenIssuer, TokenLedgerEngine,
};
use quill_types::{ContentRequest, Platform, ReceiptId, UserId, WorkflowId};

pub use config::{GateSettings, LedgerSettings, QuillConfig, ReceiptSettings};
pub use error::ServiceError;

/// The assembled creator-rewards core.
pub struct QuillService {
    config: QuillConfig,
    pipeline: Pipeline,
    receipts: Arc<ReceiptService>,
    issuer: TokenIssuer,
    reconciler: Reconciler,
    engine: Arc<TokenLedgerEngine>,
}

impl QuillService {
    /// In-memory service with default policy. The common entry point for
    /// tests and embedded use.
    pub fn new(config: QuillConfig) -> Self {
        Self::with_components(
            config,
            PolicyConfig::default(),
            Arc::new(InMemoryAuditStore::new()),
            Arc::new(InMemoryBalanceStore::new()),
        )
    }

    /// Service over caller-provided policy and stores.
    pub fn with_components(
        config: QuillConfig,
        policy: PolicyConfig,
        audit: Arc<dyn AuditStore>,
        balances: Arc<dyn CachedBalanceStore>,
    ) -> Self {
        let engine = Arc::new(TokenLedgerEngine::new(config.ledger.mode, balances));
        Self::assemble(config, policy, audit, engine)
    }

    /// Connect the configured ledger storage, run the one-time migration,
    /// hydrate the chain and return a ready service. This is the only
    /// place schema is ever created — the request path assumes it exists.
    pub async fn build(
        config: QuillConfig,
        policy: PolicyConfig,
        audit: Arc<dyn AuditStore>,
        balances: Arc<dyn CachedBalanceStore>,
    ) -> Result<Self, ServiceError> {
        let engine = match &config.ledger.storage {
            LedgerStorageConfig::Memory => TokenLedgerEngine::new(config.ledger.mode, balances),
            LedgerStorageConfig::Postgres {
                database_url,
                max_connections,
            } => {
                let store = PostgresLedgerStore::connect(database_url, *max_connections).await?;
                store.migrate().await?;
                let engine =
                    TokenLedgerEngine::with_mirror(config.ledger.mode, balances, store);
                engine.hydrate().await?;
                engine
            }
        };
        Ok(Self::assemble(config, policy, audit, Arc::new(engine)))
    }

    fn assemble(
        config: QuillConfig,
        policy: PolicyConfig,
        audit: Arc<dyn AuditStore>,
        engine: Arc<TokenLedgerEngine>,
    ) -> Self {
        let receipts = Arc::new(ReceiptService::new(chrono::Duration::seconds(
            config.receipts.ttl_secs,
        )));
        let pipeline = Pipeline::with_default_stages(
            PolicyEvaluator::new(policy),
            AuditRecorder::new(audit),
            receipts.clone(),
            PipelineConfig {
                mode: config.gate.mode,
                breaker_threshold: config.gate.breaker_threshold,
                stage_timeout: Duration::from_millis(config.gate.stage_timeout_ms),
            },
        );
        let guardrails = Arc::new(GuardrailEngine::new(config.guardrails.clone()));
        let issuer = TokenIssuer::new(receipts.clone(), guardrails, engine.clone());
        let reconciler = Reconciler::new(engine.clone());

        Self {
            config,
            pipeline,
            receipts,
            issuer,
            reconciler,
            engine,
        }
    }

    pub fn config(&self) -> &QuillConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn receipts(&self) -> &Arc<ReceiptService> {
        &self.receipts
    }

    pub fn ledger(&self) -> &Arc<TokenLedgerEngine> {
        &self.engine
    }

    /// Configured base reward for a verified publish, before guardrails.
    pub fn default_publish_reward(&self) -> i64 {
        self.config.ledger.base_publish_reward
    }

    // ============ Workflow ============

    /// Gate one content request end to end and return its decision bundle.
    pub async fn run_workflow(
        &self,
        request: ContentRequest,
    ) -> Result<DecisionBundle, ServiceError> {
        let timeout = Duration::from_millis(self.config.operation_timeout_ms);
        match tokio::time::timeout(timeout, self.pipeline.run(request)).await {
            Ok(bundle) => Ok(bundle?),
            Err(_) => Err(ServiceError::InfraTimeout {
                op: "run_workflow",
                timeout_ms: self.config.operation_timeout_ms,
            }),
        }
    }

    // ============ Receipts ============

    /// Receipt check for the publish action. In enforced mode the caller
    /// denies publish on any non-valid outcome, each with its own code.
    pub fn get_receipt(&self, request_id: &WorkflowId) -> ReceiptLookup {
        self.receipts.lookup(request_id)
    }

    // ============ Token issuance ============

    /// Consume the receipt for a published workflow and credit the reward.
    /// Idempotent per (request id, receipt id); a timed-out call can be
    /// retried safely.
    pub async fn issue_for_publish(
        &self,
        user_id: UserId,
        request_id: WorkflowId,
        receipt_id: ReceiptId,
        platform: Platform,
        base_amount: i64,
    ) -> Result<IssuanceResponse, ServiceError> {
        let timeout = Duration::from_millis(self.config.operation_timeout_ms);
        let issuance = self.issuer.issue_for_publish(
            user_id,
            request_id,
            receipt_id,
            platform,
            base_amount,
        );
        match tokio::time::timeout(timeout, issuance).await {
            Ok(response) => Ok(response?),
            Err(_) => Err(ServiceError::InfraTimeout {
                op: "issue_for_publish",
                timeout_ms: self.config.operation_timeout_ms,
            }),
        }
    }

    // ============ Reconciliation ============

    /// One reconciliation pass. Callable on demand or on a schedule.
    pub async fn reconcile(&self) -> Result<ReconciliationReport, ServiceError> {
        let timeout = Duration::from_millis(self.config.operation_timeout_ms);
        match tokio::time::timeout(timeout, self.reconciler.run()).await {
            Ok(report) => Ok(report?),
            Err(_) => Err(ServiceError::InfraTimeout {
                op: "reconcile",
                timeout_ms: self.config.operation_timeout_ms,
            }),
        }
    }
}
