//! Quill content gate — staged pipeline ending in one deterministic decision.
//!
//! A workflow runs its stages sequentially: strategy → research → writer →
//! policy gate → publish-intent → analytics-intent. Advisory stages may fail
//! or degrade; only the policy evaluator can block. The pipeline records
//! every stage result to the append-only audit store and finishes by issuing
//! an enforcement receipt bound to the terminal decision.
//!
//! ## Invariants
//!
//! - Only the policy evaluator produces a FAIL decision. Advisory-stage
//!   failures are infra-class and never block on their own.
//! - Every stage result — completed, degraded or failed — is recorded,
//!   never dropped.
//! - An unaudited PASS never authorizes downstream action in enforced mode:
//!   if the decision audit write fails before a receipt exists, no receipt
//!   is issued.
//! - Audit rows written before a failure or cancellation are never
//!   retracted.

pub mod audit;
pub mod breaker;
pub mod context;
pub mod error;
pub mod mocks;
pub mod pipeline;
pub mod policy;
pub mod stages;
pub mod traits;

pub use audit::{AuditRecord, AuditRecorder, AuditStore, InMemoryAuditStore};
pub use breaker::CircuitBreaker;
pub use context::{
    AnalyticsIntent, DecisionBundle, FailureKind, PublishIntent, ResearchNotes, StageRecord,
    StageStatus, StrategyBrief, WorkflowContext,
};
pub use error::{AuditError, GateError, StageError};
pub use pipeline::{Pipeline, PipelineConfig};
pub use policy::{PolicyConfig, PolicyEvaluator};
pub use stages::{
    AnalyticsIntentStage, PublishIntentStage, ResearchStage, StrategyStage, WriterStage,
};
pub use traits::{PipelineStage, ReceiptIssuer};
