//! Quill token ledger — receipts, append-only entries, guardrails,
//! reconciliation.
//!
//! The ledger provides financial-grade accounting for creator reward
//! points: every balance change is an immutable, idempotent entry; every
//! EARN is authorized by a single-use enforcement receipt and reduced by
//! deterministic anti-gaming guardrails; drift between the ledger and the
//! cached balance is detected and corrected by the reconciliation job.
//!
//! ## Invariants
//!
//! - The ledger is append-only. No delete or modify operations exist.
//! - For every user, the sum of entry amounts equals the latest
//!   `balance_after` at all times.
//! - A receipt is consumed at most once; of any concurrent consumers,
//!   exactly one succeeds.
//! - Shadow mode never touches a real balance.

#![deny(unsafe_code)]

pub mod balance;
pub mod engine;
pub mod error;
pub mod guardrail;
pub mod issuance;
pub mod receipt;
pub mod reconcile;
pub mod storage;

pub use balance::{CachedBalanceStore, InMemoryBalanceStore};
pub use engine::{AppendRequest, LedgerResult, TokenLedgerEngine};
pub use error::{BalanceError, IssuanceError, LedgerError, ReceiptError};
pub use guardrail::{
    GuardrailApplication, GuardrailConfig, GuardrailEngine, GuardrailOutcome, GuardrailRule,
    GuardrailState, ReductionComposition,
};
pub use issuance::{reason, IssuanceResponse, TokenIssuer};
pub use receipt::{ReceiptLookup, ReceiptService};
pub use reconcile::{ReconciliationReport, Reconciler};
pub use storage::{LedgerStorageConfig, PostgresLedgerStore};
