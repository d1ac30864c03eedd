//! Core type definitions for the Quill creator-rewards core.
//!
//! This crate provides the shared domain types: ids, content carriers, the
//! canonical policy decision, enforcement receipts, ledger entry shapes and
//! operating modes. No business logic — just types. Every Quill crate
//! depends on this crate.

pub mod content;
pub mod decision;
pub mod ids;
pub mod ledger;
pub mod mode;
pub mod receipt;

// Re-export primary types at crate root for ergonomic use.
pub use content::{ContentRequest, Draft, Platform};
pub use decision::{Decision, DecisionStatus, ViolationCode};
pub use ids::{EntryId, ReceiptId, UserId, WorkflowId};
pub use ledger::{LedgerEntry, LedgerEventType, PendingEntry};
pub use mode::{GateMode, LedgerMode};
pub use receipt::EnforcementReceipt;
