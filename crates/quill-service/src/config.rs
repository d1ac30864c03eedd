//! Configuration for the Quill service.
//!
//! All operating modes are explicit configuration threaded into the
//! components at construction — there are no module-level mode flags
//! anywhere in the workspace.

use serde::{Deserialize, Serialize};

use quill_ledger::{GuardrailConfig, LedgerStorageConfig, ReceiptService};
use quill_types::{GateMode, LedgerMode};

/// Complete service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuillConfig {
    pub gate: GateSettings,
    pub receipts: ReceiptSettings,
    pub ledger: LedgerSettings,
    pub guardrails: GuardrailConfig,
    /// Upper bound on one facade operation; elapse is a retryable
    /// InfraTimeout.
    pub operation_timeout_ms: u64,
}

impl Default for QuillConfig {
    fn default() -> Self {
        Self {
            gate: GateSettings::default(),
            receipts: ReceiptSettings::default(),
            ledger: LedgerSettings::default(),
            guardrails: GuardrailConfig::default(),
            operation_timeout_ms: 30_000,
        }
    }
}

impl QuillConfig {
    /// Full enforcement with a live ledger.
    pub fn enforced_live() -> Self {
        Self {
            gate: GateSettings {
                mode: GateMode::Enforced,
                ..GateSettings::default()
            },
            ledger: LedgerSettings {
                mode: LedgerMode::Live,
                ..LedgerSettings::default()
            },
            ..Self::default()
        }
    }
}

/// Gate pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateSettings {
    pub mode: GateMode,
    pub breaker_threshold: u32,
    pub stage_timeout_ms: u64,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            mode: GateMode::Advisory,
            breaker_threshold: 3,
            stage_timeout_ms: 10_000,
        }
    }
}

/// Receipt service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptSettings {
    pub ttl_secs: i64,
}

impl Default for ReceiptSettings {
    fn default() -> Self {
        Self {
            ttl_secs: ReceiptService::DEFAULT_TTL_SECS,
        }
    }
}

/// Token ledger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    pub mode: LedgerMode,
    pub storage: LedgerStorageConfig,
    /// Base reward for a verified publish, before guardrails.
    pub base_publish_reward: i64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            mode: LedgerMode::Shadow,
            storage: LedgerStorageConfig::Memory,
            base_publish_reward: 100,
        }
    }
}
