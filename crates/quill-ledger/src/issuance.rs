use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use quill_types::{
    DecisionStatus, EntryId, LedgerEventType, LedgerMode, Platform, ReceiptId, UserId, WorkflowId,
};

use crate::engine::{AppendRequest, LedgerResult, TokenLedgerEngine};
use crate::error::IssuanceError;
use crate::guardrail::{GuardrailApplication, GuardrailEngine};
use crate::receipt::{ReceiptLookup, ReceiptService};

/// Reason codes on issuance responses.
pub mod reason {
    pub const TOKENS_ISSUED: &str = "TOKENS_ISSUED";
    pub const TOKENS_PENDING: &str = "TOKENS_PENDING";
    pub const LEDGER_DISABLED: &str = "LEDGER_DISABLED";
    pub const GUARDRAIL_BLOCKED: &str = "GUARDRAIL_BLOCKED";
}

/// Ledger reason code attached to publish reward entries.
pub const PUBLISH_REWARD: &str = "publish_reward";

/// Outcome of one issuance attempt.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IssuanceResponse {
    pub mode: LedgerMode,
    pub request_id: WorkflowId,
    pub base_amount: i64,
    /// Points actually credited (live mode).
    pub issued_amount: i64,
    /// Points that would have been credited (shadow mode).
    pub pending_amount: i64,
    pub reason_code: String,
    pub guardrails_applied: Vec<GuardrailApplication>,
    pub entry_id: Option<EntryId>,
}

/// The token issuance path: receipt → guardrails → ledger append.
///
/// Issuance is idempotent per (request id, receipt id): a retried call —
/// after an infra timeout, for instance — returns the original response
/// instead of burning on the already-consumed receipt, and guardrail state
/// is not updated a second time. The replay cache sits in front of the
/// receipt consume for exactly that reason.
pub struct TokenIssuer {
    receipts: Arc<ReceiptService>,
    guardrails: Arc<GuardrailEngine>,
    engine: Arc<TokenLedgerEngine>,
    replays: Mutex<HashMap<String, IssuanceResponse>>,
}

impl TokenIssuer {
    pub fn new(
        receipts: Arc<ReceiptService>,
        guardrails: Arc<GuardrailEngine>,
        engine: Arc<TokenLedgerEngine>,
    ) -> Self {
        Self {
            receipts,
            guardrails,
            engine,
            replays: Mutex::new(HashMap::new()),
        }
    }

    pub fn receipts(&self) -> &Arc<ReceiptService> {
        &self.receipts
    }

    pub fn guardrails(&self) -> &Arc<GuardrailEngine> {
        &self.guardrails
    }

    pub fn engine(&self) -> &Arc<TokenLedgerEngine> {
        &self.engine
    }

    /// Issue the publish reward for a gated workflow.
    ///
    /// Eligibility: a valid, unconsumed, unexpired receipt for the request,
    /// matching the presented receipt id, with a PASS decision and a
    /// complete audit trail. Every denial carries its own reason code.
    pub async fn issue_for_publish(
        &self,
        user_id: UserId,
        request_id: WorkflowId,
        receipt_id: ReceiptId,
        platform: Platform,
        base_amount: i64,
    ) -> Result<IssuanceResponse, IssuanceError> {
        let idempotency_key = format!("{}:{}", request_id.0, receipt_id.0);

        {
            let replays = self.replays.lock().await;
            if let Some(prior) = replays.get(&idempotency_key) {
                info!(request = %request_id, "issuance replayed from idempotency cache");
                return Ok(prior.clone());
            }
        }

        if self.engine.mode() == LedgerMode::Off {
            // The ledger is disabled; leave the receipt untouched so turning
            // the ledger on later does not find it burned for nothing.
            return Ok(IssuanceResponse {
                mode: LedgerMode::Off,
                request_id,
                base_amount,
                issued_amount: 0,
                pending_amount: 0,
                reason_code: reason::LEDGER_DISABLED.to_string(),
                guardrails_applied: Vec::new(),
                entry_id: None,
            });
        }

        let receipt = match self.receipts.lookup(&request_id) {
            ReceiptLookup::Valid(receipt) => receipt,
            ReceiptLookup::NotFound => {
                return Err(crate::error::ReceiptError::NotFound(request_id).into())
            }
            ReceiptLookup::Expired => {
                return Err(crate::error::ReceiptError::Expired(request_id).into())
            }
            ReceiptLookup::AlreadyConsumed => {
                return Err(crate::error::ReceiptError::AlreadyConsumed(request_id).into())
            }
        };

        if receipt.receipt_id != receipt_id {
            return Err(IssuanceError::ReceiptMismatch {
                request: request_id,
                presented: receipt_id,
            });
        }
        if receipt.status != DecisionStatus::Pass {
            return Err(IssuanceError::DecisionNotPass(request_id));
        }
        if !receipt.audit_ok {
            return Err(IssuanceError::AuditIncomplete(request_id));
        }

        // Single-use transition. Of any concurrent callers for this
        // request, exactly one reaches the guardrails and the ledger.
        self.receipts.consume(&request_id)?;

        let outcome = self
            .guardrails
            .evaluate_at(&user_id, base_amount, Utc::now())?;

        let response = if outcome.issued_amount <= 0 {
            warn!(
                user = %user_id,
                request = %request_id,
                base_amount,
                "issuance fully blocked by guardrails"
            );
            IssuanceResponse {
                mode: self.engine.mode(),
                request_id: request_id.clone(),
                base_amount,
                issued_amount: 0,
                pending_amount: 0,
                reason_code: reason::GUARDRAIL_BLOCKED.to_string(),
                guardrails_applied: outcome.applied,
                entry_id: None,
            }
        } else {
            let metadata = serde_json::json!({
                "request_id": request_id,
                "receipt_id": receipt_id,
                "platform": platform,
                "base_amount": base_amount,
                "guardrails": outcome.applied,
            });
            let result = self
                .engine
                .append(AppendRequest {
                    user_id: user_id.clone(),
                    event_type: LedgerEventType::Earn,
                    reason_code: PUBLISH_REWARD.to_string(),
                    amount: outcome.issued_amount,
                    metadata,
                    idempotency_key: idempotency_key.clone(),
                })
                .await?;

            match result {
                LedgerResult::Applied { entry, .. } => IssuanceResponse {
                    mode: LedgerMode::Live,
                    request_id: request_id.clone(),
                    base_amount,
                    issued_amount: entry.amount,
                    pending_amount: 0,
                    reason_code: reason::TOKENS_ISSUED.to_string(),
                    guardrails_applied: outcome.applied,
                    entry_id: Some(entry.id),
                },
                LedgerResult::Shadowed { entry, .. } => IssuanceResponse {
                    mode: LedgerMode::Shadow,
                    request_id: request_id.clone(),
                    base_amount,
                    issued_amount: 0,
                    pending_amount: entry.amount,
                    reason_code: reason::TOKENS_PENDING.to_string(),
                    guardrails_applied: outcome.applied,
                    entry_id: Some(entry.id),
                },
                LedgerResult::Disabled => IssuanceResponse {
                    mode: LedgerMode::Off,
                    request_id: request_id.clone(),
                    base_amount,
                    issued_amount: 0,
                    pending_amount: 0,
                    reason_code: reason::LEDGER_DISABLED.to_string(),
                    guardrails_applied: outcome.applied,
                    entry_id: None,
                },
            }
        };

        info!(
            user = %user_id,
            request = %request_id,
            reason = %response.reason_code,
            issued = response.issued_amount,
            pending = response.pending_amount,
            "issuance settled"
        );
        let mut replays = self.replays.lock().await;
        replays.insert(idempotency_key, response.clone());
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::{CachedBalanceStore, InMemoryBalanceStore};
    use crate::error::ReceiptError;
    use crate::guardrail::GuardrailConfig;
    use chrono::Duration;
    use quill_types::{EnforcementReceipt, GateMode};

    fn issuer(mode: LedgerMode) -> (TokenIssuer, Arc<InMemoryBalanceStore>) {
        let balances = Arc::new(InMemoryBalanceStore::new());
        let issuer = TokenIssuer::new(
            Arc::new(ReceiptService::with_default_ttl()),
            Arc::new(GuardrailEngine::new(GuardrailConfig::default())),
            Arc::new(TokenLedgerEngine::new(mode, balances.clone())),
        );
        (issuer, balances)
    }

    fn pass_receipt(issuer: &TokenIssuer) -> EnforcementReceipt {
        issuer.receipts.issue_at(
            WorkflowId::new(),
            DecisionStatus::Pass,
            true,
            GateMode::Enforced,
            Utc::now(),
        )
    }

    fn user() -> UserId {
        UserId::new("creator-1")
    }

    #[tokio::test]
    async fn live_issuance_credits_the_full_base_amount() {
        let (issuer, balances) = issuer(LedgerMode::Live);
        let receipt = pass_receipt(&issuer);

        let response = issuer
            .issue_for_publish(
                user(),
                receipt.workflow_id.clone(),
                receipt.receipt_id.clone(),
                Platform::X,
                100,
            )
            .await
            .unwrap();

        assert_eq!(response.reason_code, reason::TOKENS_ISSUED);
        assert_eq!(response.issued_amount, 100);
        assert!(response.entry_id.is_some());
        assert_eq!(balances.get(&user()).unwrap(), 100);
    }

    #[tokio::test]
    async fn repeated_call_returns_identical_response_and_one_entry() {
        let (issuer, _) = issuer(LedgerMode::Live);
        let receipt = pass_receipt(&issuer);

        let first = issuer
            .issue_for_publish(
                user(),
                receipt.workflow_id.clone(),
                receipt.receipt_id.clone(),
                Platform::X,
                100,
            )
            .await
            .unwrap();
        let second = issuer
            .issue_for_publish(
                user(),
                receipt.workflow_id.clone(),
                receipt.receipt_id.clone(),
                Platform::X,
                100,
            )
            .await
            .unwrap();

        assert_eq!(first.entry_id, second.entry_id);
        assert_eq!(first.issued_amount, second.issued_amount);
        assert_eq!(first.reason_code, second.reason_code);
        assert_eq!(issuer.engine.entries_for(&user()).await.len(), 1);
        // Guardrail state saw exactly one attempt.
        let state = issuer.guardrails.state(&user()).unwrap().unwrap();
        assert_eq!(state.daily_count, 1);
    }

    #[tokio::test]
    async fn shadow_issuance_reports_pending_and_touches_nothing() {
        let (issuer, balances) = issuer(LedgerMode::Shadow);
        let receipt = pass_receipt(&issuer);

        let response = issuer
            .issue_for_publish(
                user(),
                receipt.workflow_id.clone(),
                receipt.receipt_id.clone(),
                Platform::X,
                100,
            )
            .await
            .unwrap();

        assert_eq!(response.reason_code, reason::TOKENS_PENDING);
        assert_eq!(response.pending_amount, 100);
        assert_eq!(response.issued_amount, 0);
        assert_eq!(balances.get(&user()).unwrap(), 0);
    }

    #[tokio::test]
    async fn off_mode_reports_disabled_without_burning_the_receipt() {
        let (issuer, _) = issuer(LedgerMode::Off);
        let receipt = pass_receipt(&issuer);

        let response = issuer
            .issue_for_publish(
                user(),
                receipt.workflow_id.clone(),
                receipt.receipt_id.clone(),
                Platform::X,
                100,
            )
            .await
            .unwrap();

        assert_eq!(response.reason_code, reason::LEDGER_DISABLED);
        assert!(issuer.receipts.lookup(&receipt.workflow_id).is_valid());
    }

    #[tokio::test]
    async fn missing_and_mismatched_receipts_deny_with_specific_codes() {
        let (issuer, _) = issuer(LedgerMode::Live);

        let err = issuer
            .issue_for_publish(user(), WorkflowId::new(), ReceiptId::new(), Platform::X, 100)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "RECEIPT_NOT_FOUND");

        let receipt = pass_receipt(&issuer);
        let err = issuer
            .issue_for_publish(
                user(),
                receipt.workflow_id.clone(),
                ReceiptId::new(),
                Platform::X,
                100,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "RECEIPT_MISMATCH");
    }

    #[tokio::test]
    async fn fail_decision_and_incomplete_audit_are_denied() {
        let (issuer, _) = issuer(LedgerMode::Live);

        let failed = issuer.receipts.issue_at(
            WorkflowId::new(),
            DecisionStatus::Fail,
            true,
            GateMode::Enforced,
            Utc::now(),
        );
        let err = issuer
            .issue_for_publish(
                user(),
                failed.workflow_id.clone(),
                failed.receipt_id.clone(),
                Platform::X,
                100,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "DECISION_NOT_PASS");

        let unaudited = issuer.receipts.issue_at(
            WorkflowId::new(),
            DecisionStatus::Pass,
            false,
            GateMode::Enforced,
            Utc::now(),
        );
        let err = issuer
            .issue_for_publish(
                user(),
                unaudited.workflow_id.clone(),
                unaudited.receipt_id.clone(),
                Platform::X,
                100,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "AUDIT_INCOMPLETE");
    }

    #[tokio::test]
    async fn expired_receipt_is_denied() {
        let balances = Arc::new(InMemoryBalanceStore::new());
        let issuer = TokenIssuer::new(
            Arc::new(ReceiptService::new(Duration::seconds(0))),
            Arc::new(GuardrailEngine::new(GuardrailConfig::default())),
            Arc::new(TokenLedgerEngine::new(LedgerMode::Live, balances)),
        );
        let receipt = pass_receipt(&issuer);

        let err = issuer
            .issue_for_publish(
                user(),
                receipt.workflow_id.clone(),
                receipt.receipt_id.clone(),
                Platform::X,
                100,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "RECEIPT_EXPIRED");
    }

    #[tokio::test]
    async fn guardrail_block_is_an_explained_outcome_not_an_error() {
        let (issuer, balances) = issuer(LedgerMode::Live);

        let first = pass_receipt(&issuer);
        issuer
            .issue_for_publish(
                user(),
                first.workflow_id.clone(),
                first.receipt_id.clone(),
                Platform::X,
                100,
            )
            .await
            .unwrap();

        // Second publish immediately after: fully blocked, zero issued.
        let second = pass_receipt(&issuer);
        let response = issuer
            .issue_for_publish(
                user(),
                second.workflow_id.clone(),
                second.receipt_id.clone(),
                Platform::X,
                100,
            )
            .await
            .unwrap();

        assert_eq!(response.reason_code, reason::GUARDRAIL_BLOCKED);
        assert_eq!(response.issued_amount, 0);
        assert!(!response.guardrails_applied.is_empty());
        assert_eq!(balances.get(&user()).unwrap(), 100);
        assert_eq!(issuer.engine.entries_for(&user()).await.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_issuance_for_one_receipt_yields_one_success() {
        let (issuer, _) = issuer(LedgerMode::Live);
        let issuer = Arc::new(issuer);
        let receipt = pass_receipt(&issuer);

        let mut handles = Vec::new();
        for _ in 0..6 {
            let issuer = issuer.clone();
            let rid = receipt.workflow_id.clone();
            let receipt_id = receipt.receipt_id.clone();
            handles.push(tokio::spawn(async move {
                issuer
                    .issue_for_publish(user(), rid, receipt_id, Platform::X, 100)
                    .await
            }));
        }

        // A caller either lands the single issuance (or its idempotent
        // replay) or is denied on the consumed receipt — never a second
        // entry.
        let mut entry_ids = Vec::new();
        let mut consumed_denials = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(response) => entry_ids.push(response.entry_id),
                Err(IssuanceError::Receipt(ReceiptError::AlreadyConsumed(_))) => {
                    consumed_denials += 1
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert!(!entry_ids.is_empty());
        assert_eq!(entry_ids.len() + consumed_denials, 6);
        entry_ids.dedup();
        assert_eq!(entry_ids.len(), 1);
        assert_eq!(issuer.engine.entries_for(&user()).await.len(), 1);
    }
}
