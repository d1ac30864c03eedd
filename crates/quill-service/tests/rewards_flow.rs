//! End-to-end flows through the assembled service: gate → receipt →
//! issuance → reconciliation.

use std::sync::Arc;

use quill_gate::PolicyConfig;
use quill_ledger::{CachedBalanceStore, InMemoryBalanceStore, ReceiptLookup};
use quill_service::{QuillConfig, QuillService, ServiceError};
use quill_types::{
    ContentRequest, DecisionStatus, Platform, ReceiptId, UserId, ViolationCode, WorkflowId,
};

use quill_gate::InMemoryAuditStore;

fn creator() -> UserId {
    UserId::new("creator-1")
}

fn request(topic: &str) -> ContentRequest {
    ContentRequest::new(creator(), topic, Platform::X)
}

fn enforced_live_service() -> (QuillService, Arc<InMemoryBalanceStore>) {
    let balances = Arc::new(InMemoryBalanceStore::new());
    let service = QuillService::with_components(
        QuillConfig::enforced_live(),
        PolicyConfig::default(),
        Arc::new(InMemoryAuditStore::new()),
        balances.clone(),
    );
    (service, balances)
}

async fn publish(
    service: &QuillService,
    request_id: WorkflowId,
    receipt_id: ReceiptId,
) -> Result<quill_ledger::IssuanceResponse, ServiceError> {
    service
        .issue_for_publish(creator(), request_id, receipt_id, Platform::X, 100)
        .await
}

#[tokio::test]
async fn verified_publish_earns_the_full_reward() {
    let (service, balances) = enforced_live_service();

    let bundle = service.run_workflow(request("spring launch recap")).await.unwrap();
    assert!(bundle.decisions[0].is_pass());
    assert!(!bundle.would_block);
    let receipt_id = bundle.receipt_id.clone().unwrap();

    // The publish action checks the receipt first.
    match service.get_receipt(&bundle.workflow_id) {
        ReceiptLookup::Valid(receipt) => {
            assert_eq!(receipt.status, DecisionStatus::Pass);
            assert!(receipt.audit_ok);
        }
        other => panic!("expected a valid receipt, got {:?}", other),
    }

    let response = publish(&service, bundle.workflow_id.clone(), receipt_id)
        .await
        .unwrap();
    assert_eq!(response.reason_code, "TOKENS_ISSUED");
    assert_eq!(response.issued_amount, 100);
    assert_eq!(balances.get(&creator()).unwrap(), 100);

    // The receipt is burned now.
    assert!(matches!(
        service.get_receipt(&bundle.workflow_id),
        ReceiptLookup::AlreadyConsumed
    ));
}

#[tokio::test]
async fn repeated_publish_is_idempotent() {
    let (service, balances) = enforced_live_service();

    let bundle = service.run_workflow(request("spring launch")).await.unwrap();
    let receipt_id = bundle.receipt_id.clone().unwrap();

    let first = publish(&service, bundle.workflow_id.clone(), receipt_id.clone())
        .await
        .unwrap();
    let second = publish(&service, bundle.workflow_id.clone(), receipt_id)
        .await
        .unwrap();

    assert_eq!(first.entry_id, second.entry_id);
    assert_eq!(first.issued_amount, second.issued_amount);
    assert_eq!(
        service.ledger().entries_for(&creator()).await.len(),
        1
    );
    assert_eq!(balances.get(&creator()).unwrap(), 100);
}

#[tokio::test]
async fn banned_term_blocks_enforced_but_not_advisory() {
    let (enforced, _) = enforced_live_service();
    let bundle = enforced
        .run_workflow(request("this damn launch"))
        .await
        .unwrap();

    let decision = &bundle.decisions[0];
    assert_eq!(decision.status, DecisionStatus::Fail);
    assert!(decision.violation_codes.contains(&ViolationCode::Profanity));
    assert!(!decision.required_edits.is_empty());
    assert!(bundle.would_block);

    // The FAIL receipt exists but cannot authorize issuance.
    let receipt_id = bundle.receipt_id.clone().unwrap();
    let err = publish(&enforced, bundle.workflow_id.clone(), receipt_id)
        .await
        .unwrap_err();
    assert_eq!(err.denial_code(), Some("DECISION_NOT_PASS"));
    assert!(enforced.ledger().entries_for(&creator()).await.is_empty());

    let advisory = QuillService::new(QuillConfig::default());
    let bundle = advisory
        .run_workflow(request("this damn launch"))
        .await
        .unwrap();
    assert_eq!(bundle.decisions[0].status, DecisionStatus::Fail);
    assert!(!bundle.would_block);
}

#[tokio::test]
async fn shadow_mode_records_pending_without_real_balances() {
    // Default posture: advisory gate, shadow ledger.
    let balances = Arc::new(InMemoryBalanceStore::new());
    let service = QuillService::with_components(
        QuillConfig::default(),
        PolicyConfig::default(),
        Arc::new(InMemoryAuditStore::new()),
        balances.clone(),
    );

    let bundle = service.run_workflow(request("spring launch")).await.unwrap();
    let receipt_id = bundle.receipt_id.clone().unwrap();

    let response = publish(&service, bundle.workflow_id.clone(), receipt_id)
        .await
        .unwrap();
    assert_eq!(response.reason_code, "TOKENS_PENDING");
    assert_eq!(response.pending_amount, 100);
    assert_eq!(response.issued_amount, 0);

    assert_eq!(balances.get(&creator()).unwrap(), 0);
    assert_eq!(service.ledger().pending_for(&creator()).await.len(), 1);
    assert!(service.ledger().entries_for(&creator()).await.is_empty());
}

#[tokio::test]
async fn second_publish_within_a_minute_is_guardrail_blocked() {
    let (service, balances) = enforced_live_service();

    let first = service.run_workflow(request("launch recap one")).await.unwrap();
    let response = publish(
        &service,
        first.workflow_id.clone(),
        first.receipt_id.clone().unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(response.issued_amount, 100);

    let second = service.run_workflow(request("launch recap two")).await.unwrap();
    let response = publish(
        &service,
        second.workflow_id.clone(),
        second.receipt_id.clone().unwrap(),
    )
    .await
    .unwrap();

    assert_eq!(response.reason_code, "GUARDRAIL_BLOCKED");
    assert_eq!(response.issued_amount, 0);
    assert!(!response.guardrails_applied.is_empty());
    assert_eq!(balances.get(&creator()).unwrap(), 100);
}

#[tokio::test]
async fn reconcile_corrects_forced_drift_once() {
    let (service, balances) = enforced_live_service();

    let bundle = service.run_workflow(request("spring launch")).await.unwrap();
    publish(
        &service,
        bundle.workflow_id.clone(),
        bundle.receipt_id.clone().unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(balances.get(&creator()).unwrap(), 100);

    // Force a +50 cached drift.
    balances.set(&creator(), 150).unwrap();

    let report = service.reconcile().await.unwrap();
    assert_eq!(report.mismatches_found, 1);
    assert_eq!(report.adjustments_made, 1);

    let entries = service.ledger().entries_for(&creator()).await;
    assert_eq!(entries.last().unwrap().amount, -50);
    assert_eq!(entries.last().unwrap().reason_code, "reconciliation");
    assert_eq!(
        balances.get(&creator()).unwrap(),
        service.ledger().balance(&creator()).await
    );

    let second = service.reconcile().await.unwrap();
    assert_eq!(second.mismatches_found, 0);
    assert_eq!(second.adjustments_made, 0);
}
