use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use quill_gate::ReceiptIssuer;
use quill_types::{DecisionStatus, EnforcementReceipt, GateMode, ReceiptId, WorkflowId};

use crate::error::ReceiptError;

/// Outcome of a receipt lookup. The three non-valid states are distinct so
/// a publish action can deny with a precise code.
#[derive(Clone, Debug)]
pub enum ReceiptLookup {
    Valid(EnforcementReceipt),
    NotFound,
    Expired,
    AlreadyConsumed,
}

impl ReceiptLookup {
    pub fn is_valid(&self) -> bool {
        matches!(self, ReceiptLookup::Valid(_))
    }
}

/// Issues and consumes enforcement receipts.
///
/// One receipt per workflow, keyed by the request (workflow) id, with a
/// fixed TTL. `consume` is a single check-and-set under the write lock:
/// of any concurrent callers for the same request id, exactly one
/// transitions unconsumed → consumed.
pub struct ReceiptService {
    ttl: Duration,
    store: RwLock<HashMap<WorkflowId, EnforcementReceipt>>,
}

impl ReceiptService {
    /// Default receipt lifetime.
    pub const DEFAULT_TTL_SECS: i64 = 15 * 60;

    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            store: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_default_ttl() -> Self {
        Self::new(Duration::seconds(Self::DEFAULT_TTL_SECS))
    }

    /// Issue a receipt binding a request id to its decision outcome.
    pub fn issue_at(
        &self,
        workflow_id: WorkflowId,
        status: DecisionStatus,
        audit_ok: bool,
        mode: GateMode,
        now: DateTime<Utc>,
    ) -> EnforcementReceipt {
        let receipt = EnforcementReceipt {
            receipt_id: ReceiptId::new(),
            workflow_id: workflow_id.clone(),
            status,
            audit_ok,
            mode,
            issued_at: now,
            expires_at: now + self.ttl,
            consumed_at: None,
        };
        info!(
            request = %workflow_id,
            receipt = %receipt.receipt_id,
            status = ?status,
            audit_ok,
            "receipt issued"
        );
        let mut store = write_or_recover(&self.store);
        store.insert(workflow_id, receipt.clone());
        receipt
    }

    pub fn lookup(&self, request_id: &WorkflowId) -> ReceiptLookup {
        self.lookup_at(request_id, Utc::now())
    }

    pub fn lookup_at(&self, request_id: &WorkflowId, now: DateTime<Utc>) -> ReceiptLookup {
        let store = read_or_recover(&self.store);
        match store.get(request_id) {
            None => ReceiptLookup::NotFound,
            Some(receipt) if receipt.is_consumed() => ReceiptLookup::AlreadyConsumed,
            Some(receipt) if receipt.is_expired(now) => ReceiptLookup::Expired,
            Some(receipt) => ReceiptLookup::Valid(receipt.clone()),
        }
    }

    /// Atomically consume the receipt for a request id.
    ///
    /// Exactly one concurrent caller wins; the rest receive
    /// `AlreadyConsumed`. The check and the transition happen under one
    /// write lock so there is no window between them.
    pub fn consume(&self, request_id: &WorkflowId) -> Result<EnforcementReceipt, ReceiptError> {
        self.consume_at(request_id, Utc::now())
    }

    pub fn consume_at(
        &self,
        request_id: &WorkflowId,
        now: DateTime<Utc>,
    ) -> Result<EnforcementReceipt, ReceiptError> {
        let mut store = write_or_recover(&self.store);
        let receipt = store
            .get_mut(request_id)
            .ok_or_else(|| ReceiptError::NotFound(request_id.clone()))?;

        if receipt.is_consumed() {
            return Err(ReceiptError::AlreadyConsumed(request_id.clone()));
        }
        if receipt.is_expired(now) {
            return Err(ReceiptError::Expired(request_id.clone()));
        }

        receipt.consumed_at = Some(now);
        debug!(request = %request_id, "receipt consumed");
        Ok(receipt.clone())
    }

    /// Drop receipts past their expiry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut store = write_or_recover(&self.store);
        let before = store.len();
        store.retain(|_, receipt| !receipt.is_expired(now));
        before - store.len()
    }

    pub fn len(&self) -> usize {
        read_or_recover(&self.store).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReceiptIssuer for ReceiptService {
    fn issue(
        &self,
        workflow_id: WorkflowId,
        status: DecisionStatus,
        audit_ok: bool,
        mode: GateMode,
    ) -> EnforcementReceipt {
        self.issue_at(workflow_id, status, audit_ok, mode, Utc::now())
    }
}

// A poisoned lock only means a holder panicked mid-read; receipt state
// itself is only written through the atomic transitions above, so recover
// rather than wedge every later caller.
fn read_or_recover<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_or_recover<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn service() -> ReceiptService {
        ReceiptService::with_default_ttl()
    }

    fn issue_pass(service: &ReceiptService) -> EnforcementReceipt {
        service.issue_at(
            WorkflowId::new(),
            DecisionStatus::Pass,
            true,
            GateMode::Enforced,
            Utc::now(),
        )
    }

    #[test]
    fn lookup_distinguishes_all_states() {
        let service = service();
        let receipt = issue_pass(&service);
        let rid = receipt.workflow_id.clone();

        assert!(service.lookup(&rid).is_valid());
        assert!(matches!(
            service.lookup(&WorkflowId::new()),
            ReceiptLookup::NotFound
        ));

        service.consume(&rid).unwrap();
        assert!(matches!(
            service.lookup(&rid),
            ReceiptLookup::AlreadyConsumed
        ));

        let fresh = issue_pass(&service);
        let later = fresh.expires_at + Duration::seconds(1);
        assert!(matches!(
            service.lookup_at(&fresh.workflow_id, later),
            ReceiptLookup::Expired
        ));
    }

    #[test]
    fn consume_is_single_use() {
        let service = service();
        let receipt = issue_pass(&service);
        let rid = receipt.workflow_id.clone();

        assert!(service.consume(&rid).is_ok());
        assert_eq!(
            service.consume(&rid),
            Err(ReceiptError::AlreadyConsumed(rid))
        );
    }

    #[test]
    fn expired_receipt_cannot_be_consumed() {
        let service = service();
        let receipt = issue_pass(&service);
        let rid = receipt.workflow_id.clone();
        let later = receipt.expires_at + Duration::seconds(1);

        assert_eq!(
            service.consume_at(&rid, later),
            Err(ReceiptError::Expired(rid))
        );
    }

    #[tokio::test]
    async fn concurrent_consumers_get_exactly_one_success() {
        let service = Arc::new(service());
        let receipt = issue_pass(&service);
        let rid = receipt.workflow_id.clone();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = service.clone();
            let rid = rid.clone();
            handles.push(tokio::spawn(async move { service.consume(&rid).is_ok() }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }

    #[test]
    fn purge_drops_only_expired_receipts() {
        let service = service();
        let old = issue_pass(&service);
        let _fresh = issue_pass(&service);

        let later = old.expires_at + Duration::seconds(1);
        // Both receipts share a TTL, so at `later` both are gone; check the
        // boundary just before instead.
        assert_eq!(service.purge_expired_at(old.expires_at - Duration::seconds(1)), 0);
        assert_eq!(service.purge_expired_at(later), 2);
        assert!(service.is_empty());
    }
}
