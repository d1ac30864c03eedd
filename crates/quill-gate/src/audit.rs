use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use quill_types::{Decision, WorkflowId};

use crate::context::{DecisionBundle, StageRecord};
use crate::error::AuditError;

/// One immutable audit row: a stage result, a decision, or the terminal
/// bundle. Rows are keyed by workflow id and never updated or deleted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: uuid::Uuid,
    pub workflow_id: WorkflowId,
    pub stage: String,
    pub payload: Value,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    fn new(workflow_id: WorkflowId, stage: impl Into<String>, payload: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            workflow_id,
            stage: stage.into(),
            payload,
            recorded_at: Utc::now(),
        }
    }
}

/// Append-only audit persistence.
///
/// The store is provisioned ahead of time; implementations must not create
/// storage structure on the request path. No update or delete operations
/// exist on this trait.
pub trait AuditStore: Send + Sync {
    fn append(&self, record: AuditRecord) -> Result<(), AuditError>;

    fn records_for(&self, workflow_id: &WorkflowId) -> Result<Vec<AuditRecord>, AuditError>;

    fn count(&self) -> Result<usize, AuditError>;
}

/// In-memory append-only audit store.
#[derive(Default)]
pub struct InMemoryAuditStore {
    rows: RwLock<Vec<AuditRecord>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditStore for InMemoryAuditStore {
    fn append(&self, record: AuditRecord) -> Result<(), AuditError> {
        let mut rows = self.rows.write().map_err(|_| AuditError::Lock)?;
        rows.push(record);
        Ok(())
    }

    fn records_for(&self, workflow_id: &WorkflowId) -> Result<Vec<AuditRecord>, AuditError> {
        let rows = self.rows.read().map_err(|_| AuditError::Lock)?;
        Ok(rows
            .iter()
            .filter(|r| r.workflow_id == *workflow_id)
            .cloned()
            .collect())
    }

    fn count(&self) -> Result<usize, AuditError> {
        let rows = self.rows.read().map_err(|_| AuditError::Lock)?;
        Ok(rows.len())
    }
}

/// Records every stage result and decision for a workflow.
#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    pub fn record_stage(
        &self,
        workflow_id: &WorkflowId,
        record: &StageRecord,
    ) -> Result<(), AuditError> {
        let payload = serde_json::to_value(record)
            .map_err(|e| AuditError::WriteFailed(e.to_string()))?;
        self.store
            .append(AuditRecord::new(workflow_id.clone(), record.stage.clone(), payload))
    }

    pub fn record_decision(
        &self,
        workflow_id: &WorkflowId,
        decision: &Decision,
    ) -> Result<(), AuditError> {
        let payload = serde_json::to_value(decision)
            .map_err(|e| AuditError::WriteFailed(e.to_string()))?;
        self.store
            .append(AuditRecord::new(workflow_id.clone(), "decision", payload))
    }

    /// Terminal emission of the full bundle.
    pub fn record_bundle(&self, bundle: &DecisionBundle) -> Result<(), AuditError> {
        let payload = serde_json::to_value(bundle)
            .map_err(|e| AuditError::WriteFailed(e.to_string()))?;
        self.store
            .append(AuditRecord::new(bundle.workflow_id.clone(), "bundle", payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{StageStatus, StageRecord};

    fn stage_record(stage: &str) -> StageRecord {
        StageRecord {
            stage: stage.into(),
            status: StageStatus::Completed,
            summary: "ok".into(),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn appends_and_reads_back_by_workflow() {
        let store = Arc::new(InMemoryAuditStore::new());
        let recorder = AuditRecorder::new(store.clone());
        let wid = WorkflowId::new();
        let other = WorkflowId::new();

        recorder.record_stage(&wid, &stage_record("strategy")).unwrap();
        recorder.record_stage(&wid, &stage_record("writer")).unwrap();
        recorder.record_stage(&other, &stage_record("strategy")).unwrap();

        assert_eq!(store.count().unwrap(), 3);
        assert_eq!(store.records_for(&wid).unwrap().len(), 2);
    }

    #[test]
    fn decision_rows_carry_the_canonical_payload() {
        let store = Arc::new(InMemoryAuditStore::new());
        let recorder = AuditRecorder::new(store.clone());
        let wid = WorkflowId::new();

        recorder
            .record_decision(&wid, &Decision::pass())
            .unwrap();

        let rows = store.records_for(&wid).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].stage, "decision");
        assert_eq!(rows[0].payload["status"], "PASS");
    }

    #[test]
    fn store_has_no_update_or_delete() {
        // The only mutation on AuditStore is append(). This test documents
        // the invariant; the trait surface enforces it.
        let store = InMemoryAuditStore::new();
        store
            .append(AuditRecord::new(WorkflowId::new(), "strategy", Value::Null))
            .unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }
}
