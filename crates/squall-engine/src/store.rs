use crate::{ExecutionRecord, StoreError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Persistence seam for finalized execution records.
///
/// Called exactly once per execution, at finalize. Failures are logged and
/// swallowed; the record stays readable in memory for the retention window.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn persist(&self, record: &ExecutionRecord) -> Result<(), StoreError>;
}

pub type SharedRecordStore = Arc<dyn RecordStore>;

/// In-memory store, keyed by execution id. Backs tests and local runs.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<BTreeMap<String, ExecutionRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, execution_id: &str) -> Option<ExecutionRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(execution_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn persist(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(record.execution_id.clone(), record.clone());
        Ok(())
    }
}
