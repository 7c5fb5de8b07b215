//! Record Store
//!
//! Append-only persistence abstraction for chained audit records. The chain
//! tip is owned by the store; all mutation goes through the serialized
//! append path in [`crate::audit::log::AuditLog`].

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::audit::record::AuditRecord;
use crate::error::AuditError;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Hash of the most-recently appended record by append order, or `None`
    /// if the store holds no records. Reflects all appends completed before
    /// this call started.
    async fn tip_hash(&self) -> Result<Option<String>, AuditError>;

    /// Durably persist one record. A failed append is not part of the
    /// chain; no partial visibility.
    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError>;

    /// All records in append order. Verification and export only, not the
    /// hot append path.
    async fn fetch_all(&self) -> Result<Vec<AuditRecord>, AuditError>;
}

/// In-memory store for tests and embedders that do not need durability.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn tip_hash(&self) -> Result<Option<String>, AuditError> {
        let records = self.records.read().await;
        Ok(records.last().map(|r| r.hash.clone()))
    }

    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut records = self.records.write().await;
        records.push(record.clone());
        Ok(())
    }

    async fn fetch_all(&self) -> Result<Vec<AuditRecord>, AuditError> {
        let records = self.records.read().await;
        Ok(records.clone())
    }
}
