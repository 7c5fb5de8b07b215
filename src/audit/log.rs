//! Audit Log
//!
//! Orchestrates the record store and the hash chain: owns the chain-tip
//! concept and the append critical section, and exposes full-chain
//! integrity verification.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::audit::chain;
use crate::audit::record::{AuditRecord, Payload};
use crate::audit::store::RecordStore;
use crate::error::{AuditError, IntegrityViolation};
use crate::notify::{Notifier, Severity};
use crate::toggle::FeatureToggle;

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

pub struct AuditLog {
    store: Arc<dyn RecordStore>,
    toggle: Arc<dyn FeatureToggle>,
    notifier: Arc<dyn Notifier>,
    // Serializes read-tip -> compute -> write. Two appenders racing past
    // this lock could chain onto the same stale tip and fork the chain.
    append_lock: Mutex<()>,
    lock_timeout: Duration,
}

impl AuditLog {
    pub fn new(
        store: Arc<dyn RecordStore>,
        toggle: Arc<dyn FeatureToggle>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            toggle,
            notifier,
            append_lock: Mutex::new(()),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Append one event to the chain.
    ///
    /// Returns the appended record, or `None` when audit writing is
    /// disabled by the feature toggle (a no-op that leaves the tip
    /// untouched). A timed-out lock acquisition aborts with no partial
    /// write.
    pub async fn append(
        &self,
        actor_id: Option<&str>,
        action: &str,
        payload: Payload,
        origin: Option<&str>,
    ) -> Result<Option<AuditRecord>, AuditError> {
        if !self.toggle.audit_enabled() {
            return Ok(None);
        }

        let _guard = timeout(self.lock_timeout, self.append_lock.lock())
            .await
            .map_err(|_| {
                AuditError::LockTimeout(format!(
                    "append lock not acquired within {}ms",
                    self.lock_timeout.as_millis()
                ))
            })?;

        let tip = self
            .store
            .tip_hash()
            .await?
            .unwrap_or_else(|| chain::EMPTY_TIP.to_string());

        let record = AuditRecord::new(
            actor_id.map(str::to_string),
            action.to_string(),
            payload,
            origin.map(str::to_string),
            tip,
        );
        self.store.append(&record).await?;

        // Fire-and-forget; a notifier must never fail the append.
        self.notifier.notify(
            Severity::Info,
            "audit.appended",
            &json!({ "id": record.id, "action": record.action }),
        );

        Ok(Some(record))
    }

    /// Walk the full store in append order and check every record against
    /// the chain. Returns the number of records checked, or the first
    /// violation found.
    pub async fn verify_integrity(&self) -> Result<usize, AuditError> {
        let records = self.store.fetch_all().await?;

        let mut expected_prev = chain::EMPTY_TIP.to_string();
        let mut last_created_at: Option<DateTime<Utc>> = None;

        for record in &records {
            if record.prev_hash != expected_prev {
                return Err(AuditError::Integrity(IntegrityViolation {
                    at_record_id: record.id.clone(),
                    expected_prev_hash: expected_prev,
                    found_prev_hash: record.prev_hash.clone(),
                    detail: "prev_hash does not match the preceding record".to_string(),
                }));
            }

            if !chain::verify_pair(&expected_prev, record) {
                let recomputed = chain::compute(
                    &expected_prev,
                    record.actor_id.as_deref(),
                    &record.action,
                    &record.payload_canonical(),
                    &record.created_at.to_rfc3339(),
                    record.origin.as_deref(),
                );
                return Err(AuditError::Integrity(IntegrityViolation {
                    at_record_id: record.id.clone(),
                    expected_prev_hash: recomputed,
                    found_prev_hash: record.hash.clone(),
                    detail: "stored hash does not match recomputed hash".to_string(),
                }));
            }

            if let Some(prev_ts) = last_created_at {
                if record.created_at < prev_ts {
                    return Err(AuditError::Integrity(IntegrityViolation {
                        at_record_id: record.id.clone(),
                        expected_prev_hash: expected_prev,
                        found_prev_hash: record.prev_hash.clone(),
                        detail: format!(
                            "created_at went backwards: {} < {}",
                            record.created_at.to_rfc3339(),
                            prev_ts.to_rfc3339()
                        ),
                    }));
                }
            }

            expected_prev = record.hash.clone();
            last_created_at = Some(record.created_at);
        }

        Ok(records.len())
    }
}
