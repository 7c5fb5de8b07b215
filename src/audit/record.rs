//! Audit Record
//!
//! The unit of the tamper-evident chain: immutable once appended, linked to
//! its predecessor through `prev_hash`.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::audit::chain;

/// String-keyed structured payload. `serde_json`'s map keeps keys sorted,
/// so serializing it yields a canonical, injective byte form for hashing.
pub type Payload = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    pub id: String,
    pub actor_id: Option<String>,
    pub action: String,
    pub payload: Payload,
    pub created_at: DateTime<Utc>,
    pub origin: Option<String>,
    pub prev_hash: String,
    pub hash: String,
}

impl AuditRecord {
    /// Build a record chained onto `prev_hash`, with a fresh id and the
    /// current timestamp. The hash covers exactly the stored field forms.
    pub fn new(
        actor_id: Option<String>,
        action: String,
        payload: Payload,
        origin: Option<String>,
        prev_hash: String,
    ) -> Self {
        let created_at = now_seconds();

        let mut record = Self {
            id: Uuid::new_v4().to_string(),
            actor_id,
            action,
            payload,
            created_at,
            origin,
            prev_hash,
            hash: String::new(),
        };
        record.hash = chain::compute(
            &record.prev_hash,
            record.actor_id.as_deref(),
            &record.action,
            &record.payload_canonical(),
            &record.created_at.to_rfc3339(),
            record.origin.as_deref(),
        );
        record
    }

    /// Canonical serialized form of the payload, the exact bytes the chain
    /// hash covers.
    pub fn payload_canonical(&self) -> String {
        Value::Object(self.payload.clone()).to_string()
    }

    /// Recompute this record's hash from its own fields.
    pub fn verify_hash(&self) -> bool {
        chain::verify_pair(&self.prev_hash, self)
    }
}

/// Current time truncated to whole seconds, so the stored RFC 3339 text
/// round-trips exactly through the database.
pub fn now_seconds() -> DateTime<Utc> {
    let now = Utc::now();
    now.with_nanosecond(0).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_payload() -> Payload {
        let mut payload = Payload::new();
        payload.insert("attempts".to_string(), json!(3));
        payload.insert("method".to_string(), json!("password"));
        payload
    }

    #[test]
    fn test_record_creation_self_verifies() {
        let record = AuditRecord::new(
            Some("u1".to_string()),
            "login.failed".to_string(),
            sample_payload(),
            Some("1.2.3.4".to_string()),
            chain::EMPTY_TIP.to_string(),
        );

        assert_eq!(record.prev_hash, "");
        assert_eq!(record.hash.len(), chain::HASH_HEX_LEN);
        assert!(record.verify_hash());
        assert_eq!(record.created_at.timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn test_payload_canonical_is_key_sorted() {
        let mut payload = Payload::new();
        payload.insert("zebra".to_string(), json!(1));
        payload.insert("alpha".to_string(), json!(2));

        let record = AuditRecord::new(
            None,
            "test".to_string(),
            payload,
            None,
            chain::EMPTY_TIP.to_string(),
        );

        let canonical = record.payload_canonical();
        let alpha = canonical.find("alpha").unwrap();
        let zebra = canonical.find("zebra").unwrap();
        assert!(alpha < zebra);
    }

    #[test]
    fn test_mutated_record_fails_self_verification() {
        let mut record = AuditRecord::new(
            Some("u1".to_string()),
            "login".to_string(),
            sample_payload(),
            None,
            chain::EMPTY_TIP.to_string(),
        );
        assert!(record.verify_hash());

        record.action = "logout".to_string();
        assert!(!record.verify_hash());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = AuditRecord::new(None, "a".to_string(), Payload::new(), None, String::new());
        let b = AuditRecord::new(None, "a".to_string(), Payload::new(), None, String::new());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_serde_round_trip_preserves_hash() {
        let record = AuditRecord::new(
            Some("u1".to_string()),
            "login".to_string(),
            sample_payload(),
            Some("1.2.3.4".to_string()),
            chain::EMPTY_TIP.to_string(),
        );

        let json = serde_json::to_string(&record).unwrap();
        let back: AuditRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert!(back.verify_hash());
    }
}
