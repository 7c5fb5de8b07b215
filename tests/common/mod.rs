use std::sync::Arc;

use chainlog::audit::{AuditLog, Payload};
use chainlog::database::Database;
use chainlog::notify::NullNotifier;
use chainlog::toggle::StaticToggle;
use serde_json::Value;

/// Setup an in-memory SQLite database for testing
pub async fn setup_test_db() -> Database {
    let db = Database::new_in_memory()
        .await
        .expect("Failed to create test database");
    db.run_migrations().await.expect("Failed to run migrations");
    db
}

/// Build an AuditLog over the given database with a fixed toggle state
pub fn build_audit_log(db: Arc<Database>, enabled: bool) -> AuditLog {
    AuditLog::new(db, Arc::new(StaticToggle(enabled)), Arc::new(NullNotifier))
}

/// Payload from key/value pairs
pub fn payload_of(pairs: &[(&str, Value)]) -> Payload {
    let mut payload = Payload::new();
    for (key, value) in pairs {
        payload.insert((*key).to_string(), value.clone());
    }
    payload
}
