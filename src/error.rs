use std::fmt;

use thiserror::Error;

impl From<serde_json::Error> for AuditError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("JSON serialization error: {}", err))
    }
}

impl From<sqlx::Error> for AuditError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(format!("Database error: {}", err))
    }
}

impl From<std::io::Error> for AuditError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(format!("I/O error: {}", err))
    }
}

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Integrity violation: {0}")]
    Integrity(IntegrityViolation),

    #[error("Lock timeout: {0}")]
    LockTimeout(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// First offending record found by a verification walk.
///
/// Never auto-repaired; surfaced for manual investigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityViolation {
    pub at_record_id: String,
    pub expected_prev_hash: String,
    pub found_prev_hash: String,
    pub detail: String,
}

impl fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "record {}: {} (expected {}, found {})",
            self.at_record_id, self.detail, self.expected_prev_hash, self.found_prev_hash
        )
    }
}
