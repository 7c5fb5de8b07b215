//! Audit Log System
//!
//! Tamper-evident, append-only logging: records are linked through
//! cryptographic hash chains and verified by recomputing every link.

pub mod chain;
pub mod log;
pub mod record;
pub mod sink;
pub mod store;

pub use log::AuditLog;
pub use record::{AuditRecord, Payload};
pub use sink::{RotatingFileSink, SinkRecord};
pub use store::{MemoryRecordStore, RecordStore};
