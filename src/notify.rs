//! Observability boundary.
//!
//! The audit core emits `(severity, message, context)` tuples here after a
//! successful append. Calls are fire-and-forget: a notifier must never fail
//! the append that triggered it, so the trait is infallible by construction.
//! Informational records written through this boundary are not part of the
//! hash chain.

use serde_json::Value;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, severity: Severity, message: &str, context: &Value);
}

/// Default notifier forwarding to the `tracing` subscriber.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, severity: Severity, message: &str, context: &Value) {
        match severity {
            Severity::Debug => debug!(context = %context, "{}", message),
            Severity::Info => info!(context = %context, "{}", message),
            Severity::Warning => warn!(context = %context, "{}", message),
            Severity::Error => error!(context = %context, "{}", message),
        }
    }
}

/// Discards everything; for tests and embedders without a subscriber.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _severity: Severity, _message: &str, _context: &Value) {}
}
