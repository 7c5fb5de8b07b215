use serde::{Deserialize, Serialize};
use std::env;

use crate::error::AuditError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub audit: AuditConfig,
}

/// Settings for the audit subsystem: the chained store, the file sink,
/// and the append serialization discipline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub enabled: bool,
    pub sink_dir: String,
    pub max_file_size: u64,
    pub lock_timeout_ms: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sink_dir: "logs/audit".to_string(),
            max_file_size: 10 * 1024 * 1024,
            lock_timeout_ms: 5_000,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, AuditError> {
        let database_url =
            env::var("AUDIT_DATABASE_URL").unwrap_or_else(|_| "sqlite://audit.db".to_string());

        let enabled = env::var("AUDIT_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .map_err(|e| AuditError::Config(format!("AUDIT_ENABLED: {}", e)))?;

        let sink_dir = env::var("AUDIT_SINK_DIR").unwrap_or_else(|_| "logs/audit".to_string());

        let max_file_size = env::var("AUDIT_MAX_FILE_SIZE")
            .unwrap_or_else(|_| (10 * 1024 * 1024).to_string())
            .parse()
            .map_err(|e| AuditError::Config(format!("AUDIT_MAX_FILE_SIZE: {}", e)))?;

        let lock_timeout_ms = env::var("AUDIT_LOCK_TIMEOUT_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .map_err(|e| AuditError::Config(format!("AUDIT_LOCK_TIMEOUT_MS: {}", e)))?;

        let config = AppConfig {
            database_url,
            audit: AuditConfig {
                enabled,
                sink_dir,
                max_file_size,
                lock_timeout_ms,
            },
        };
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AuditError> {
        if self.audit.max_file_size == 0 {
            return Err(AuditError::Config(
                "max_file_size must be greater than zero".to_string(),
            ));
        }
        if self.audit.lock_timeout_ms == 0 {
            return Err(AuditError::Config(
                "lock_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
