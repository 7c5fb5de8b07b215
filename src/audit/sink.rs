//! Rotating File Sink
//!
//! A chained security log backed by a size-bounded append file. Rotation
//! moves the active file to a timestamped archive name; the hash chain is
//! tracked independently of which physical file is active, so the first
//! record after rotation still links to the last record of the archived
//! file. Writers sharing the directory are serialized by an exclusive lock
//! file held for the whole read-tip, compute, append sequence.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use fs2::FileExt;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audit::chain;
use crate::audit::record::now_seconds;
use crate::error::{AuditError, IntegrityViolation};
use crate::toggle::FeatureToggle;

const ACTIVE_FILENAME: &str = "audit.log";
const ARCHIVE_PREFIX: &str = "audit-";
const ARCHIVE_SUFFIX: &str = ".log";
const LOCK_FILENAME: &str = "audit.lock";
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(25);
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// One chained line of the sink file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SinkRecord {
    pub created_at: String,
    pub message: String,
    pub prev_hash: String,
    pub hash: String,
}

pub struct RotatingFileSink {
    dir: PathBuf,
    active_path: PathBuf,
    lock_path: PathBuf,
    max_size: u64,
    toggle: Arc<dyn FeatureToggle>,
    // Last hash written by this process; the authoritative tip is re-read
    // from disk under the file lock on every append.
    tip: Mutex<String>,
    hash_line: Regex,
    lock_timeout: Duration,
}

impl RotatingFileSink {
    pub fn new(
        dir: impl Into<PathBuf>,
        max_size: u64,
        toggle: Arc<dyn FeatureToggle>,
    ) -> Result<Self, AuditError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let hash_line = Regex::new(r#""hash"\s*:\s*"([0-9a-f]{64})""#)
            .map_err(|e| AuditError::Config(format!("hash pattern: {}", e)))?;

        let sink = Self {
            active_path: dir.join(ACTIVE_FILENAME),
            lock_path: dir.join(LOCK_FILENAME),
            dir,
            max_size,
            toggle,
            tip: Mutex::new(chain::EMPTY_TIP.to_string()),
            hash_line,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        };

        let recovered = sink.read_tip_from_disk()?;
        if recovered.is_empty() {
            let had_files = sink.active_path.exists() || !sink.archive_paths()?.is_empty();
            if had_files {
                warn!(
                    dir = %sink.dir.display(),
                    "existing audit files contain no chain tip, starting a new chain"
                );
            }
        } else {
            debug!(dir = %sink.dir.display(), tip = %recovered, "recovered sink chain tip");
        }
        *sink.tip.lock().map_err(|_| poisoned())? = recovered;

        Ok(sink)
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Append one message to the chained log, rotating first if the active
    /// file has reached the size threshold. No-op when the feature toggle
    /// is off. The whole read-tip, compute, write sequence runs under an
    /// exclusive cross-process file lock.
    pub fn append(&self, message: &str) -> Result<Option<SinkRecord>, AuditError> {
        if !self.toggle.audit_enabled() {
            return Ok(None);
        }

        let mut cached_tip = self.tip.lock().map_err(|_| poisoned())?;
        let _file_lock = FileLock::acquire(&self.lock_path, self.lock_timeout)?;

        self.rotate_if_needed()?;

        // Another process may have appended since our last write; the tip
        // on disk wins over the cached one.
        let tip = self.read_tip_from_disk()?;

        let created_at = now_seconds().to_rfc3339();
        let hash = chain::compute_line(&tip, &created_at, message);
        let record = SinkRecord {
            created_at,
            message: message.to_string(),
            prev_hash: tip,
            hash,
        };

        let json = serde_json::to_string(&record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.active_path)?;
        writeln!(file, "{}", json)?;
        file.flush()?;

        *cached_tip = record.hash.clone();
        Ok(Some(record))
    }

    /// Last hash written by this sink instance.
    pub fn tip(&self) -> Result<String, AuditError> {
        Ok(self.tip.lock().map_err(|_| poisoned())?.clone())
    }

    /// Verify the chain across every archive (oldest first) and the active
    /// file. Returns the number of records checked, or the first violation.
    pub fn verify(&self) -> Result<usize, AuditError> {
        let _file_lock = FileLock::acquire(&self.lock_path, self.lock_timeout)?;

        let mut files = self.archive_paths()?;
        files.push(self.active_path.clone());

        let mut expected_prev = chain::EMPTY_TIP.to_string();
        let mut checked = 0;

        for path in files {
            if !path.exists() {
                continue;
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let reader = BufReader::new(File::open(&path)?);
            for (line_no, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let at = format!("{}:{}", name, line_no + 1);

                let record: SinkRecord = serde_json::from_str(&line).map_err(|e| {
                    AuditError::Storage(format!("unparseable sink line {}: {}", at, e))
                })?;

                if record.prev_hash != expected_prev {
                    return Err(AuditError::Integrity(IntegrityViolation {
                        at_record_id: at,
                        expected_prev_hash: expected_prev,
                        found_prev_hash: record.prev_hash,
                        detail: "prev_hash does not match the preceding line".to_string(),
                    }));
                }

                let recomputed =
                    chain::compute_line(&expected_prev, &record.created_at, &record.message);
                if recomputed != record.hash {
                    return Err(AuditError::Integrity(IntegrityViolation {
                        at_record_id: at,
                        expected_prev_hash: recomputed,
                        found_prev_hash: record.hash,
                        detail: "stored hash does not match recomputed hash".to_string(),
                    }));
                }

                expected_prev = record.hash;
                checked += 1;
            }
        }

        Ok(checked)
    }

    /// The chain tip as recorded on disk: the last hash-bearing line of the
    /// active file, else of the most recent archive, else empty (first-ever
    /// startup).
    fn read_tip_from_disk(&self) -> Result<String, AuditError> {
        if let Some(hash) = self.last_chain_hash(&self.active_path)? {
            return Ok(hash);
        }
        for archive in self.archive_paths()?.iter().rev() {
            if let Some(hash) = self.last_chain_hash(archive)? {
                return Ok(hash);
            }
        }
        Ok(chain::EMPTY_TIP.to_string())
    }

    fn last_chain_hash(&self, path: &Path) -> Result<Option<String>, AuditError> {
        if !path.exists() {
            return Ok(None);
        }
        let reader = BufReader::new(File::open(path)?);
        let mut last = None;
        for line in reader.lines() {
            let line = line?;
            if let Some(caps) = self.hash_line.captures(&line) {
                last = Some(caps[1].to_string());
            }
        }
        Ok(last)
    }

    /// Archive files, oldest first.
    fn archive_paths(&self) -> Result<Vec<PathBuf>, AuditError> {
        let mut archives = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(ARCHIVE_PREFIX) && name.ends_with(ARCHIVE_SUFFIX) {
                archives.push(entry.path());
            }
        }
        archives.sort_by_key(|path| archive_order(path));
        Ok(archives)
    }

    fn rotate_if_needed(&self) -> Result<(), AuditError> {
        let metadata = match fs::metadata(&self.active_path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if metadata.len() < self.max_size {
            return Ok(());
        }

        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        let mut archive_path = self
            .dir
            .join(format!("{}{}{}", ARCHIVE_PREFIX, stamp, ARCHIVE_SUFFIX));
        let mut n = 1;
        while archive_path.exists() {
            archive_path = self
                .dir
                .join(format!("{}{}-{}{}", ARCHIVE_PREFIX, stamp, n, ARCHIVE_SUFFIX));
            n += 1;
        }

        fs::rename(&self.active_path, &archive_path)?;
        info!(archived_to = %archive_path.display(), "audit sink rotated");
        Ok(())
    }
}

/// Ordering key for archive names: the bare stamp precedes its same-second
/// numeric-suffix successors, which a plain lexicographic sort gets wrong.
fn archive_order(path: &Path) -> (String, u32) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let core = name
        .strip_prefix(ARCHIVE_PREFIX)
        .and_then(|s| s.strip_suffix(ARCHIVE_SUFFIX))
        .unwrap_or("");
    match core.split_once('-') {
        Some((stamp, n)) => (stamp.to_string(), n.parse().unwrap_or(u32::MAX)),
        None => (core.to_string(), 0),
    }
}

fn poisoned() -> AuditError {
    AuditError::Storage("sink state lock poisoned".to_string())
}

/// Exclusive cross-process lock, released on drop.
struct FileLock {
    file: File,
}

impl FileLock {
    fn acquire(path: &Path, lock_timeout: Duration) -> Result<Self, AuditError> {
        let file = OpenOptions::new().create(true).write(true).open(path)?;
        let deadline = Instant::now() + lock_timeout;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(Self { file }),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(AuditError::LockTimeout(format!(
                            "file lock on {} not acquired within {}ms",
                            path.display(),
                            lock_timeout.as_millis()
                        )));
                    }
                    std::thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("failed to release sink lock file: {}", e);
        }
    }
}
