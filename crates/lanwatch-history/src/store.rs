//! Liveness ledger storage: the store trait plus in-memory and file-backed implementations.
//!
//! The file-backed store keeps one JSON-lines ledger per host:
//! ```text
//! {root}/
//!   {host_id}.jsonl
//! ```
//! Append and prune run under a per-host lock, so writes to different hosts
//! never contend. The lock also caches the ledger's line count, so an append
//! only reads the ledger back when it has grown past capacity.

use std::collections::{HashMap, VecDeque};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use lanwatch_core::{HostId, HostStatus, LivenessRecord};

use crate::uptime::{uptime_percentage, window_start};
use crate::MAX_RECORDS_PER_HOST;

/// Errors that can occur during history storage operations.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("History lock poisoned for host {0}")]
    Poisoned(HostId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Trait for liveness ledger backends.
pub trait HistoryStore: Send + Sync {
    /// Append a record stamped now, then prune the host to the newest
    /// [`MAX_RECORDS_PER_HOST`]. Prune failures are logged, not returned.
    fn append(
        &self,
        host_id: HostId,
        status: HostStatus,
        latency_ms: Option<f64>,
    ) -> Result<LivenessRecord, HistoryError>;

    /// Records observed at or after `since`, oldest first.
    fn records_since(
        &self,
        host_id: HostId,
        since: DateTime<Utc>,
    ) -> Result<Vec<LivenessRecord>, HistoryError>;

    /// The newest `limit` records, newest first.
    fn recent(&self, host_id: HostId, limit: usize) -> Result<Vec<LivenessRecord>, HistoryError>;

    /// Percentage of records online in the trailing `window`; 100.0 with no data.
    fn rolling_uptime(&self, host_id: HostId, window: Duration) -> Result<f64, HistoryError> {
        let now = Utc::now();
        let records = self.records_since(host_id, window_start(now, window))?;
        Ok(uptime_percentage(&records, now, window))
    }
}

fn new_record(host_id: HostId, status: HostStatus, latency_ms: Option<f64>) -> LivenessRecord {
    LivenessRecord {
        host_id,
        status,
        observed_at: Utc::now(),
        latency_ms,
    }
}

// ── In-memory ────────────────────────────────────────────────────

/// Ledger held in process memory.
pub struct MemoryHistoryStore {
    hosts: Mutex<HashMap<HostId, VecDeque<LivenessRecord>>>,
    max_records: usize,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::with_capacity(MAX_RECORDS_PER_HOST)
    }

    /// A store retaining `max_records` per host.
    pub fn with_capacity(max_records: usize) -> Self {
        Self {
            hosts: Mutex::new(HashMap::new()),
            max_records: max_records.max(1),
        }
    }

    /// Insert a record with an explicit timestamp. Used to replay history.
    pub fn insert(&self, record: LivenessRecord) -> Result<(), HistoryError> {
        let host_id = record.host_id;
        let mut hosts = self
            .hosts
            .lock()
            .map_err(|_| HistoryError::Poisoned(host_id))?;
        let ledger = hosts.entry(host_id).or_default();
        ledger.push_back(record);
        while ledger.len() > self.max_records {
            ledger.pop_front();
        }
        Ok(())
    }
}

impl Default for MemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn append(
        &self,
        host_id: HostId,
        status: HostStatus,
        latency_ms: Option<f64>,
    ) -> Result<LivenessRecord, HistoryError> {
        let record = new_record(host_id, status, latency_ms);
        self.insert(record.clone())?;
        Ok(record)
    }

    fn records_since(
        &self,
        host_id: HostId,
        since: DateTime<Utc>,
    ) -> Result<Vec<LivenessRecord>, HistoryError> {
        let hosts = self
            .hosts
            .lock()
            .map_err(|_| HistoryError::Poisoned(host_id))?;
        Ok(hosts
            .get(&host_id)
            .map(|ledger| {
                ledger
                    .iter()
                    .filter(|r| r.observed_at >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn recent(&self, host_id: HostId, limit: usize) -> Result<Vec<LivenessRecord>, HistoryError> {
        let hosts = self
            .hosts
            .lock()
            .map_err(|_| HistoryError::Poisoned(host_id))?;
        Ok(hosts
            .get(&host_id)
            .map(|ledger| ledger.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

// ── File-backed ──────────────────────────────────────────────────

/// File-system backed ledger, one JSON-lines file per host.
pub struct FileHistoryStore {
    root: PathBuf,
    max_records: usize,
    /// Per-host lock guarding the cached ledger line count (`None` until
    /// first counted).
    locks: Mutex<HashMap<HostId, Arc<Mutex<Option<usize>>>>>,
}

impl FileHistoryStore {
    /// Create a new store rooted at the given directory.
    /// Creates the directory if it doesn't exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        Self::with_capacity(root, MAX_RECORDS_PER_HOST)
    }

    pub fn with_capacity(root: impl Into<PathBuf>, max_records: usize) -> Result<Self, HistoryError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            max_records: max_records.max(1),
            locks: Mutex::new(HashMap::new()),
        })
    }

    fn ledger_path(&self, host_id: HostId) -> PathBuf {
        self.root.join(format!("{}.jsonl", host_id.0))
    }

    fn host_lock(&self, host_id: HostId) -> Result<Arc<Mutex<Option<usize>>>, HistoryError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| HistoryError::Poisoned(host_id))?;
        Ok(locks.entry(host_id).or_default().clone())
    }

    /// Read every parseable record for a host, oldest first.
    /// Unparseable lines are skipped.
    fn read_ledger(&self, host_id: HostId) -> Result<Vec<LivenessRecord>, HistoryError> {
        let path = self.ledger_path(host_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&path)?;
        let mut records = Vec::new();
        for (line_no, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LivenessRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(
                    host_id = %host_id,
                    line = line_no + 1,
                    error = %e,
                    "Skipping unreadable liveness record"
                ),
            }
        }
        Ok(records)
    }

    /// Lines currently in the ledger, corrupt ones included.
    fn count_lines(&self, host_id: HostId) -> Result<usize, HistoryError> {
        let path = self.ledger_path(host_id);
        if !path.exists() {
            return Ok(0);
        }
        let contents = fs::read_to_string(&path)?;
        Ok(contents.lines().filter(|l| !l.trim().is_empty()).count())
    }

    /// Rewrite the ledger keeping only the newest `max_records`.
    /// Returns `(dropped, kept)`.
    fn prune(&self, host_id: HostId) -> Result<(usize, usize), HistoryError> {
        let records = self.read_ledger(host_id)?;
        if records.len() <= self.max_records {
            return Ok((0, records.len()));
        }

        let dropped = records.len() - self.max_records;
        let mut buf = String::new();
        for record in &records[dropped..] {
            buf.push_str(&serde_json::to_string(record)?);
            buf.push('\n');
        }

        let path = self.ledger_path(host_id);
        let tmp = path.with_extension("jsonl.tmp");
        fs::write(&tmp, buf)?;
        fs::rename(&tmp, &path)?;
        Ok((dropped, self.max_records))
    }
}

impl HistoryStore for FileHistoryStore {
    fn append(
        &self,
        host_id: HostId,
        status: HostStatus,
        latency_ms: Option<f64>,
    ) -> Result<LivenessRecord, HistoryError> {
        let lock = self.host_lock(host_id)?;
        let mut lines = lock.lock().map_err(|_| HistoryError::Poisoned(host_id))?;
        let count = match *lines {
            Some(n) => n,
            None => self.count_lines(host_id)?,
        };

        let record = new_record(host_id, status, latency_ms);
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.ledger_path(host_id))?;
        file.write_all(line.as_bytes())?;
        *lines = Some(count + 1);

        if count + 1 > self.max_records {
            match self.prune(host_id) {
                Ok((dropped, kept)) => {
                    *lines = Some(kept);
                    if dropped > 0 {
                        tracing::debug!(host_id = %host_id, dropped, "Pruned liveness ledger");
                    }
                }
                Err(e) => tracing::warn!(host_id = %host_id, error = %e, "Failed to prune liveness ledger"),
            }
        }

        Ok(record)
    }

    fn records_since(
        &self,
        host_id: HostId,
        since: DateTime<Utc>,
    ) -> Result<Vec<LivenessRecord>, HistoryError> {
        let lock = self.host_lock(host_id)?;
        let _guard = lock.lock().map_err(|_| HistoryError::Poisoned(host_id))?;

        let mut records = self.read_ledger(host_id)?;
        records.retain(|r| r.observed_at >= since);
        Ok(records)
    }

    fn recent(&self, host_id: HostId, limit: usize) -> Result<Vec<LivenessRecord>, HistoryError> {
        let lock = self.host_lock(host_id)?;
        let _guard = lock.lock().map_err(|_| HistoryError::Poisoned(host_id))?;

        let records = self.read_ledger(host_id)?;
        Ok(records.into_iter().rev().take(limit).collect())
    }
}
