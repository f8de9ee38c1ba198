// logger.rs — Per-plan, hash-chained JSONL audit logger.
//
// Each plan gets its own append-only `<plan_id>.jsonl`. Appending reads the
// chain head from the file (every line, not a seek to the end), seals the
// new event against it, writes one line, then mirrors the event into the
// store. Appends for the same plan are serialized through a lock picked by
// hashing the plan id into a fixed set of shards, so two writers never link
// to the same head.

use std::collections::hash_map::DefaultHasher;
use std::fs::{File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::AuditError;
use crate::event::{AuditEvent, AuditEventType, OpMeta, GENESIS};

/// Number of append locks shared by all plans.
const LOCK_SHARDS: usize = 32;

/// One event hash as the mirror recorded it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirroredHash {
    pub event_id: String,
    pub prev_hash: String,
    pub event_hash: String,
}

/// The queryable second sink for audit events.
///
/// Implemented by the durable store. `record_event` must store the event
/// exactly as given; `mirrored_hashes` returns what was stored for a plan in
/// insertion order.
pub trait AuditMirror: Send + Sync {
    fn record_event(&self, event: &AuditEvent, op: Option<&OpMeta>) -> Result<(), AuditError>;

    fn mirrored_hashes(&self, plan_id: &str) -> Result<Vec<MirroredHash>, AuditError>;
}

/// Outcome of a successful chain verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    pub plan_id: String,
    pub events: usize,
    /// Hash of the last event, or `GENESIS` for an empty log.
    pub head: String,
    /// Whether the mirror was compared as well.
    pub mirror_checked: bool,
}

/// Appends and verifies per-plan audit chains.
pub struct AuditLogger {
    jsonl_dir: PathBuf,
    mirror: Option<Arc<dyn AuditMirror>>,
    plan_locks: Vec<Mutex<()>>,
}

impl AuditLogger {
    pub fn new(jsonl_dir: impl Into<PathBuf>, mirror: Option<Arc<dyn AuditMirror>>) -> Self {
        Self {
            jsonl_dir: jsonl_dir.into(),
            mirror,
            plan_locks: (0..LOCK_SHARDS).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn jsonl_dir(&self) -> &Path {
        &self.jsonl_dir
    }

    /// Path of a plan's log file. The plan id is checked first because it
    /// becomes a file name.
    pub fn jsonl_path_for(&self, plan_id: &str) -> Result<PathBuf, AuditError> {
        check_plan_id(plan_id)?;
        Ok(self.jsonl_dir.join(format!("{}.jsonl", plan_id)))
    }

    /// Hash of the last event for `plan_id`, or `GENESIS` when the log is
    /// missing or empty. Reads every line.
    pub fn last_hash_for(&self, plan_id: &str) -> Result<String, AuditError> {
        let path = self.jsonl_path_for(plan_id)?;
        if !path.exists() {
            return Ok(GENESIS.to_string());
        }

        let file = File::open(&path).map_err(|source| AuditError::OpenFailed {
            path: path.clone(),
            source,
        })?;
        let mut last_line: Option<String> = None;
        for line in BufReader::new(file).lines() {
            let line = line?;
            if !line.trim().is_empty() {
                last_line = Some(line);
            }
        }

        match last_line {
            Some(line) => {
                let event: AuditEvent = serde_json::from_str(&line)?;
                Ok(event.event_hash)
            }
            None => Ok(GENESIS.to_string()),
        }
    }

    /// Seal and append one event, then mirror it.
    pub fn append(
        &self,
        plan_id: &str,
        event_type: AuditEventType,
        status: &str,
        payload: serde_json::Value,
        op: Option<&OpMeta>,
    ) -> Result<AuditEvent, AuditError> {
        let path = self.jsonl_path_for(plan_id)?;
        let _guard = self.lock_for(plan_id).lock().unwrap_or_else(|e| e.into_inner());

        let prev_hash = self.last_hash_for(plan_id)?;
        let event = AuditEvent::new(plan_id, event_type, status, payload, prev_hash);
        let line = serde_json::to_string(&event)?;

        std::fs::create_dir_all(&self.jsonl_dir).map_err(|source| AuditError::OpenFailed {
            path: self.jsonl_dir.clone(),
            source,
        })?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| AuditError::OpenFailed {
                path: path.clone(),
                source,
            })?;
        writeln!(file, "{}", line)?;
        file.flush()?;
        file.sync_data()?;

        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.record_event(&event, op) {
                tracing::error!(
                    plan_id = %plan_id,
                    event_id = %event.event_id,
                    error = %e,
                    "audit mirror write failed after file append; sinks have diverged"
                );
                return Err(AuditError::ConsistencyFault {
                    plan_id: plan_id.to_string(),
                    event_id: event.event_id.clone(),
                    reason: e.to_string(),
                });
            }
        }

        tracing::debug!(
            plan_id = %plan_id,
            event_type = %event.event_type,
            event_hash = %event.event_hash,
            "audit event appended"
        );
        Ok(event)
    }

    /// Every event for a plan, oldest first. A missing log is empty.
    pub fn read_events(&self, plan_id: &str) -> Result<Vec<AuditEvent>, AuditError> {
        let path = self.jsonl_path_for(plan_id)?;
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&path).map_err(|source| AuditError::OpenFailed {
            path: path.clone(),
            source,
        })?;

        let mut events = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(&line)?);
        }
        Ok(events)
    }

    /// Recompute every hash, check every link from `GENESIS`, then compare
    /// against the mirror when one is attached.
    pub fn verify_chain(&self, plan_id: &str) -> Result<ChainReport, AuditError> {
        let events = self.read_events(plan_id)?;
        let mut expected_prev = GENESIS.to_string();

        for (index, event) in events.iter().enumerate() {
            let line = index + 1;
            if event.plan_id != plan_id {
                return Err(AuditError::IntegrityViolation {
                    line,
                    expected: plan_id.to_string(),
                    actual: event.plan_id.clone(),
                });
            }
            if event.prev_hash != expected_prev {
                return Err(AuditError::IntegrityViolation {
                    line,
                    expected: expected_prev,
                    actual: event.prev_hash.clone(),
                });
            }
            let recomputed = event.compute_hash();
            if recomputed != event.event_hash {
                return Err(AuditError::IntegrityViolation {
                    line,
                    expected: recomputed,
                    actual: event.event_hash.clone(),
                });
            }
            expected_prev = event.event_hash.clone();
        }

        let mirror_checked = match &self.mirror {
            Some(mirror) => {
                let mirrored = mirror.mirrored_hashes(plan_id)?;
                compare_with_mirror(&events, &mirrored)?;
                true
            }
            None => false,
        };

        Ok(ChainReport {
            plan_id: plan_id.to_string(),
            events: events.len(),
            head: expected_prev,
            mirror_checked,
        })
    }

    fn lock_for(&self, plan_id: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        plan_id.hash(&mut hasher);
        &self.plan_locks[(hasher.finish() as usize) % self.plan_locks.len()]
    }
}

fn compare_with_mirror(events: &[AuditEvent], mirrored: &[MirroredHash]) -> Result<(), AuditError> {
    for (index, event) in events.iter().enumerate() {
        let line = index + 1;
        let Some(row) = mirrored.get(index) else {
            return Err(AuditError::IntegrityViolation {
                line,
                expected: event.event_hash.clone(),
                actual: "missing from mirror".to_string(),
            });
        };
        if row.event_id != event.event_id || row.event_hash != event.event_hash || row.prev_hash != event.prev_hash {
            return Err(AuditError::IntegrityViolation {
                line,
                expected: event.event_hash.clone(),
                actual: row.event_hash.clone(),
            });
        }
    }
    if mirrored.len() > events.len() {
        let extra = &mirrored[events.len()];
        return Err(AuditError::IntegrityViolation {
            line: events.len() + 1,
            expected: "end of log".to_string(),
            actual: extra.event_hash.clone(),
        });
    }
    Ok(())
}

fn check_plan_id(plan_id: &str) -> Result<(), AuditError> {
    let ok = !plan_id.is_empty()
        && plan_id.len() <= 80
        && plan_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(AuditError::InvalidPlanId(plan_id.to_string()))
    }
}
