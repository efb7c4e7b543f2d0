use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::AuditConfig;

/// Running counters carried on every event.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkflowMetrics {
    pub requests: u64,
    pub model_calls: u64,
    pub failures: u64,
}

#[derive(Debug, Serialize)]
struct AuditEvent<'a> {
    ts: String,
    event_type: &'a str,
    details: serde_json::Value,
    metrics: WorkflowMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    prev_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hash: Option<String>,
}

#[derive(Debug, Default)]
struct AuditState {
    last_hash: Option<String>,
    metrics: WorkflowMetrics,
}

/// Append-only JSONL audit trail of advisor requests.
///
/// Events carry metadata only (request ids, row counts, outcomes). Write
/// failures are logged and never surface to the caller.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    hash_chain: bool,
    state: Mutex<AuditState>,
}

impl AuditLog {
    /// `None` when auditing is disabled.
    pub fn new(config: &AuditConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::at_path(config.path.clone(), config.hash_chain))
    }

    pub fn at_path(path: PathBuf, hash_chain: bool) -> Self {
        Self {
            path,
            hash_chain,
            state: Mutex::new(AuditState::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metrics(&self) -> WorkflowMetrics {
        self.state
            .lock()
            .map(|state| state.metrics)
            .unwrap_or_default()
    }

    pub fn inc_request(&self) {
        self.bump_metric(|m| m.requests += 1);
    }

    pub fn inc_model_call(&self) {
        self.bump_metric(|m| m.model_calls += 1);
    }

    pub fn inc_failure(&self) {
        self.bump_metric(|m| m.failures += 1);
    }

    fn bump_metric<F>(&self, update: F)
    where
        F: FnOnce(&mut WorkflowMetrics),
    {
        if let Ok(mut state) = self.state.lock() {
            update(&mut state.metrics);
        }
    }

    pub fn record(&self, event_type: &str, details: serde_json::Value) {
        // Held through the append so the metrics snapshot and chain link match
        // the line actually written.
        let mut state = match self.state.lock() {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Audit state lock poisoned: {}", e);
                return;
            }
        };

        let mut event = AuditEvent {
            ts: Utc::now().to_rfc3339(),
            event_type,
            details,
            metrics: state.metrics,
            prev_hash: state.last_hash.clone(),
            hash: None,
        };

        let mut next_hash = None;
        if self.hash_chain {
            let to_hash = match serde_json::to_string(&event) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("Failed to serialize audit event for hashing: {}", e);
                    return;
                }
            };
            let hash = format!("{:x}", Sha256::digest(to_hash.as_bytes()));
            event.hash = Some(hash.clone());
            next_hash = Some(hash);
        }

        let line = match serde_json::to_string(&event) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Failed to serialize audit event: {}", e);
                return;
            }
        };

        if self.append(&line) && next_hash.is_some() {
            state.last_hash = next_hash;
        }
    }

    fn append(&self, line: &str) -> bool {
        if let Some(parent) = self.path.parent()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            tracing::warn!("Failed to create audit log dir {:?}: {}", parent, e);
            return false;
        }

        // New files are owner read/write only; existing files with broader
        // modes are left untouched.
        let mut open_opts = OpenOptions::new();
        open_opts.create(true).append(true);
        #[cfg(unix)]
        open_opts.mode(0o600);
        let mut file = match open_opts.open(&self.path) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!("Failed to open audit log {:?}: {}", self.path, e);
                return false;
            }
        };

        #[cfg(unix)]
        {
            let mode = match file.metadata() {
                Ok(meta) => meta.permissions().mode() & 0o777,
                Err(e) => {
                    tracing::warn!(
                        "Failed to read permissions for audit log {:?}: {}",
                        self.path,
                        e
                    );
                    return false;
                }
            };
            if mode != 0o600 {
                tracing::warn!(
                    "Refusing to write audit event; insecure mode {:o} on {:?} (expected 600)",
                    mode,
                    self.path
                );
                return false;
            }
        }

        match writeln!(file, "{line}") {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to append audit event: {}", e);
                false
            }
        }
    }
}
