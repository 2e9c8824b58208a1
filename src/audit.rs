//! Feed Audit State
//!
//! One durable record per feed: the last step attempted, whether it started
//! or stopped, its outcome, and the filename it was working on. This record
//! is the entire crash-recovery input: written before and after every step,
//! read back at startup, so the write path must be durable before it
//! returns.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transfer::types::{AuditPhase, StepOutcome, TransferStep};

/// Audit persistence errors.
///
/// A corrupt record is deliberately not reset to the initial state: silently
/// forgetting an in-flight transfer is exactly the failure mode the audit
/// record exists to prevent, so the operator has to look at it.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("audit file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt audit record {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The last-known-state tuple for one feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStatus {
    pub step: TransferStep,
    pub status: AuditPhase,
    pub result: StepOutcome,
    /// Filename currently or last being processed; empty when none.
    #[serde(rename = "fn")]
    pub file: String,
    pub time: DateTime<Utc>,
}

impl AuditStatus {
    /// State of a feed that has never run: step 0, stopped, passed.
    pub fn initial() -> Self {
        Self {
            step: TransferStep::Idle,
            status: AuditPhase::Stop,
            result: StepOutcome::Pass,
            file: String::new(),
            time: Utc::now(),
        }
    }
}

/// Durable audit store for one feed.
///
/// The record lives at `<audit_dir>/<feed>.json` and is replaced atomically
/// on every write: serialize to a `.tmp` sibling, fsync, rename over the
/// live path. A crash between any two of those operations leaves either the
/// previous record or the new one, never a torn file.
#[derive(Debug)]
pub struct FeedAuditor {
    path: PathBuf,
    status: AuditStatus,
    empty_audit: bool,
}

impl FeedAuditor {
    /// Open (or initialize) the audit record for a feed.
    pub fn open(audit_dir: &Path, feed: &str) -> Result<Self, AuditError> {
        fs::create_dir_all(audit_dir).map_err(|source| AuditError::Io {
            path: audit_dir.to_path_buf(),
            source,
        })?;
        let path = audit_dir.join(format!("{feed}.json"));

        match fs::read_to_string(&path) {
            Ok(raw) => {
                let status = serde_json::from_str(&raw).map_err(|source| AuditError::Corrupt {
                    path: path.clone(),
                    source,
                })?;
                Ok(Self {
                    path,
                    status,
                    empty_audit: false,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self {
                path,
                status: AuditStatus::initial(),
                empty_audit: true,
            }),
            Err(source) => Err(AuditError::Io { path, source }),
        }
    }

    /// The record as of the last `write` (or as restored from disk).
    pub fn status(&self) -> &AuditStatus {
        &self.status
    }

    /// True when no record existed for this feed before this process.
    pub fn empty_audit(&self) -> bool {
        self.empty_audit
    }

    /// Record a step transition. Durable before returning.
    pub fn write(
        &mut self,
        step: TransferStep,
        phase: AuditPhase,
        file: &str,
        result: StepOutcome,
    ) -> Result<(), AuditError> {
        let status = AuditStatus {
            step,
            status: phase,
            result,
            file: file.to_string(),
            time: Utc::now(),
        };

        let payload =
            serde_json::to_vec_pretty(&status).map_err(|source| AuditError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        let tmp = self.path.with_extension("json.tmp");
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| AuditError::Io { path, source }
        };

        let mut f = File::create(&tmp).map_err(io_err(&tmp))?;
        f.write_all(&payload).map_err(io_err(&tmp))?;
        f.sync_all().map_err(io_err(&tmp))?;
        drop(f);
        fs::rename(&tmp, &self.path).map_err(io_err(&self.path))?;

        self.status = status;
        self.empty_audit = false;
        Ok(())
    }
}
