//! Transfer Core Types
//!
//! Type definitions for the per-file transfer state machine.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::FeedConfig;

/// Suffix appended to the destination name while the upload is in flight.
pub const TEMP_SUFFIX: &str = ".temp";

/// The six ordered sub-operations applied to one file, plus the idle marker.
///
/// Step IDs are stable: they are persisted in the audit record and drive
/// crash recovery, so renumbering them invalidates every audit file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum TransferStep {
    /// No step attempted yet (fresh feed) or last run fully finished.
    Idle = 0,
    /// Source-side preparation before the copy.
    SourcePre = 1,
    /// Destination-side checks before the copy.
    DestPre = 2,
    /// Upload to the temporary destination name.
    Copy = 3,
    /// Atomic rename of the temp name into place.
    Rename = 4,
    /// Destination post-actions (symlink maintenance).
    DestPost = 5,
    /// Source post-actions (delete or archive the source file).
    SourcePost = 6,
}

impl TransferStep {
    /// The six executable steps, in protocol order.
    pub const SEQUENCE: [TransferStep; 6] = [
        TransferStep::SourcePre,
        TransferStep::DestPre,
        TransferStep::Copy,
        TransferStep::Rename,
        TransferStep::DestPost,
        TransferStep::SourcePost,
    ];

    /// Numeric step ID as persisted in the audit record.
    #[inline]
    pub fn id(&self) -> u8 {
        *self as u8
    }

    /// Convert from a persisted step ID.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(TransferStep::Idle),
            1 => Some(TransferStep::SourcePre),
            2 => Some(TransferStep::DestPre),
            3 => Some(TransferStep::Copy),
            4 => Some(TransferStep::Rename),
            5 => Some(TransferStep::DestPost),
            6 => Some(TransferStep::SourcePost),
            _ => None,
        }
    }

    /// Human-readable step name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStep::Idle => "idle",
            TransferStep::SourcePre => "source_pre",
            TransferStep::DestPre => "dest_pre",
            TransferStep::Copy => "copy",
            TransferStep::Rename => "rename",
            TransferStep::DestPost => "dest_post",
            TransferStep::SourcePost => "source_post",
        }
    }
}

impl fmt::Display for TransferStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<TransferStep> for u8 {
    fn from(step: TransferStep) -> u8 {
        step.id()
    }
}

impl TryFrom<u8> for TransferStep {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        TransferStep::from_id(value).ok_or_else(|| format!("invalid transfer step id: {value}"))
    }
}

/// Whether an audit record marks the beginning or the end of a step attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditPhase {
    Start,
    Stop,
}

impl AuditPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditPhase::Start => "start",
            AuditPhase::Stop => "stop",
        }
    }
}

impl fmt::Display for AuditPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recorded outcome of a step attempt.
///
/// `Tbd` is written with every `start` record: if the process dies mid-step,
/// the surviving record says the outcome is unknown and recovery must re-run
/// the step rather than trust it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Pass,
    Fail,
    Tbd,
}

impl StepOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepOutcome::Pass => "pass",
            StepOutcome::Fail => "fail",
            StepOutcome::Tbd => "tbd",
        }
    }

    /// True only for a definite pass.
    #[inline]
    pub fn is_pass(&self) -> bool {
        matches!(self, StepOutcome::Pass)
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One file moving through the six-step protocol.
///
/// Holds the three path identities of a transfer: the source file, the final
/// destination name, and the temporary destination name the upload goes to
/// first. Readers at the destination never see a partial file because the
/// temp name is renamed into place only after the copy completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferAttempt {
    /// Bare filename, as listed in the source directory.
    pub file: String,
    /// Fully-qualified source path.
    pub source_fqfn: PathBuf,
    /// Fully-qualified final destination path.
    pub dest_fqfn: PathBuf,
    /// Staging path the upload is written to (`dest_fqfn` + `.temp`).
    pub dest_temp_fqfn: PathBuf,
}

impl TransferAttempt {
    /// Build the path identities for one file of a feed.
    pub fn new(feed: &FeedConfig, file: &str) -> Self {
        let source_fqfn = feed.source_dir.join(file);
        let dest_fqfn = feed.dest_dir.join(file);
        let mut temp = dest_fqfn.clone().into_os_string();
        temp.push(TEMP_SUFFIX);

        Self {
            file: file.to_string(),
            source_fqfn,
            dest_fqfn,
            dest_temp_fqfn: PathBuf::from(temp),
        }
    }
}

impl fmt::Display for TransferAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}",
            self.source_fqfn.display(),
            self.dest_fqfn.display()
        )
    }
}
