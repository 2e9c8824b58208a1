//! Step Runner
//!
//! Executes exactly one named step with audit bookkeeping around it. A step
//! never runs without a preceding `start` record and a following `stop`
//! record, so after a crash the audit log unambiguously shows the last step
//! attempted and whether it completed.

use tracing::{debug, error, warn};

use crate::audit::FeedAuditor;
use crate::transfer::error::TransferError;
use crate::transfer::state::good_to_run;
use crate::transfer::types::{AuditPhase, StepOutcome, TransferStep};

/// What happened to one requested step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDisposition {
    /// Not eligible per the recovery table; task not invoked, nothing
    /// written to the audit log.
    Bypassed,
    /// Task ran and passed.
    Completed,
    /// Task ran and failed (retryably); the file's remaining steps must not
    /// run.
    Failed,
}

/// Audit-wrapped executor for single steps of one file's transfer.
pub struct StepRunner<'a> {
    audit: &'a mut FeedAuditor,
    file: &'a str,
}

impl<'a> StepRunner<'a> {
    pub fn new(audit: &'a mut FeedAuditor, file: &'a str) -> Self {
        Self { audit, file }
    }

    /// Run one step if the audit history allows it.
    ///
    /// Fatal task errors propagate (after the `fail` record is written);
    /// retryable ones are folded into [`StepDisposition::Failed`].
    pub fn run_step(
        &mut self,
        step: TransferStep,
        task: impl FnOnce() -> Result<(), TransferError>,
    ) -> Result<StepDisposition, TransferError> {
        if !good_to_run(step, self.audit.status()) {
            debug!(step = %step, file = self.file, "step bypassed by audit history");
            return Ok(StepDisposition::Bypassed);
        }

        self.audit
            .write(step, AuditPhase::Start, self.file, StepOutcome::Tbd)?;

        match task() {
            Ok(()) => {
                self.audit
                    .write(step, AuditPhase::Stop, self.file, StepOutcome::Pass)?;
                debug!(step = %step, file = self.file, "step completed");
                Ok(StepDisposition::Completed)
            }
            Err(e) => {
                self.audit
                    .write(step, AuditPhase::Stop, self.file, StepOutcome::Fail)?;
                if e.is_fatal() {
                    error!(step = %step, file = self.file, error = %e, "fatal step failure");
                    Err(e)
                } else {
                    warn!(step = %step, file = self.file, error = %e, "step failed");
                    Ok(StepDisposition::Failed)
                }
            }
        }
    }
}
