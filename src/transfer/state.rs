//! Step Eligibility Rules
//!
//! The recovery table that decides, from the last audit record alone,
//! whether a requested step may run. Two regimes:
//!
//! - last attempt did **not** pass (`fail`, or `tbd` from a mid-step crash):
//!   the only eligible step is the recovery step of the *recorded* step,
//!   whatever the caller asked for. Retry resumes exactly where the feed
//!   left off.
//! - last attempt passed: a step is eligible only if the recorded step is in
//!   its prior-step set. This enforces strict ordering for a fresh file and
//!   bypasses the steps a resumed file has already completed.

use crate::audit::AuditStatus;
use crate::transfer::types::{AuditPhase, StepOutcome, TransferStep};

/// Recovery rule for one step of the protocol.
#[derive(Debug, Clone, Copy)]
pub struct StepRule {
    /// Where to resume when this step was the last recorded and did not pass.
    pub recovery_step: TransferStep,
    /// Steps that must be the last completed one for this step to run fresh.
    pub priors: &'static [TransferStep],
}

/// The per-step rule table. Total over all seven steps.
pub fn rule(step: TransferStep) -> StepRule {
    use TransferStep::*;
    match step {
        Idle => StepRule {
            recovery_step: Idle,
            priors: &[Idle, SourcePost],
        },
        SourcePre => StepRule {
            recovery_step: SourcePre,
            priors: &[Idle, SourcePost],
        },
        DestPre => StepRule {
            recovery_step: DestPre,
            priors: &[SourcePre],
        },
        Copy => StepRule {
            recovery_step: Copy,
            priors: &[DestPre],
        },
        // A failed rename recovers by re-running the copy, not just the
        // rename: the temp file may be gone (the crashed run had already
        // renamed it into place) and only a fresh copy makes the retried
        // rename succeed. Pinned by test_rename_recovers_at_copy.
        Rename => StepRule {
            recovery_step: Copy,
            priors: &[Copy],
        },
        DestPost => StepRule {
            recovery_step: DestPost,
            priors: &[Rename],
        },
        SourcePost => StepRule {
            recovery_step: SourcePost,
            priors: &[DestPost],
        },
    }
}

/// Whether `new_step` may run given the last recorded audit state.
pub fn good_to_run(new_step: TransferStep, last: &AuditStatus) -> bool {
    match last.result {
        StepOutcome::Pass => rule(new_step).priors.contains(&last.step),
        StepOutcome::Fail | StepOutcome::Tbd => new_step == rule(last.step).recovery_step,
    }
}

/// Whether the feed's last full run finished cleanly.
///
/// True only for a completed run (step 6, stopped, passed) or a feed that
/// has never processed a file (step 0, stopped, passed).
pub fn run_complete(last: &AuditStatus) -> bool {
    matches!(last.step, TransferStep::Idle | TransferStep::SourcePost)
        && last.status == AuditPhase::Stop
        && last.result == StepOutcome::Pass
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn status(step: TransferStep, phase: AuditPhase, result: StepOutcome) -> AuditStatus {
        AuditStatus {
            step,
            status: phase,
            result,
            file: "x.txt".to_string(),
            time: Utc::now(),
        }
    }

    #[test]
    fn test_good_to_run_is_total() {
        // Every (result, old step, new step) combination yields an answer.
        for result in [StepOutcome::Pass, StepOutcome::Fail, StepOutcome::Tbd] {
            for old in 0..=6u8 {
                for new in 0..=6u8 {
                    let last = status(
                        TransferStep::from_id(old).unwrap(),
                        AuditPhase::Stop,
                        result,
                    );
                    let _ = good_to_run(TransferStep::from_id(new).unwrap(), &last);
                }
            }
        }
    }

    #[test]
    fn test_fresh_file_runs_in_strict_order() {
        use TransferStep::*;
        let cases = [
            (Idle, SourcePre),
            (SourcePre, DestPre),
            (DestPre, Copy),
            (Copy, Rename),
            (Rename, DestPost),
            (DestPost, SourcePost),
        ];
        for (done, next) in cases {
            let last = status(done, AuditPhase::Stop, StepOutcome::Pass);
            assert!(good_to_run(next, &last), "{done} should enable {next}");
        }

        // Jumping ahead or restarting mid-protocol is not allowed.
        let after_copy = status(Copy, AuditPhase::Stop, StepOutcome::Pass);
        assert!(!good_to_run(SourcePre, &after_copy));
        assert!(!good_to_run(Copy, &after_copy));
        assert!(!good_to_run(DestPost, &after_copy));
        assert!(!good_to_run(SourcePost, &after_copy));
    }

    #[test]
    fn test_completed_run_enables_next_file() {
        let last = status(TransferStep::SourcePost, AuditPhase::Stop, StepOutcome::Pass);
        assert!(good_to_run(TransferStep::SourcePre, &last));
        assert!(!good_to_run(TransferStep::Copy, &last));
    }

    #[test]
    fn test_failed_step_pins_retry_to_recovery_step() {
        use TransferStep::*;
        for result in [StepOutcome::Fail, StepOutcome::Tbd] {
            for old in [SourcePre, DestPre, Copy, DestPost, SourcePost] {
                let last = status(old, AuditPhase::Stop, result);
                for new in 0..=6u8 {
                    let new = TransferStep::from_id(new).unwrap();
                    assert_eq!(
                        good_to_run(new, &last),
                        new == old,
                        "after {old} {result}, only {old} may run"
                    );
                }
            }
        }
    }

    #[test]
    fn test_rename_recovers_at_copy() {
        // Step 4's recovery step is 3: a broken rename re-runs the copy.
        for result in [StepOutcome::Fail, StepOutcome::Tbd] {
            let last = status(TransferStep::Rename, AuditPhase::Start, result);
            assert!(good_to_run(TransferStep::Copy, &last));
            assert!(!good_to_run(TransferStep::Rename, &last));
            assert!(!good_to_run(TransferStep::SourcePre, &last));
        }
    }

    #[test]
    fn test_run_complete() {
        assert!(run_complete(&status(
            TransferStep::Idle,
            AuditPhase::Stop,
            StepOutcome::Pass
        )));
        assert!(run_complete(&status(
            TransferStep::SourcePost,
            AuditPhase::Stop,
            StepOutcome::Pass
        )));

        assert!(!run_complete(&status(
            TransferStep::SourcePost,
            AuditPhase::Stop,
            StepOutcome::Fail
        )));
        assert!(!run_complete(&status(
            TransferStep::SourcePost,
            AuditPhase::Start,
            StepOutcome::Tbd
        )));
        assert!(!run_complete(&status(
            TransferStep::Copy,
            AuditPhase::Stop,
            StepOutcome::Pass
        )));
    }
}
