//! File Transfer State Machine
//!
//! The six-step per-file protocol: source pre-actions, dest pre-actions,
//! copy to a temp name, rename into place, dest post-actions, source
//! post-actions. Steps run in strict order through the [`StepRunner`],
//! aborting the file on the first failure; the recovery table decides which
//! steps a resumed or retried file actually executes.

use std::fs;
use std::io;

use tracing::{debug, info};

use crate::audit::FeedAuditor;
use crate::config::{DestPostAction, FeedConfig, SourcePostAction};
use crate::transfer::error::TransferError;
use crate::transfer::fault::{FaultInjector, SUBSTEP_MAIN, SUBSTEP_RENAME_FIRST};
use crate::transfer::runner::{StepDisposition, StepRunner};
use crate::transfer::types::{TransferAttempt, TransferStep};
use crate::transport::Transport;

type StepTask = fn(
    &FeedConfig,
    &TransferAttempt,
    &mut dyn Transport,
    &FaultInjector,
) -> Result<(), TransferError>;

/// One file's trip through the protocol.
pub struct FileTransfer<'a> {
    feed: &'a FeedConfig,
    attempt: TransferAttempt,
    transport: &'a mut dyn Transport,
    audit: &'a mut FeedAuditor,
    fault: &'a FaultInjector,
}

impl<'a> FileTransfer<'a> {
    pub fn new(
        feed: &'a FeedConfig,
        file: &str,
        transport: &'a mut dyn Transport,
        audit: &'a mut FeedAuditor,
        fault: &'a FaultInjector,
    ) -> Self {
        Self {
            attempt: TransferAttempt::new(feed, file),
            feed,
            transport,
            audit,
            fault,
        }
    }

    const SEQUENCE: [(TransferStep, StepTask); 6] = [
        (TransferStep::SourcePre, source_pre_actions),
        (TransferStep::DestPre, dest_pre_actions),
        (TransferStep::Copy, copy_file),
        (TransferStep::Rename, rename_dest_file),
        (TransferStep::DestPost, dest_post_actions),
        (TransferStep::SourcePost, source_post_actions),
    ];

    /// Run the protocol for this file, in order, aborting on first failure.
    ///
    /// Returns `Ok(true)` when the file reached the end of the protocol,
    /// `Ok(false)` when a step failed retryably (the audit record carries
    /// the resume point). Fatal errors propagate.
    pub fn run_all_steps(&mut self) -> Result<bool, TransferError> {
        info!(feed = %self.feed.name, file = %self.attempt.file, "transferring");

        for (step, task) in Self::SEQUENCE {
            let Self {
                feed,
                attempt,
                transport,
                audit,
                fault,
            } = self;

            let mut runner = StepRunner::new(audit, &attempt.file);
            let disposition = runner.run_step(step, || {
                if fault.should_fail(step, SUBSTEP_MAIN) {
                    return Err(TransferError::FaultInjected(step));
                }
                task(feed, attempt, &mut **transport, fault)
            })?;

            if disposition == StepDisposition::Failed {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Step 1: source-side preparation before the send.
///
/// Hook for pre-send renames or compression; no feed configures any today.
fn source_pre_actions(
    _feed: &FeedConfig,
    _attempt: &TransferAttempt,
    _transport: &mut dyn Transport,
    _fault: &FaultInjector,
) -> Result<(), TransferError> {
    Ok(())
}

/// Step 2: destination-side checks before the send (space, directories).
fn dest_pre_actions(
    _feed: &FeedConfig,
    _attempt: &TransferAttempt,
    _transport: &mut dyn Transport,
    _fault: &FaultInjector,
) -> Result<(), TransferError> {
    Ok(())
}

/// Step 3: upload to the temporary destination name.
fn copy_file(
    _feed: &FeedConfig,
    attempt: &TransferAttempt,
    transport: &mut dyn Transport,
    _fault: &FaultInjector,
) -> Result<(), TransferError> {
    transport.put(&attempt.source_fqfn, &attempt.dest_temp_fqfn)?;
    Ok(())
}

/// Step 4: rename the temp name into place.
///
/// On a rename error, remove any pre-existing destination file (not-found
/// ignored) and retry once. This covers the crashed run that had already
/// renamed into place before its audit record caught up; if the temp file
/// is also gone the retry fails too, and recovery re-runs the copy.
fn rename_dest_file(
    _feed: &FeedConfig,
    attempt: &TransferAttempt,
    transport: &mut dyn Transport,
    fault: &FaultInjector,
) -> Result<(), TransferError> {
    let first: Result<(), TransferError> =
        if fault.should_fail(TransferStep::Rename, SUBSTEP_RENAME_FIRST) {
            Err(TransferError::FaultInjected(TransferStep::Rename))
        } else {
            transport
                .rename(&attempt.dest_temp_fqfn, &attempt.dest_fqfn)
                .map_err(TransferError::from)
        };

    if let Err(e) = first {
        debug!(
            file = %attempt.file,
            error = %e,
            "rename failed, clearing destination and retrying"
        );
        match transport.remove(&attempt.dest_fqfn) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        transport.rename(&attempt.dest_temp_fqfn, &attempt.dest_fqfn)?;
    }
    Ok(())
}

/// Step 5: destination post-actions.
fn dest_post_actions(
    feed: &FeedConfig,
    attempt: &TransferAttempt,
    transport: &mut dyn Transport,
    _fault: &FaultInjector,
) -> Result<(), TransferError> {
    match feed.dest_post_action {
        DestPostAction::None => Ok(()),
        DestPostAction::CrcCheck => Err(TransferError::UnsupportedPostAction("crccheck")),
        DestPostAction::Symlink => {
            let Some(link) = feed.dest_symlink_fqfn() else {
                return Err(TransferError::UnsupportedPostAction(
                    "symlink without dest_post_action_symlink_dir/_fn",
                ));
            };
            // Replace, don't append: a link from the previous delivery is
            // expected to be there.
            match transport.remove(&link) {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
            transport.symlink(&attempt.dest_fqfn, &link)?;
            Ok(())
        }
    }
}

/// Step 6: source post-actions.
fn source_post_actions(
    feed: &FeedConfig,
    attempt: &TransferAttempt,
    _transport: &mut dyn Transport,
    _fault: &FaultInjector,
) -> Result<(), TransferError> {
    match feed.source_post_action {
        SourcePostAction::None => Ok(()),
        SourcePostAction::Delete => match fs::remove_file(&attempt.source_fqfn) {
            Ok(()) => Ok(()),
            // A prior interrupted pass may already have deleted it.
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        },
        SourcePostAction::Move => {
            let Some(dir) = &feed.source_post_dir else {
                return Err(TransferError::UnsupportedPostAction(
                    "move without source_post_dir",
                ));
            };
            let moved = dir.join(&attempt.file);
            // A prior interrupted pass may already have moved it.
            if moved.exists() && !attempt.source_fqfn.exists() {
                return Ok(());
            }
            fs::rename(&attempt.source_fqfn, &moved)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::{test_feed, FeedConfig};
    use crate::transfer::types::{AuditPhase, StepOutcome};
    use crate::transport::LocalTransport;

    struct Harness {
        _tmp: tempfile::TempDir,
        feed: FeedConfig,
        audit_dir: std::path::PathBuf,
    }

    impl Harness {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let source = tmp.path().join("source");
            let dest = tmp.path().join("dest");
            let audit_dir = tmp.path().join("audit");
            fs::create_dir_all(&source).unwrap();
            fs::create_dir_all(&dest).unwrap();

            let feed = test_feed(source.to_str().unwrap(), dest.to_str().unwrap());
            Self {
                _tmp: tmp,
                feed,
                audit_dir,
            }
        }

        fn seed(&self, name: &str, contents: &[u8]) {
            fs::write(self.feed.source_dir.join(name), contents).unwrap();
        }

        fn auditor(&self) -> FeedAuditor {
            FeedAuditor::open(&self.audit_dir, &self.feed.name).unwrap()
        }

        fn run(&self, file: &str, fault: &FaultInjector) -> Result<bool, TransferError> {
            let mut audit = self.auditor();
            let mut transport = LocalTransport;
            FileTransfer::new(&self.feed, file, &mut transport, &mut audit, fault)
                .run_all_steps()
        }
    }

    fn assert_audit(h: &Harness, step: TransferStep, result: StepOutcome) {
        let audit = h.auditor();
        assert_eq!(audit.status().step, step);
        assert_eq!(audit.status().status, AuditPhase::Stop);
        assert_eq!(audit.status().result, result);
    }

    #[test]
    fn test_happy_path_delivers_and_audits() {
        let h = Harness::new();
        h.seed("x.txt", b"hello");

        assert!(h.run("x.txt", &FaultInjector::none()).unwrap());

        let delivered = h.feed.dest_dir.join("x.txt");
        assert_eq!(fs::read(&delivered).unwrap(), b"hello");
        assert!(!h.feed.dest_dir.join("x.txt.temp").exists());
        assert_audit(&h, TransferStep::SourcePost, StepOutcome::Pass);
    }

    #[test]
    fn test_copy_failure_short_circuits_remaining_steps() {
        let mut h = Harness::new();
        h.feed.source_post_action = SourcePostAction::Delete;
        h.seed("x.txt", b"hello");

        let ok = h
            .run("x.txt", &FaultInjector::fail_step(TransferStep::Copy))
            .unwrap();
        assert!(!ok);

        // Steps 4-6 never ran: nothing at the destination, source intact.
        assert_audit(&h, TransferStep::Copy, StepOutcome::Fail);
        assert!(!h.feed.dest_dir.join("x.txt").exists());
        assert!(h.feed.source_dir.join("x.txt").exists());
    }

    #[test]
    fn test_failed_file_resumes_at_recovery_step() {
        let h = Harness::new();
        h.seed("x.txt", b"hello");

        let ok = h
            .run("x.txt", &FaultInjector::fail_step(TransferStep::Copy))
            .unwrap();
        assert!(!ok);

        // Second pass with the fault cleared resumes at the copy and
        // finishes the protocol.
        assert!(h.run("x.txt", &FaultInjector::none()).unwrap());
        assert_eq!(fs::read(h.feed.dest_dir.join("x.txt")).unwrap(), b"hello");
        assert_audit(&h, TransferStep::SourcePost, StepOutcome::Pass);
    }

    #[test]
    fn test_rename_retry_clears_stale_destination() {
        let h = Harness::new();
        h.seed("x.txt", b"fresh");
        // A stale delivery occupies the final name; SFTP-style rename
        // refuses to overwrite, forcing the remove-and-retry path.
        fs::write(h.feed.dest_dir.join("x.txt"), b"stale").unwrap();

        assert!(h.run("x.txt", &FaultInjector::none()).unwrap());
        assert_eq!(fs::read(h.feed.dest_dir.join("x.txt")).unwrap(), b"fresh");
        assert!(!h.feed.dest_dir.join("x.txt.temp").exists());
    }

    #[test]
    fn test_injected_first_rename_failure_still_delivers() {
        let h = Harness::new();
        h.seed("x.txt", b"hello");

        let fault =
            FaultInjector::fail_substep(TransferStep::Rename, SUBSTEP_RENAME_FIRST);
        assert!(h.run("x.txt", &fault).unwrap());
        assert_eq!(fs::read(h.feed.dest_dir.join("x.txt")).unwrap(), b"hello");
    }

    #[test]
    fn test_delete_post_action_tolerates_missing_source() {
        let mut h = Harness::new();
        h.feed.source_post_action = SourcePostAction::Delete;

        // The source file is already gone (a prior pass deleted it).
        let attempt = TransferAttempt::new(&h.feed, "ghost.txt");
        let mut transport = LocalTransport;
        source_post_actions(&h.feed, &attempt, &mut transport, &FaultInjector::none())
            .unwrap();
    }

    #[test]
    fn test_delete_post_action_removes_source() {
        let mut h = Harness::new();
        h.feed.source_post_action = SourcePostAction::Delete;
        h.seed("x.txt", b"hello");

        assert!(h.run("x.txt", &FaultInjector::none()).unwrap());
        assert!(!h.feed.source_dir.join("x.txt").exists());
        assert!(h.feed.dest_dir.join("x.txt").exists());
    }

    #[test]
    fn test_move_post_action_archives_source() {
        let mut h = Harness::new();
        let archive = h.feed.source_dir.parent().unwrap().join("archive");
        fs::create_dir_all(&archive).unwrap();
        h.feed.source_post_action = SourcePostAction::Move;
        h.feed.source_post_dir = Some(archive.clone());
        h.seed("x.txt", b"hello");

        assert!(h.run("x.txt", &FaultInjector::none()).unwrap());
        assert!(!h.feed.source_dir.join("x.txt").exists());
        assert_eq!(fs::read(archive.join("x.txt")).unwrap(), b"hello");
    }

    #[test]
    fn test_move_post_action_tolerates_already_moved() {
        let mut h = Harness::new();
        let archive = h.feed.source_dir.parent().unwrap().join("archive");
        fs::create_dir_all(&archive).unwrap();
        h.feed.source_post_action = SourcePostAction::Move;
        h.feed.source_post_dir = Some(archive.clone());
        fs::write(archive.join("x.txt"), b"hello").unwrap();

        // Source absent, archive copy present: a prior pass finished the move.
        let attempt = TransferAttempt::new(&h.feed, "x.txt");
        let mut transport = LocalTransport;
        source_post_actions(&h.feed, &attempt, &mut transport, &FaultInjector::none())
            .unwrap();
    }

    #[test]
    fn test_symlink_post_action_points_at_delivery() {
        let mut h = Harness::new();
        let links = h.feed.dest_dir.join("links");
        fs::create_dir_all(&links).unwrap();
        h.feed.dest_post_action = DestPostAction::Symlink;
        h.feed.dest_post_action_symlink_dir = Some(links.clone());
        h.feed.dest_post_action_symlink_fn = Some("latest".to_string());
        h.seed("x.txt", b"hello");

        assert!(h.run("x.txt", &FaultInjector::none()).unwrap());
        assert_eq!(
            fs::read_link(links.join("latest")).unwrap(),
            h.feed.dest_dir.join("x.txt")
        );

        // A second delivery replaces the link rather than failing on it.
        h.seed("y.txt", b"newer");
        assert!(h.run("y.txt", &FaultInjector::none()).unwrap());
        assert_eq!(
            fs::read_link(links.join("latest")).unwrap(),
            h.feed.dest_dir.join("y.txt")
        );
    }

    #[test]
    fn test_crccheck_is_fatal() {
        let mut h = Harness::new();
        h.feed.dest_post_action = DestPostAction::CrcCheck;
        h.seed("x.txt", b"hello");

        let err = h.run("x.txt", &FaultInjector::none()).unwrap_err();
        assert!(err.is_fatal());
        assert_audit(&h, TransferStep::DestPost, StepOutcome::Fail);
    }

    #[test]
    fn test_destination_never_sees_temp_name_after_success() {
        let h = Harness::new();
        h.seed("x.txt", b"hello");
        assert!(h.run("x.txt", &FaultInjector::none()).unwrap());

        let leftovers: Vec<_> = fs::read_dir(&h.feed.dest_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .filter(|n| n.ends_with(".temp"))
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
    }

    #[test]
    fn test_resumed_file_skips_completed_steps() {
        let h = Harness::new();
        h.seed("x.txt", b"hello");

        // Simulate a crash after the copy's stop/pass record: dest temp file
        // exists, audit says step 3 passed.
        {
            let mut audit = h.auditor();
            let mut transport = LocalTransport;
            let attempt = TransferAttempt::new(&h.feed, "x.txt");
            transport
                .put(&attempt.source_fqfn, &attempt.dest_temp_fqfn)
                .unwrap();
            audit
                .write(
                    TransferStep::Copy,
                    AuditPhase::Stop,
                    "x.txt",
                    StepOutcome::Pass,
                )
                .unwrap();
        }

        // The next pass bypasses steps 1-3 and finishes 4-6.
        assert!(h.run("x.txt", &FaultInjector::none()).unwrap());
        assert_eq!(fs::read(h.feed.dest_dir.join("x.txt")).unwrap(), b"hello");
        assert_audit(&h, TransferStep::SourcePost, StepOutcome::Pass);
    }
}
