//! Feed Poller
//!
//! One poller drives one feed: decide when to scan, discover and order
//! candidate files, and push each through the transfer protocol. A stuck
//! file recorded in the audit log is always retried before any new file is
//! picked up.

use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use globset::GlobMatcher;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::audit::FeedAuditor;
use crate::config::FeedConfig;
use crate::filesort;
use crate::transfer::{
    good_to_run, run_complete, FaultInjector, FileTransfer, TransferError, TransferStep,
};
use crate::transport::{Connector, Transport, TransportError};

/// Sleep between polling cycles that moved nothing.
const IDLE_BACKOFF: Duration = Duration::from_secs(5);
/// Emit a heartbeat after this long of continuous idle polling.
const HEARTBEAT_AFTER: Duration = Duration::from_secs(300);

#[derive(Error, Debug)]
pub enum PollerError {
    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("list {dir}: {source}")]
    List {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("bad source_fn glob '{pattern}': {source}")]
    Glob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// Administrative kill switch consulted once per outer loop iteration.
pub trait SuppressCheck: Send {
    fn is_suppressed(&self, feed: &str) -> bool;
}

/// Never suppressed.
pub struct NoSuppress;

impl SuppressCheck for NoSuppress {
    fn is_suppressed(&self, _feed: &str) -> bool {
        false
    }
}

/// Suppressed while `<dir>/<feed>.suppress` exists.
pub struct SuppressFlagFile {
    dir: PathBuf,
}

impl SuppressFlagFile {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl SuppressCheck for SuppressFlagFile {
    fn is_suppressed(&self, feed: &str) -> bool {
        self.dir.join(format!("{feed}.suppress")).exists()
    }
}

/// Control loop for one feed.
pub struct FeedPoller {
    feed: FeedConfig,
    audit: FeedAuditor,
    connector: Box<dyn Connector>,
    suppress: Box<dyn SuppressCheck>,
    fault: FaultInjector,
    glob: GlobMatcher,
    conn: Option<Box<dyn Transport>>,
    files: Vec<String>,
    last_poll: Option<Instant>,
    transferred: u64,
}

impl FeedPoller {
    pub fn new(
        feed: FeedConfig,
        audit: FeedAuditor,
        connector: Box<dyn Connector>,
    ) -> Result<Self, PollerError> {
        let glob = feed.glob().map_err(|source| PollerError::Glob {
            pattern: feed.source_fn.clone(),
            source,
        })?;
        Ok(Self {
            feed,
            audit,
            connector,
            suppress: Box::new(NoSuppress),
            fault: FaultInjector::none(),
            glob,
            conn: None,
            files: Vec::new(),
            last_poll: None,
            transferred: 0,
        })
    }

    pub fn with_suppress(mut self, suppress: Box<dyn SuppressCheck>) -> Self {
        self.suppress = suppress;
        self
    }

    pub fn with_fault(mut self, fault: FaultInjector) -> Self {
        self.fault = fault;
        self
    }

    /// Files moved so far by this poller.
    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    /// The feed's polling loop. Returns cleanly when the feed is suppressed
    /// or its transfer limit is reached; fatal transfer errors propagate.
    pub fn run(&mut self, force: bool) -> Result<(), PollerError> {
        info!(
            feed = %self.feed.name,
            source = %self.feed.source_dir.display(),
            dest_host = %self.feed.dest_host,
            "feed poller started"
        );
        let mut idle_since = Instant::now();

        loop {
            if self.suppress.is_suppressed(&self.feed.name) {
                warn!(feed = %self.feed.name, "feed suppressed, stopping poller");
                return Ok(());
            }

            let processed = match self.poll_once(force) {
                Ok(n) => n,
                // Unsupported configuration or lost audit durability: stop.
                Err(e @ PollerError::Transfer(_)) => return Err(e),
                // Connection and listing problems heal on a later cycle.
                Err(e) => {
                    error!(feed = %self.feed.name, error = %e, "poll failed, will retry");
                    0
                }
            };

            if self.limit_reached() {
                info!(
                    feed = %self.feed.name,
                    transferred = self.transferred,
                    "transfer limit reached, stopping poller"
                );
                return Ok(());
            }

            if processed == 0 {
                if idle_since.elapsed() >= HEARTBEAT_AFTER {
                    info!(feed = %self.feed.name, "polling, nothing to transfer");
                    idle_since = Instant::now();
                }
                std::thread::sleep(IDLE_BACKOFF);
            } else {
                idle_since = Instant::now();
            }
        }
    }

    /// One polling cycle: prerequisite checks, discovery, transfers.
    /// Returns the number of files fully delivered this cycle.
    pub fn poll_once(&mut self, force: bool) -> Result<u64, PollerError> {
        if !self.file_check(force)? {
            return Ok(0);
        }
        self.do_all_files()
    }

    /// Whether the minimum polling interval has elapsed.
    fn poll_due(&self) -> bool {
        match self.last_poll {
            None => true,
            Some(at) => at.elapsed() >= Duration::from_secs(self.feed.polling_seconds),
        }
    }

    /// Evaluate prerequisites and, when they hold, discover candidate files
    /// and open the connection. Returns true when there is work to do.
    fn file_check(&mut self, force: bool) -> Result<bool, PollerError> {
        if !force && !self.poll_due() {
            return Ok(false);
        }
        self.last_poll = Some(Instant::now());

        let last = self.audit.status().clone();
        let state_good = run_complete(&last);

        // A stuck file is retried before any new files are considered, even
        // if it no longer appears in (or never matched) the directory scan.
        let stuck = !last.file.is_empty()
            && (!state_good || !good_to_run(TransferStep::SourcePre, &last));
        if stuck {
            info!(
                feed = %self.feed.name,
                file = %last.file,
                step = %last.step,
                result = %last.result,
                "resuming interrupted transfer"
            );
            self.files = vec![last.file];
            self.conn = Some(self.connector.connect(&self.feed)?);
            return Ok(true);
        }

        if !state_good && !force {
            warn!(feed = %self.feed.name, "audit state not clean, skipping discovery");
            return Ok(false);
        }

        let mut files =
            filesort::discover(&self.feed.source_dir, &self.glob).map_err(|source| {
                PollerError::List {
                    dir: self.feed.source_dir.clone(),
                    source,
                }
            })?;
        if files.is_empty() {
            return Ok(false);
        }
        filesort::sort_files(&mut files, &self.feed.sort_key);

        self.files = files;
        self.conn = Some(self.connector.connect(&self.feed)?);
        Ok(true)
    }

    /// Push every discovered file through the protocol, in order, stopping
    /// at the first failed file (the rest wait for the next pass).
    fn do_all_files(&mut self) -> Result<u64, PollerError> {
        let files = std::mem::take(&mut self.files);
        let limit = self.feed.transfer_limit;
        let Some(conn) = self.conn.as_mut() else {
            return Ok(0);
        };

        let mut processed = 0u64;
        for file in &files {
            let done = FileTransfer::new(
                &self.feed,
                file,
                conn.as_mut(),
                &mut self.audit,
                &self.fault,
            )
            .run_all_steps()?;

            if !done {
                warn!(
                    feed = %self.feed.name,
                    file = %file,
                    "transfer failed, leaving remaining files for next pass"
                );
                break;
            }

            processed += 1;
            self.transferred += 1;
            info!(feed = %self.feed.name, file = %file, "transfer complete");

            if limit.is_some_and(|l| self.transferred >= l) {
                break;
            }
        }

        // One connection per polling cycle.
        self.conn = None;
        Ok(processed)
    }

    fn limit_reached(&self) -> bool {
        self.feed
            .transfer_limit
            .is_some_and(|limit| self.transferred >= limit)
    }
}
