//! feedhaul - Recoverable Feed File-Transfer Daemon
//!
//! Moves files from local source directories to remote SFTP destinations,
//! one configured *feed* at a time, tracking progress through a durable
//! per-feed audit record so a crash mid-transfer resumes without data loss
//! or duplication.
//!
//! # Modules
//!
//! - [`config`] - YAML configuration with load-time validation
//! - [`logging`] - tracing subscriber setup
//! - [`audit`] - the durable per-feed step/status/result record
//! - [`transport`] - SFTP and local-filesystem destination primitives
//! - [`transfer`] - the six-step per-file state machine and recovery rules
//! - [`filesort`] - candidate discovery, glob filtering, sort policies
//! - [`poller`] - the per-feed polling loop

pub mod audit;
pub mod config;
pub mod filesort;
pub mod logging;
pub mod poller;
pub mod transfer;
pub mod transport;

// Convenient re-exports at crate root
pub use audit::{AuditStatus, FeedAuditor};
pub use config::{AppConfig, DestPostAction, FeedConfig, SortKey, SourcePostAction};
pub use poller::{FeedPoller, NoSuppress, SuppressCheck, SuppressFlagFile};
pub use transfer::{
    good_to_run, run_complete, FaultInjector, FileTransfer, StepOutcome, TransferError,
    TransferStep,
};
pub use transport::{Connector, LocalConnector, LocalTransport, SftpConnector, Transport};
