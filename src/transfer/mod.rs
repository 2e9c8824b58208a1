//! Recoverable Per-File Transfer
//!
//! The step-wise protocol that moves one file from a feed's source
//! directory to its destination, with every step bracketed by durable audit
//! writes so an interrupted transfer resumes exactly where it stopped.

pub mod error;
pub mod fault;
pub mod machine;
pub mod runner;
pub mod state;
pub mod types;

pub use error::TransferError;
pub use fault::{FaultInjector, SUBSTEP_MAIN, SUBSTEP_RENAME_FIRST};
pub use machine::FileTransfer;
pub use runner::{StepDisposition, StepRunner};
pub use state::{good_to_run, run_complete};
pub use types::{AuditPhase, StepOutcome, TransferAttempt, TransferStep};
