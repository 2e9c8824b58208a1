//! Transfer Error Types
//!
//! One error enum for the step tasks, with a single explicit
//! fatal-vs-retryable signal. Retryable failures become a `fail` audit
//! record and are picked up by the recovery table on the next pass; fatal
//! failures are recorded and then propagated to halt the feed, because
//! retrying them can never succeed (unsupported configuration) or cannot be
//! done safely (audit state is no longer durable).

use thiserror::Error;

use crate::audit::AuditError;
use crate::transfer::types::TransferStep;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("source file i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit record could not be persisted: {0}")]
    Audit(#[from] AuditError),

    #[error("unsupported post action: {0}")]
    UnsupportedPostAction(&'static str),

    #[error("injected fault at step {0}")]
    FaultInjected(TransferStep),
}

impl TransferError {
    /// True for failures that must halt the feed instead of being retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransferError::UnsupportedPostAction(_) | TransferError::Audit(_)
        )
    }
}
