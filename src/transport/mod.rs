//! Destination Transport
//!
//! The small set of destination-side primitives the transfer protocol
//! needs, behind a trait so the state machine and its tests do not care
//! whether the destination is an SFTP server or a local directory.

pub mod local;
pub mod sftp;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use local::{LocalConnector, LocalTransport};
pub use sftp::{SftpConnector, SftpTransport};

use crate::config::FeedConfig;

/// Transport-level errors.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The remote path does not exist. Classified separately because several
    /// recovery paths treat "already gone" as success.
    #[error("no such path: {0}")]
    NotFound(PathBuf),

    #[error("connect {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("private key not found: {0}")]
    KeyMissing(PathBuf),

    #[error("ssh: {0}")]
    Ssh(#[from] ssh2::Error),

    #[error("i/o on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl TransportError {
    /// True when the operation failed because the path does not exist.
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::NotFound(_))
    }
}

/// Destination-side operations used by the transfer steps.
///
/// All calls are synchronous and blocking; a connection is owned by exactly
/// one feed poller at a time.
pub trait Transport: Send {
    /// Upload a local file to a remote path.
    fn put(&mut self, local: &Path, remote: &Path) -> Result<(), TransportError>;

    /// Rename a remote path. May refuse to overwrite an existing
    /// destination, depending on the server.
    fn rename(&mut self, from: &Path, to: &Path) -> Result<(), TransportError>;

    /// Remove a remote file. `NotFound` when it does not exist.
    fn remove(&mut self, path: &Path) -> Result<(), TransportError>;

    /// Create a symlink at `link` pointing at `target`.
    fn symlink(&mut self, target: &Path, link: &Path) -> Result<(), TransportError>;
}

/// Factory opening a fresh transport connection for a feed.
///
/// The poller opens one connection per polling cycle; injecting the factory
/// keeps the polling loop testable without a live server.
pub trait Connector: Send {
    fn connect(&self, feed: &FeedConfig) -> Result<Box<dyn Transport>, TransportError>;
}
