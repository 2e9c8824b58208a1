//! SFTP Transport
//!
//! Blocking SFTP over `ssh2`. Authentication is key-based only: the private
//! key is an unencrypted file under `~/.ssh/`, named per feed config.

use std::fs::File;
use std::io;
use std::net::TcpStream;
use std::path::{Path, PathBuf};

use ssh2::{ErrorCode, Session, Sftp};
use tracing::debug;

use super::{Connector, Transport, TransportError};
use crate::config::FeedConfig;

/// SFTP status code for a missing remote path (LIBSSH2_FX_NO_SUCH_FILE).
const SFTP_NO_SUCH_FILE: i32 = 2;

/// One authenticated SFTP channel over an SSH session.
pub struct SftpTransport {
    // The session must outlive the sftp channel; held for that reason only.
    _session: Session,
    sftp: Sftp,
}

impl std::fmt::Debug for SftpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SftpTransport").finish_non_exhaustive()
    }
}

impl SftpTransport {
    /// Connect, handshake, and authenticate with `~/.ssh/<key_fn>`.
    pub fn connect(
        host: &str,
        port: u16,
        user: &str,
        key_fn: &str,
    ) -> Result<Self, TransportError> {
        let key = ssh_key_path(key_fn)?;
        let addr = format!("{host}:{port}");

        debug!(addr = %addr, user = user, "opening sftp connection");
        let tcp = TcpStream::connect(&addr).map_err(|source| TransportError::Connect {
            addr: addr.clone(),
            source,
        })?;

        let mut session = Session::new()?;
        session.set_tcp_stream(tcp);
        session.handshake()?;
        session.userauth_pubkey_file(user, None, &key, None)?;
        let sftp = session.sftp()?;

        Ok(Self {
            _session: session,
            sftp,
        })
    }
}

impl Transport for SftpTransport {
    fn put(&mut self, local: &Path, remote: &Path) -> Result<(), TransportError> {
        let mut src = File::open(local).map_err(|source| TransportError::Io {
            path: local.to_path_buf(),
            source,
        })?;
        let mut dst = self
            .sftp
            .create(remote)
            .map_err(|e| classify(e, remote))?;
        io::copy(&mut src, &mut dst).map_err(|source| TransportError::Io {
            path: remote.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    fn rename(&mut self, from: &Path, to: &Path) -> Result<(), TransportError> {
        self.sftp
            .rename(from, to, None)
            .map_err(|e| classify(e, from))
    }

    fn remove(&mut self, path: &Path) -> Result<(), TransportError> {
        self.sftp.unlink(path).map_err(|e| classify(e, path))
    }

    fn symlink(&mut self, target: &Path, link: &Path) -> Result<(), TransportError> {
        self.sftp
            .symlink(target, link)
            .map_err(|e| classify(e, link))
    }
}

/// Default connector used by the daemon.
pub struct SftpConnector;

impl Connector for SftpConnector {
    fn connect(&self, feed: &FeedConfig) -> Result<Box<dyn Transport>, TransportError> {
        let transport =
            SftpTransport::connect(&feed.dest_host, feed.port, &feed.dest_user, &feed.key_fn)?;
        Ok(Box::new(transport))
    }
}

/// Map a missing-path SFTP status to [`TransportError::NotFound`].
fn classify(e: ssh2::Error, path: &Path) -> TransportError {
    if e.code() == ErrorCode::SFTP(SFTP_NO_SUCH_FILE) {
        TransportError::NotFound(path.to_path_buf())
    } else {
        TransportError::Ssh(e)
    }
}

fn ssh_key_path(key_fn: &str) -> Result<PathBuf, TransportError> {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default();
    let key = home.join(".ssh").join(key_fn);
    if key.exists() {
        Ok(key)
    } else {
        Err(TransportError::KeyMissing(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_reported_with_path() {
        let err = SftpTransport::connect("localhost", 22, "nobody", "no-such-key-xyzzy")
            .unwrap_err();
        match err {
            TransportError::KeyMissing(path) => {
                assert!(path.ends_with(".ssh/no-such-key-xyzzy"));
            }
            other => panic!("expected KeyMissing, got {other}"),
        }
    }
}
