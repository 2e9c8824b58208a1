//! Local Filesystem Transport
//!
//! Destination operations over `std::fs`, for same-host feeds and for
//! integration tests that exercise the full protocol without a server.
//! Rename mirrors SFTPv3 semantics and refuses to overwrite an existing
//! destination, so the state machine's rename-recovery path behaves the
//! same against both transports.

use std::fs;
use std::io;
use std::path::Path;

use super::{Connector, Transport, TransportError};
use crate::config::FeedConfig;

#[derive(Debug, Default)]
pub struct LocalTransport;

fn io_at(path: &Path) -> impl FnOnce(io::Error) -> TransportError + '_ {
    move |source| {
        if source.kind() == io::ErrorKind::NotFound {
            TransportError::NotFound(path.to_path_buf())
        } else {
            TransportError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

impl Transport for LocalTransport {
    fn put(&mut self, local: &Path, remote: &Path) -> Result<(), TransportError> {
        fs::copy(local, remote).map_err(io_at(local))?;
        Ok(())
    }

    fn rename(&mut self, from: &Path, to: &Path) -> Result<(), TransportError> {
        // std::fs::rename would silently overwrite on unix; SFTPv3 refuses.
        if to.exists() {
            return Err(TransportError::Io {
                path: to.to_path_buf(),
                source: io::Error::new(io::ErrorKind::AlreadyExists, "destination exists"),
            });
        }
        fs::rename(from, to).map_err(io_at(from))
    }

    fn remove(&mut self, path: &Path) -> Result<(), TransportError> {
        fs::remove_file(path).map_err(io_at(path))
    }

    fn symlink(&mut self, target: &Path, link: &Path) -> Result<(), TransportError> {
        std::os::unix::fs::symlink(target, link).map_err(io_at(link))
    }
}

/// Connector handing out [`LocalTransport`] regardless of the feed's host.
pub struct LocalConnector;

impl Connector for LocalConnector {
    fn connect(&self, _feed: &FeedConfig) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(LocalTransport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_then_rename_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.txt");
        let tmp = dir.path().join("dst.txt.temp");
        let dst = dir.path().join("dst.txt");
        fs::write(&src, b"payload").unwrap();

        let mut t = LocalTransport;
        t.put(&src, &tmp).unwrap();
        t.rename(&tmp, &dst).unwrap();

        assert!(!tmp.exists());
        assert_eq!(fs::read(&dst).unwrap(), b"payload");
    }

    #[test]
    fn test_rename_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a");
        let to = dir.path().join("b");
        fs::write(&from, b"new").unwrap();
        fs::write(&to, b"old").unwrap();

        let mut t = LocalTransport;
        let err = t.rename(&from, &to).unwrap_err();
        assert!(!err.is_not_found());
        assert_eq!(fs::read(&to).unwrap(), b"old");
    }

    #[test]
    fn test_remove_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = LocalTransport;
        let err = t.remove(&dir.path().join("ghost")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_symlink_points_at_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("data.txt");
        let link = dir.path().join("latest");
        fs::write(&target, b"x").unwrap();

        let mut t = LocalTransport;
        t.symlink(&target, &link).unwrap();
        assert_eq!(fs::read_link(&link).unwrap(), target);
    }
}
