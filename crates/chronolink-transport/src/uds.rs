use std::io::{ErrorKind, Read, Write};
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, trace};

use crate::error::{Result, TransportError};
use crate::traits::Transport;

const READ_CHUNK_SIZE: usize = 512;
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Listening end of a simulated serial medium on a Unix domain socket.
///
/// The socket file is removed on drop, unless something else has replaced
/// it at the same path in the meantime.
pub struct UnixDomainSocket {
    listener: UnixListener,
    path: PathBuf,
    created_inode: (u64, u64),
}

impl UnixDomainSocket {
    /// Permission mode for created socket paths.
    pub const SOCKET_MODE: u32 = 0o600;
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen at `path`, replacing a stale socket file if present.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let len = path.as_os_str().len();
        if len >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len,
                max: Self::MAX_PATH_LEN,
            });
        }

        let bind_err = |source: std::io::Error| TransportError::Bind {
            path: path.clone(),
            source,
        };

        if let Ok(metadata) = std::fs::symlink_metadata(&path) {
            if !metadata.file_type().is_socket() {
                return Err(bind_err(std::io::Error::new(
                    ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                )));
            }
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(bind_err)?;
        }

        let listener = UnixListener::bind(&path).map_err(bind_err)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(Self::SOCKET_MODE))
            .map_err(bind_err)?;
        let created = std::fs::symlink_metadata(&path).map_err(bind_err)?;

        info!(?path, "listening on unix domain socket");
        Ok(Self {
            listener,
            created_inode: (created.dev(), created.ino()),
            path,
        })
    }

    /// Accept the next link (blocking).
    pub fn accept(&self) -> Result<UnixLink> {
        let (stream, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(path = ?self.path, "accepted link");
        Ok(UnixLink { stream })
    }

    /// Connect to a listening medium (blocking).
    pub fn connect(path: impl AsRef<Path>) -> Result<UnixLink> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|source| TransportError::Connect {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(?path, "connected to unix domain socket");
        Ok(UnixLink { stream })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UnixDomainSocket {
    fn drop(&mut self) {
        let Ok(metadata) = std::fs::symlink_metadata(&self.path) else {
            return;
        };
        if metadata.file_type().is_socket() && (metadata.dev(), metadata.ino()) == self.created_inode
        {
            debug!(path = ?self.path, "cleaning up socket file");
            let _ = std::fs::remove_file(&self.path);
        } else {
            debug!(path = ?self.path, "socket path identity changed; skipping cleanup");
        }
    }
}

/// A connected byte link over a Unix domain socket.
#[derive(Debug)]
pub struct UnixLink {
    stream: UnixStream,
}

impl UnixLink {
    /// Wrap an already connected stream, e.g. one half of `UnixStream::pair()`.
    pub fn from_stream(stream: UnixStream) -> Self {
        Self { stream }
    }

    /// Connected pair of links, mostly useful in tests.
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = UnixStream::pair()?;
        Ok((Self::from_stream(left), Self::from_stream(right)))
    }

    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            stream: self.stream.try_clone()?,
        })
    }
}

impl Transport for UnixLink {
    fn transmit(&mut self, bytes: &[u8]) -> Result<()> {
        match self.stream.write_all(bytes) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::BrokenPipe => Err(TransportError::Disconnected),
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
        self.stream
            .set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))?;

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(TransportError::Disconnected),
                Ok(n) => {
                    trace!(len = n, "unix link receive");
                    return Ok(Some(Bytes::copy_from_slice(&chunk[..n])));
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    return Ok(None)
                }
                Err(err) if err.kind() == ErrorKind::ConnectionReset => {
                    return Err(TransportError::Disconnected)
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }
}
