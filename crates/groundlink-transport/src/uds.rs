use std::fs::{self, Metadata, Permissions};
use std::io;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::LinkStream;

/// `sockaddr_un.sun_path` capacity.
#[cfg(target_os = "linux")]
const SUN_PATH_CAPACITY: usize = 108;
#[cfg(not(target_os = "linux"))]
const SUN_PATH_CAPACITY: usize = 104;

/// Device and inode of a socket file, to recognise it again at drop time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileId {
    dev: u64,
    ino: u64,
}

impl FileId {
    fn of(metadata: &Metadata) -> Self {
        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }
}

/// Listening Unix domain socket, for local simulators and bridges.
///
/// The socket file is created with owner-only permissions and removed on
/// drop, unless something else has replaced it in the meantime.
pub struct UnixDomainSocket {
    listener: UnixListener,
    path: PathBuf,
    created: FileId,
}

impl UnixDomainSocket {
    /// Mode applied to socket files by [`UnixDomainSocket::bind`].
    pub const OWNER_ONLY: u32 = 0o600;

    /// Bind and listen at `path`, replacing a stale socket file left there.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(path, Self::OWNER_ONLY)
    }

    pub fn bind_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref();
        check_path_len(path)?;
        clear_stale_socket(path)?;

        let bind_failed = |source| bind_error(path, source);
        let listener = UnixListener::bind(path).map_err(bind_failed)?;
        fs::set_permissions(path, Permissions::from_mode(mode)).map_err(bind_failed)?;
        let created = fs::symlink_metadata(path)
            .map(|metadata| FileId::of(&metadata))
            .map_err(bind_failed)?;

        info!(?path, mode = format_args!("{mode:o}"), "listening on unix domain socket");
        Ok(Self {
            listener,
            path: path.to_path_buf(),
            created,
        })
    }

    /// Wait for the next link (blocking).
    pub fn accept(&self) -> Result<LinkStream> {
        let (stream, _) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(path = ?self.path, "link accepted");
        Ok(LinkStream::from_unix(stream))
    }

    /// Dial a listening socket (blocking).
    pub fn connect(path: impl AsRef<Path>) -> Result<LinkStream> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|source| TransportError::Connect {
            endpoint: path.display().to_string(),
            source,
        })?;
        debug!(?path, "connected to unix domain socket");
        Ok(LinkStream::from_unix(stream))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UnixDomainSocket {
    fn drop(&mut self) {
        match fs::symlink_metadata(&self.path) {
            Ok(metadata)
                if metadata.file_type().is_socket() && FileId::of(&metadata) == self.created =>
            {
                debug!(path = ?self.path, "removing socket file");
                let _ = fs::remove_file(&self.path);
            }
            Ok(_) => debug!(path = ?self.path, "socket path replaced; leaving it"),
            Err(_) => {}
        }
    }
}

fn bind_error(path: &Path, source: io::Error) -> TransportError {
    TransportError::Bind {
        endpoint: path.display().to_string(),
        source,
    }
}

fn check_path_len(path: &Path) -> Result<()> {
    let len = path.as_os_str().len();
    if len < SUN_PATH_CAPACITY {
        return Ok(());
    }
    Err(TransportError::PathTooLong {
        path: path.to_path_buf(),
        len,
        max: SUN_PATH_CAPACITY,
    })
}

/// Remove a socket file left by an earlier listener. Any other kind of file
/// fails the bind and stays.
fn clear_stale_socket(path: &Path) -> Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(bind_error(path, err)),
    };
    if !metadata.file_type().is_socket() {
        let occupied = io::Error::new(io::ErrorKind::AlreadyExists, "path exists and is not a socket");
        return Err(bind_error(path, occupied));
    }
    debug!(?path, "clearing stale socket file");
    fs::remove_file(path).map_err(|err| bind_error(path, err))
}
