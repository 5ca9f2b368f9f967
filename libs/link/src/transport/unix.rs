use std::path::{Path, PathBuf};

use tokio::net::{UnixListener, UnixStream};

use crate::connection::Role;
use crate::error::Result;
use crate::transport::{BoxedStream, Transport};

/// Map a channel name onto a socket path
///
/// Names containing a path separator are used verbatim, anything else lives in the
/// system temp directory as `<name>.sock`.
pub fn socket_path(name: &str) -> PathBuf {
    if name.contains(std::path::MAIN_SEPARATOR) || name.contains('/') {
        PathBuf::from(name)
    } else {
        std::env::temp_dir().join(format!("{name}.sock"))
    }
}

/// Build the Unix socket transport for a role
pub fn for_role(role: Role, path: impl AsRef<Path>) -> Box<dyn Transport> {
    match role {
        Role::Initiator => Box::new(UnixInitiator::new(path)),
        Role::Acceptor => Box::new(UnixAcceptor::new(path)),
    }
}

/// Connects to an acceptor's socket
#[derive(Debug, Clone)]
pub struct UnixInitiator {
    path: PathBuf,
}

impl UnixInitiator {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl Transport for UnixInitiator {
    async fn establish(&mut self) -> Result<BoxedStream> {
        let stream = UnixStream::connect(&self.path).await?;
        Ok(Box::new(stream))
    }

    fn describe(&self) -> String {
        format!("unix:{}", self.path.display())
    }
}

/// Binds the socket for each attempt and hands over the first peer that connects
///
/// The socket file only exists while an accept is pending, so a second initiator
/// cannot queue up behind the one being served.
#[derive(Debug, Clone)]
pub struct UnixAcceptor {
    path: PathBuf,
}

impl UnixAcceptor {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl Transport for UnixAcceptor {
    async fn establish(&mut self) -> Result<BoxedStream> {
        let listener = UnixTransportListener::bind(&self.path)?;
        let stream = listener.accept().await?;
        Ok(Box::new(stream))
    }

    fn describe(&self) -> String {
        format!("unix:{}", self.path.display())
    }
}

/// Unix socket listener that removes its socket file when dropped
pub struct UnixTransportListener {
    listener: UnixListener,
    path: PathBuf,
}

impl UnixTransportListener {
    /// Bind to a Unix socket path
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Remove stale socket file if it exists
        if path.exists() {
            std::fs::remove_file(&path)?;
        }

        let listener = UnixListener::bind(&path)?;
        Ok(Self { listener, path })
    }

    /// Accept an incoming connection
    pub async fn accept(&self) -> Result<UnixStream> {
        let (stream, _) = self.listener.accept().await?;
        Ok(stream)
    }

    /// Get the path this listener is bound to
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UnixTransportListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
