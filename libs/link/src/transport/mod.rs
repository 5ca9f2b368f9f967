use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

#[cfg(unix)]
pub mod unix;

#[cfg(unix)]
pub use self::unix::{socket_path, UnixAcceptor, UnixInitiator, UnixTransportListener};

/// A connected, bidirectional byte stream
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> Stream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type BoxedStream = Box<dyn Stream>;

/// Role-specific way of obtaining a peer connection for a named channel
///
/// An initiator connects, an acceptor waits for one incoming peer. Each call yields a
/// fresh connection; dropping the returned stream closes it. The endpoint bounds every
/// call with its connect timeout and may cancel it by dropping the future, so
/// implementations must release anything they acquired on drop.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Establish one connection
    async fn establish(&mut self) -> Result<BoxedStream>;

    /// Human-readable address, used in logs
    fn describe(&self) -> String;
}
