use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Connect timeout exceeded after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Write timeout exceeded after {0:?}")]
    WriteTimeout(Duration),

    #[error("Endpoint has not been started")]
    NotStarted,

    #[error("Endpoint is not in manual-check mode")]
    ManualCheckDisabled,

    #[error("Endpoint disposed")]
    Disposed,

    #[error("{0}")]
    Custom(String),
}

impl Error {
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Whether this error, raised on the I/O path, means the current link is unusable.
    ///
    /// Codec failures, including text rejected before it reaches the wire, only affect a
    /// single message.
    pub fn is_channel_broken(&self) -> bool {
        match self {
            Self::Io(_) | Self::ConnectionClosed | Self::WriteTimeout(_) | Self::InvalidFrame(_) => {
                true
            }
            Self::Codec(_)
            | Self::Custom(_)
            | Self::ConnectTimeout(_)
            | Self::NotStarted
            | Self::ManualCheckDisabled
            | Self::Disposed => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
