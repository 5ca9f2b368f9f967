//! Connection lifecycle state machine
//!
//! ```text
//! Disconnected --start/retry--> Connecting --peer--> Connected
//!      ^                            |                    |
//!      +------timeout / error-------+----- I/O error ----+
//!
//! (any) --dispose--> Disposed
//! ```
//!
//! The link (read and write adapters over the peer stream) exists only while the state is
//! `Connected`; the stream being acquired during `Connecting` is owned by the pending
//! attempt and dropped with it.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::EndpointConfig;
use crate::error::{Error, Result};
use crate::frame::{FrameReader, FrameWriter};
use crate::transport::{BoxedStream, Transport};

/// Which side of the channel an endpoint plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Actively connects to the named channel
    Initiator,
    /// Listens for one incoming peer
    Acceptor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal
    Disposed,
}

impl State {
    pub fn is_disposed(&self) -> bool {
        matches!(self, Self::Disposed)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// Current state, observable from any thread
pub(crate) struct StateCell {
    tx: watch::Sender<State>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(State::Disconnected);
        Self { tx }
    }

    pub(crate) fn get(&self) -> State {
        *self.tx.borrow()
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.get().is_disposed()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<State> {
        self.tx.subscribe()
    }

    /// Move to `next` unless already disposed. Returns whether the state is now `next`.
    pub(crate) fn transition(&self, next: State) -> bool {
        let mut applied = false;
        self.tx.send_if_modified(|state| {
            if state.is_disposed() {
                return false;
            }
            applied = true;
            let changed = *state != next;
            *state = next;
            changed
        });
        applied
    }

    /// Enter the terminal state. Returns `false` if it was already entered.
    pub(crate) fn dispose(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if state.is_disposed() {
                return false;
            }
            *state = State::Disposed;
            true
        })
    }

    /// Resolves once the cell is disposed
    pub(crate) async fn disposed(mut rx: watch::Receiver<State>) {
        // An error means the sender is gone, which only happens on teardown.
        let _ = rx.wait_for(State::is_disposed).await;
    }
}

/// Read and write adapters over one peer stream
pub(crate) struct Link {
    pub(crate) reader: FrameReader<ReadHalf<BoxedStream>>,
    pub(crate) writer: FrameWriter<WriteHalf<BoxedStream>>,
}

impl Link {
    fn new(stream: BoxedStream, config: &EndpointConfig) -> Self {
        let (read, write) = tokio::io::split(stream);
        Self {
            reader: FrameReader::new(read, config.max_frame_len, config.frame_timeout),
            writer: FrameWriter::new(write, config.write_timeout),
        }
    }
}

/// Owns the transport and, while connected, the link
pub(crate) struct Connection {
    name: String,
    role: Role,
    transport: Box<dyn Transport>,
    link: Option<Link>,
    config: EndpointConfig,
}

impl Connection {
    pub(crate) fn new(
        name: String,
        role: Role,
        transport: Box<dyn Transport>,
        config: EndpointConfig,
    ) -> Self {
        Self {
            name,
            role,
            transport,
            link: None,
            config,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn link_mut(&mut self) -> Option<&mut Link> {
        self.link.as_mut()
    }

    pub(crate) fn connect_timeout(&self) -> Duration {
        self.config.connect_timeout
    }

    /// Run one connect/accept attempt
    ///
    /// A no-op while connecting or connected. The attempt is abandoned when the connect
    /// timeout expires or the endpoint is disposed; either way the state falls back to
    /// `Disconnected` and nothing acquired by the attempt survives.
    pub(crate) async fn connect(&mut self, state: &StateCell) -> Result<()> {
        match state.get() {
            State::Connected | State::Connecting => return Ok(()),
            State::Disposed => return Err(Error::Disposed),
            State::Disconnected => {}
        }
        if !state.transition(State::Connecting) {
            return Err(Error::Disposed);
        }
        debug!(channel = %self.name, role = ?self.role, via = %self.transport.describe(), "connecting");

        let timeout = self.config.connect_timeout;
        let attempt = tokio::time::timeout(timeout, self.transport.establish());
        let outcome = tokio::select! {
            result = attempt => match result {
                Ok(result) => result,
                Err(_) => Err(Error::ConnectTimeout(timeout)),
            },
            _ = StateCell::disposed(state.subscribe()) => Err(Error::Disposed),
        };

        match outcome {
            Ok(stream) => {
                let link = Link::new(stream, &self.config);
                if !state.transition(State::Connected) {
                    return Err(Error::Disposed);
                }
                self.link = Some(link);
                debug!(channel = %self.name, role = ?self.role, "connected");
                Ok(())
            }
            Err(err) => {
                state.transition(State::Disconnected);
                Err(err)
            }
        }
    }

    /// Tear down the link after an I/O failure
    pub(crate) fn fail(&mut self, state: &StateCell, err: &Error) {
        if self.link.take().is_some() {
            warn!(channel = %self.name, role = ?self.role, error = %err, "channel broken");
        }
        state.transition(State::Disconnected);
    }

    /// Drop the link without touching the state
    pub(crate) fn release(&mut self) {
        if self.link.take().is_some() {
            debug!(channel = %self.name, role = ?self.role, "link released");
        }
    }
}
