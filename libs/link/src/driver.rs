//! Poll & dispatch loop
//!
//! One driver per endpoint performs every channel operation: reconnecting, draining
//! the outbound buffer and reading inbound frames. It runs as a background task, or in
//! manual-check mode one cycle at a time through `Endpoint::force_check`. Either way the
//! driver sits behind the endpoint's async mutex, so cycles never overlap.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::codec::Codec;
use crate::connection::{Connection, State, StateCell};
use crate::endpoint::{Message, Shared};
use crate::error::{Error, Result};
use crate::supervisor::Supervisor;

/// What a single cycle observed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Cycle {
    /// An inbound frame was consumed (whether or not it decoded)
    pub(crate) received: bool,
}

pub(crate) struct Driver {
    connection: Connection,
    supervisor: Supervisor,
}

impl Driver {
    pub(crate) fn new(connection: Connection) -> Self {
        Self {
            connection,
            supervisor: Supervisor::new(),
        }
    }

    /// One connect attempt; used by `start` so the first failure reaches the caller
    pub(crate) async fn connect(&mut self, state: &StateCell) -> Result<()> {
        self.supervisor.ensure(&mut self.connection, state).await
    }

    /// Run the cycle body once
    pub(crate) async fn cycle<M: Message, C: Codec>(&mut self, shared: &Shared<M, C>) -> Cycle {
        if shared.state.is_disposed() {
            self.shutdown(shared);
            return Cycle::default();
        }

        if shared.state.get() != State::Connected {
            // Failures leave the endpoint disconnected; the next cycle tries again.
            let _ = self.supervisor.ensure(&mut self.connection, &shared.state).await;
        }

        if shared.state.get() == State::Connected && !shared.buffer.is_empty() {
            self.drain(shared).await;
        }

        let received = if shared.state.get() == State::Connected {
            self.receive(shared).await
        } else {
            false
        };

        if shared.state.is_disposed() {
            self.shutdown(shared);
        }
        Cycle { received }
    }

    /// Write buffered messages until the buffer is empty or a write fails
    async fn drain<M: Message, C: Codec>(&mut self, shared: &Shared<M, C>) {
        let mut sent = 0usize;
        while !shared.state.is_disposed() {
            let Some(message) = shared.buffer.pop() else {
                break;
            };

            let line = match shared.codec.encode(&message) {
                Ok(line) => line,
                Err(err) => {
                    warn!(channel = %shared.name, error = %err, "dropping message that failed to encode");
                    continue;
                }
            };

            let Some(link) = self.connection.link_mut() else {
                shared.buffer.restore(message);
                break;
            };

            match link.writer.write_frame(&line).await {
                Ok(()) => sent += 1,
                Err(err) if err.is_channel_broken() => {
                    shared.buffer.restore(message);
                    self.supervisor
                        .channel_broken(&mut self.connection, &shared.state, &err);
                    break;
                }
                Err(err) => {
                    warn!(channel = %shared.name, error = %err, "dropping message rejected by framing");
                }
            }
        }

        if sent > 0 {
            trace!(channel = %shared.name, sent, left = shared.buffer.len(), "drained outbound buffer");
        }
    }

    /// Read at most one inbound frame and hand it to the subscribers
    async fn receive<M: Message, C: Codec>(&mut self, shared: &Shared<M, C>) -> bool {
        let Some(link) = self.connection.link_mut() else {
            return false;
        };

        match link.reader.try_read_frame().await {
            Ok(None) => false,
            Ok(Some(frame)) => {
                dispatch(shared, &frame);
                true
            }
            Err(err) => {
                self.supervisor
                    .channel_broken(&mut self.connection, &shared.state, &err);
                false
            }
        }
    }

    /// Drop the link, if any
    pub(crate) fn release(&mut self) {
        self.connection.release();
    }

    fn shutdown<M, C>(&mut self, shared: &Shared<M, C>) {
        self.connection.release();
        shared.buffer.clear();
    }
}

fn dispatch<M: Message, C: Codec>(shared: &Shared<M, C>, frame: &[u8]) {
    let decoded = std::str::from_utf8(frame)
        .map_err(|e| Error::Codec(e.to_string()))
        .and_then(|line| shared.codec.decode::<M>(line));

    match decoded {
        Ok(message) => {
            let faults = shared.hub.dispatch(&message);
            trace!(channel = %shared.name, faults, "dispatched inbound message");
        }
        Err(err) => {
            debug!(channel = %shared.name, error = %err, bytes = frame.len(), "dropping malformed frame");
        }
    }
}

/// Background loop for automatic mode; returns once the endpoint is disposed
pub(crate) async fn run<M: Message, C: Codec>(shared: Arc<Shared<M, C>>) {
    debug!(channel = %shared.name, role = ?shared.role, "driver started");

    while !shared.state.is_disposed() {
        let cycle = shared.driver.lock().await.cycle(&shared).await;
        if cycle.received {
            continue;
        }

        tokio::select! {
            _ = tokio::time::sleep(shared.config.poll_interval) => {}
            _ = shared.wake.notified() => {}
            _ = StateCell::disposed(shared.state.subscribe()) => {}
        }
    }

    shared.driver.lock().await.shutdown(&shared);
    debug!(channel = %shared.name, role = ?shared.role, "driver stopped");
}
