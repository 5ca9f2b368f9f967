use tracing::{debug, info, trace};

use crate::connection::{Connection, State, StateCell};
use crate::error::{Error, Result};

/// Re-establishes the channel whenever a cycle finds it down
///
/// Retries are unconditional: one attempt per poll cycle, no backoff, until the endpoint
/// is disposed. Only the first failure of a streak is logged above `trace`.
#[derive(Debug, Default)]
pub(crate) struct Supervisor {
    /// Consecutive failed attempts since the last successful connect
    failures: u64,
}

impl Supervisor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make one attempt if the connection is down
    pub(crate) async fn ensure(&mut self, conn: &mut Connection, state: &StateCell) -> Result<()> {
        if state.get() != State::Disconnected {
            return Ok(());
        }

        match conn.connect(state).await {
            Ok(()) => {
                if self.failures > 0 {
                    info!(channel = %conn.name(), attempts = self.failures, "reconnected after failed attempts");
                }
                self.failures = 0;
                Ok(())
            }
            Err(Error::Disposed) => Err(Error::Disposed),
            Err(err) => {
                self.failures = self.failures.saturating_add(1);
                if self.failures == 1 {
                    debug!(
                        channel = %conn.name(),
                        error = %err,
                        timeout = ?conn.connect_timeout(),
                        "connect attempt failed, retrying every cycle"
                    );
                } else {
                    trace!(channel = %conn.name(), error = %err, attempt = self.failures, "connect attempt failed");
                }
                Err(err)
            }
        }
    }

    /// Record that a live link just broke
    pub(crate) fn channel_broken(&mut self, conn: &mut Connection, state: &StateCell, err: &Error) {
        conn.fail(state, err);
        self.failures = 0;
    }
}
