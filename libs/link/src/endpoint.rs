use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{watch, Mutex, Notify};
use tracing::{debug, info};

use crate::buffer::OutboundBuffer;
use crate::codec::{Codec, JsonCodec};
use crate::config::EndpointConfig;
use crate::connection::{Connection, Role, State, StateCell};
use crate::driver::{self, Driver};
use crate::error::{Error, Result};
use crate::hub::Hub;
use crate::transport::Transport;

/// Anything that can travel over an endpoint
pub trait Message: Serialize + DeserializeOwned + Send + 'static {}

impl<T> Message for T where T: Serialize + DeserializeOwned + Send + 'static {}

/// State shared between the endpoint handles and the driver task
pub(crate) struct Shared<M, C> {
    pub(crate) name: String,
    pub(crate) role: Role,
    pub(crate) config: EndpointConfig,
    pub(crate) codec: C,
    pub(crate) state: StateCell,
    pub(crate) buffer: OutboundBuffer<M>,
    pub(crate) hub: Hub<M>,
    pub(crate) started: AtomicBool,
    pub(crate) wake: Notify,
    pub(crate) driver: Mutex<Driver>,
}

impl<M, C> Shared<M, C> {
    fn dispose(&self) {
        if !self.state.dispose() {
            return;
        }
        self.buffer.clear();
        self.wake.notify_one();
        // A running cycle releases the link itself when it sees the new state.
        if let Ok(mut driver) = self.driver.try_lock() {
            driver.release();
        }
        info!(channel = %self.name, role = ?self.role, "endpoint disposed");
    }
}

/// Disposes the endpoint once the last handle goes away
struct Handle<M, C> {
    shared: Arc<Shared<M, C>>,
}

impl<M, C> Drop for Handle<M, C> {
    fn drop(&mut self) {
        self.shared.dispose();
    }
}

/// One side of a typed messaging session over a named local channel
///
/// Cloning is cheap and every clone refers to the same endpoint. Once started, the
/// endpoint keeps itself connected: failures drop it back to `Disconnected` and it
/// retries every poll cycle until disposed.
///
/// ```no_run
/// use serde::{Deserialize, Serialize};
/// use tandem_link::Endpoint;
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Ping { id: u32 }
///
/// # async fn example() -> tandem_link::Result<()> {
/// let acceptor: Endpoint<Ping> = Endpoint::acceptor("pings");
/// acceptor.subscribe(|ping: &Ping| println!("got {}", ping.id));
/// acceptor.start().await?;
/// # Ok(())
/// # }
/// ```
pub struct Endpoint<M, C = JsonCodec> {
    handle: Arc<Handle<M, C>>,
}

impl<M, C> Clone for Endpoint<M, C> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
        }
    }
}

impl<M: Message> Endpoint<M, JsonCodec> {
    /// Create a JSON endpoint over a Unix domain socket
    pub fn new(role: Role, name: impl Into<String>, manual_check: bool) -> Self {
        EndpointBuilder::new(role, name)
            .manual_check(manual_check)
            .build()
    }

    /// Create an endpoint that connects to `name`
    pub fn initiator(name: impl Into<String>) -> Self {
        Self::new(Role::Initiator, name, false)
    }

    /// Create an endpoint that waits for a peer on `name`
    pub fn acceptor(name: impl Into<String>) -> Self {
        Self::new(Role::Acceptor, name, false)
    }
}

impl<M: Message, C: Codec> Endpoint<M, C> {
    fn shared(&self) -> &Arc<Shared<M, C>> {
        &self.handle.shared
    }

    /// Make the first connect/accept attempt and, in automatic mode, spawn the driver
    ///
    /// Must be called from within a Tokio runtime. The error of the first attempt is
    /// returned to the caller, but the endpoint stays started and keeps retrying in the
    /// background. Calling `start` again, or on a disposed endpoint, does nothing.
    pub async fn start(&self) -> Result<()> {
        let shared = self.shared();
        if shared.state.is_disposed() {
            debug!(channel = %shared.name, "start ignored, endpoint disposed");
            return Ok(());
        }
        if shared.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        info!(
            channel = %shared.name,
            role = ?shared.role,
            manual = shared.config.manual_check,
            "starting endpoint"
        );
        let first = shared.driver.lock().await.connect(&shared.state).await;

        if !shared.config.manual_check {
            tokio::spawn(driver::run(shared.clone()));
        }

        match first {
            Err(Error::Disposed) => Ok(()),
            other => other,
        }
    }

    /// Hand a message to the endpoint for delivery
    ///
    /// Returns `false` if the endpoint was never started or has been disposed.
    /// Otherwise the message is buffered and written by the driver as soon as the
    /// channel is connected.
    pub fn send_or_enqueue(&self, message: M) -> bool {
        let shared = self.shared();
        if !shared.started.load(Ordering::Acquire) || shared.state.is_disposed() {
            return false;
        }
        shared.buffer.push(message);
        if shared.state.is_disposed() {
            // Disposed between the check and the push, after its clear already ran.
            shared.buffer.clear();
            return false;
        }
        shared.wake.notify_one();
        true
    }

    /// Run exactly one poll cycle (manual-check mode only)
    ///
    /// Returns whether an inbound frame was consumed. A no-op on a disposed endpoint.
    pub async fn force_check(&self) -> Result<bool> {
        let shared = self.shared();
        if !shared.config.manual_check {
            return Err(Error::ManualCheckDisabled);
        }
        if shared.state.is_disposed() {
            return Ok(false);
        }
        if !shared.started.load(Ordering::Acquire) {
            return Err(Error::NotStarted);
        }

        let cycle = shared.driver.lock().await.cycle(shared).await;
        Ok(cycle.received)
    }

    /// Tear the endpoint down: stop the driver, close the channel, drop buffered messages
    ///
    /// Safe to call any number of times from any thread.
    pub fn dispose(&self) {
        self.shared().dispose();
    }

    /// Register a callback for every decoded inbound message
    ///
    /// Callbacks run on the driver in registration order. A panic is caught and logged.
    ///
    /// Callbacks live as long as the endpoint, so one that owns a clone of this endpoint
    /// keeps it from ever being dropped. Capture a [`WeakEndpoint`] from
    /// [`Endpoint::downgrade`] instead.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&M) + Send + Sync + 'static,
    {
        self.shared().hub.subscribe(callback);
    }

    /// Register a fallible callback; errors are logged and otherwise ignored
    pub fn try_subscribe<F, E>(&self, callback: F)
    where
        F: Fn(&M) -> std::result::Result<(), E> + Send + Sync + 'static,
        E: fmt::Display,
    {
        self.shared().hub.try_subscribe(callback);
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared().hub.len()
    }

    pub fn state(&self) -> State {
        self.shared().state.get()
    }

    /// Watch state transitions
    pub fn state_changes(&self) -> watch::Receiver<State> {
        self.shared().state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == State::Connected
    }

    pub fn is_started(&self) -> bool {
        self.shared().started.load(Ordering::Acquire)
    }

    /// Number of messages waiting in the outbound buffer
    pub fn pending(&self) -> usize {
        self.shared().buffer.len()
    }

    pub fn name(&self) -> &str {
        &self.shared().name
    }

    pub fn role(&self) -> Role {
        self.shared().role
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.shared().config
    }
}

impl<M, C> Endpoint<M, C> {
    /// A handle that does not keep the endpoint alive
    pub fn downgrade(&self) -> WeakEndpoint<M, C> {
        WeakEndpoint {
            handle: Arc::downgrade(&self.handle),
        }
    }
}

/// Non-owning reference to an [`Endpoint`]
pub struct WeakEndpoint<M, C = JsonCodec> {
    handle: Weak<Handle<M, C>>,
}

impl<M, C> WeakEndpoint<M, C> {
    /// The endpoint, unless its last strong handle is gone
    pub fn upgrade(&self) -> Option<Endpoint<M, C>> {
        self.handle.upgrade().map(|handle| Endpoint { handle })
    }
}

impl<M, C> Clone for WeakEndpoint<M, C> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
        }
    }
}

impl<M, C> fmt::Debug for Endpoint<M, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = &self.handle.shared;
        f.debug_struct("Endpoint")
            .field("name", &shared.name)
            .field("role", &shared.role)
            .field("state", &shared.state.get())
            .field("pending", &shared.buffer.len())
            .finish()
    }
}

/// Builder for configuring an endpoint
pub struct EndpointBuilder<C = JsonCodec> {
    role: Role,
    name: String,
    codec: C,
    config: EndpointConfig,
    transport: Option<Box<dyn Transport>>,
}

impl EndpointBuilder<JsonCodec> {
    /// Create a new builder with JSON framing and the default configuration
    pub fn new(role: Role, name: impl Into<String>) -> Self {
        Self {
            role,
            name: name.into(),
            codec: JsonCodec,
            config: EndpointConfig::default(),
            transport: None,
        }
    }
}

impl<C: Codec> EndpointBuilder<C> {
    /// Use a different codec
    pub fn codec<C2: Codec>(self, codec: C2) -> EndpointBuilder<C2> {
        EndpointBuilder {
            role: self.role,
            name: self.name,
            codec,
            config: self.config,
            transport: self.transport,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: EndpointConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable or disable manual-check mode
    pub fn manual_check(mut self, manual: bool) -> Self {
        self.config.manual_check = manual;
        self
    }

    /// Use a custom channel primitive instead of the Unix socket derived from the name
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Build the endpoint, initially `Disconnected`
    pub fn build<M: Message>(self) -> Endpoint<M, C> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport(self.role, &self.name),
        };
        let connection = Connection::new(
            self.name.clone(),
            self.role,
            transport,
            self.config.clone(),
        );

        let shared = Shared {
            buffer: OutboundBuffer::new(self.config.drain_order),
            name: self.name,
            role: self.role,
            config: self.config,
            codec: self.codec,
            state: StateCell::new(),
            hub: Hub::new(),
            started: AtomicBool::new(false),
            wake: Notify::new(),
            driver: Mutex::new(Driver::new(connection)),
        };

        Endpoint {
            handle: Arc::new(Handle {
                shared: Arc::new(shared),
            }),
        }
    }
}

#[cfg(unix)]
fn default_transport(role: Role, name: &str) -> Box<dyn Transport> {
    crate::transport::unix::for_role(role, crate::transport::socket_path(name))
}

#[cfg(not(unix))]
fn default_transport(_role: Role, name: &str) -> Box<dyn Transport> {
    Box::new(Unsupported(name.to_string()))
}

#[cfg(not(unix))]
struct Unsupported(String);

#[cfg(not(unix))]
#[async_trait::async_trait]
impl Transport for Unsupported {
    async fn establish(&mut self) -> Result<crate::transport::BoxedStream> {
        Err(Error::custom(
            "No built-in local socket transport on this platform; supply one with EndpointBuilder::transport",
        ))
    }

    fn describe(&self) -> String {
        self.0.clone()
    }
}
