//! Tandem Link - Typed messaging between two local processes
//!
//! An [`Endpoint`] plays one of two roles on a named channel: the
//! [`Role::Initiator`] connects, the [`Role::Acceptor`] waits for one peer. Messages
//! are any serde type, written one per line through a pluggable [`Codec`] (JSON by
//! default) over a Unix domain socket.
//!
//! Endpoints heal themselves. Messages sent while the channel is down are buffered and
//! delivered once it is back, and a peer that disappears is waited for again with no
//! caller involvement. Only the first connect attempt made by [`Endpoint::start`] ever
//! reports an error.
//!
//! # Example
//!
//! ```no_run
//! use serde::{Deserialize, Serialize};
//! use tandem_link::{Endpoint, EndpointBuilder, EndpointConfig, Role};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct TestMessage { id: u32, data: String }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Process A
//! let acceptor: Endpoint<TestMessage> = Endpoint::acceptor("X");
//! acceptor.subscribe(|msg: &TestMessage| println!("{}: {}", msg.id, msg.data));
//! acceptor.start().await?;
//!
//! // Process B
//! let initiator: Endpoint<TestMessage> = EndpointBuilder::new(Role::Initiator, "X")
//!     .config(EndpointConfig::default())
//!     .build();
//! initiator.start().await?;
//! initiator.send_or_enqueue(TestMessage { id: 1, data: "hello".to_string() });
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod codec;
pub mod config;
pub mod connection;
mod driver;
pub mod endpoint;
pub mod error;
mod frame;
mod hub;
mod supervisor;
pub mod transport;

// Re-exports for convenience
pub use buffer::DrainOrder;
pub use codec::{BincodeCodec, Codec, JsonCodec};
pub use config::EndpointConfig;
pub use connection::{Role, State};
pub use endpoint::{Endpoint, EndpointBuilder, Message, WeakEndpoint};
pub use error::{Error, Result};
pub use transport::{BoxedStream, Transport};
