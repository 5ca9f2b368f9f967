#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tandem_link::{Codec, Endpoint, EndpointBuilder, EndpointConfig, Role, State};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestMessage {
    pub id: u32,
    pub data: String,
}

pub fn msg(id: u32, data: &str) -> TestMessage {
    TestMessage {
        id,
        data: data.to_string(),
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Short timeouts so retry paths run quickly
pub fn config() -> EndpointConfig {
    EndpointConfig::default()
        .connect_timeout(Duration::from_secs(2))
        .poll_interval(Duration::from_millis(10))
}

pub fn endpoint(role: Role, path: &Path, config: EndpointConfig) -> Endpoint<TestMessage> {
    EndpointBuilder::new(role, path.to_str().unwrap())
        .config(config)
        .build()
}

/// Forward every received message into a channel
pub fn collect<C: Codec>(endpoint: &Endpoint<TestMessage, C>) -> mpsc::UnboundedReceiver<TestMessage> {
    let (tx, rx) = mpsc::unbounded_channel();
    endpoint.subscribe(move |msg: &TestMessage| {
        let _ = tx.send(msg.clone());
    });
    rx
}

pub async fn recv(inbox: &mut mpsc::UnboundedReceiver<TestMessage>) -> TestMessage {
    tokio::time::timeout(WAIT, inbox.recv())
        .await
        .expect("timed out waiting for a message")
        .expect("subscriber dropped")
}

pub async fn wait_for_state<C: Codec>(
    endpoint: &Endpoint<TestMessage, C>,
    predicate: impl FnMut(&State) -> bool,
) {
    let mut states = endpoint.state_changes();
    tokio::time::timeout(WAIT, states.wait_for(predicate))
        .await
        .expect("timed out waiting for state")
        .expect("state channel closed");
}

pub async fn wait_for_socket(path: &Path) {
    tokio::time::timeout(WAIT, async {
        while !path.exists() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("acceptor never bound its socket");
}

/// `start` on an acceptor waits for a peer, so run it alongside the test
pub fn start_in_background<C: Codec>(
    endpoint: &Endpoint<TestMessage, C>,
) -> JoinHandle<tandem_link::Result<()>> {
    let endpoint = endpoint.clone();
    tokio::spawn(async move { endpoint.start().await })
}

/// Start an acceptor/initiator pair and wait until both are connected
pub async fn connected_pair<C: Codec>(
    acceptor: &Endpoint<TestMessage, C>,
    initiator: &Endpoint<TestMessage, C>,
    path: &Path,
) {
    let accepting = start_in_background(acceptor);
    wait_for_socket(path).await;
    initiator.start().await.unwrap();
    accepting.await.unwrap().unwrap();
    wait_for_state(acceptor, |s| *s == State::Connected).await;
    wait_for_state(initiator, |s| *s == State::Connected).await;
}
