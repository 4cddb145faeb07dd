//! Relay integration test harness
//!
//! Provides in-memory stand-ins for the two collaborators of the relay:
//! - [`FakeEngine`]: media engine whose endpoints record calls and emit
//!   transport signals on demand
//! - [`FakeHost`]: signaling host whose relay peers route connection requests
//!   back through the pool, like the real transport does
//!
//! plus [`TestClient`], a client signaling peer recording what the pool tells it.

#![allow(dead_code)]

pub mod engine;
pub mod signaling;

use relay_signaling::{PeerConfig, RelayAppConfig, RelayController};
use std::sync::Arc;
use std::time::Duration;

pub use engine::{FakeEndpoint, FakeEngine};
pub use signaling::{ClientEvent, FakeHost, RelayPeer, TestClient};

/// Controller wired to a fake engine and a fake signaling host
pub struct RelayHarness {
    pub engine: Arc<FakeEngine>,
    pub host: Arc<FakeHost>,
    pub controller: Arc<RelayController>,
}

impl RelayHarness {
    /// Relay application with default settings
    pub fn new() -> Self {
        Self::with_config(RelayAppConfig::relay("test-relay"), PeerConfig::default())
    }

    pub fn with_config(app: RelayAppConfig, peer: PeerConfig) -> Self {
        init_tracing();

        let engine = FakeEngine::new();
        let host = FakeHost::new();
        let controller = RelayController::new(app, peer, engine.clone(), host.clone())
            .expect("valid test configuration");

        Self {
            engine,
            host,
            controller,
        }
    }

    /// Listen on `address` and wait for any relay leg construction to finish
    pub async fn listen(&self, client: &Arc<TestClient>, address: &str) -> bool {
        let admission = self.controller.admit(client.peer(), address);
        let accepted = admission.is_accepted();
        admission.wait().await;
        settle().await;
        accepted
    }

    /// Start publishing on `address` and return the source leg's signaling peer
    pub async fn publish(&self, client: &Arc<TestClient>, address: &str) -> Arc<RelayPeer> {
        assert!(self.listen(client, address).await, "publish on {} denied", address);
        self.host
            .peers_named("relay-in-")
            .pop()
            .expect("source relay peer created")
    }

    /// Start viewing on `address` and return the sink leg's signaling peer
    pub async fn view(&self, client: &Arc<TestClient>, address: &str) -> Arc<RelayPeer> {
        assert!(self.listen(client, address).await, "view on {} denied", address);
        self.host
            .peers_named("relay-out-")
            .pop()
            .expect("sink relay peer created")
    }
}

/// Let spawned tasks (bridge pumps, state watchers) run
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
