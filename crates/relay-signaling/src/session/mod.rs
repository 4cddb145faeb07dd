//! Relay session construction
//!
//! A relay leg is three objects wired together:
//!
//! - the media side: a [`SourcePeer`] or [`SinkPeer`] around an engine endpoint
//! - a [`ProtocolBridge`] translating signaling events for that leg
//! - the server-controlled signaling peer the bridge drives
//!
//! [`RelaySessionFactory`] builds them; the controller decides when.

pub mod bridge;

pub use bridge::{
    BridgeRole, ProtocolBridge, HANDSHAKE_REPLY, SINK_CONNECTION_ID, SOURCE_CONNECTION_ID,
};

use crate::config::PeerConfig;
use crate::engine::MediaEngine;
use crate::peer::{ConnectionState, SinkPeer, SourcePeer};
use crate::signaling::{PeerPool, Protocol, SignalingHost, SignalingLink, SignalingPeerRef};
use crate::{Error, Result};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info, Span};
use uuid::Uuid;

/// Identifier of one relay leg, assigned before construction starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LegId(pub Uuid);

impl LegId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LegId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LegId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source leg registered under a `_snd` address
pub struct SenderLeg {
    id: LegId,
    address: String,
    peer: SourcePeer,
    bridge: ProtocolBridge,
    link: SignalingLink,
}

/// Sink leg serving one viewer of a source
pub struct ReceiverLeg {
    id: LegId,
    /// Address the viewer listens on (the `_rec` address)
    address: String,
    peer: SinkPeer,
    bridge: ProtocolBridge,
    link: SignalingLink,
}

impl SenderLeg {
    pub fn id(&self) -> LegId {
        self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn peer(&self) -> &SourcePeer {
        &self.peer
    }

    pub fn bridge(&self) -> &ProtocolBridge {
        &self.bridge
    }

    /// Server-controlled signaling peer of this leg
    pub fn signaling(&self) -> &SignalingLink {
        &self.link
    }

    pub fn state(&self) -> ConnectionState {
        self.peer.state()
    }

    /// Open the signaling connection to the publishing client
    pub async fn connect(&self) -> Result<()> {
        self.bridge.trigger_connection_request(&self.address).await
    }

    /// Close the media side and the signaling side. Idempotent.
    pub fn close(&self) {
        self.peer.close();
        self.bridge.trigger_closure();
    }
}

impl ReceiverLeg {
    pub fn id(&self) -> LegId {
        self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn peer(&self) -> &SinkPeer {
        &self.peer
    }

    pub fn bridge(&self) -> &ProtocolBridge {
        &self.bridge
    }

    /// Server-controlled signaling peer of this leg
    pub fn signaling(&self) -> &SignalingLink {
        &self.link
    }

    pub fn state(&self) -> ConnectionState {
        self.peer.state()
    }

    /// Open the signaling connection to the viewer and send the offer
    pub async fn connect(&self) -> Result<()> {
        self.bridge.trigger_connection_request(&self.address).await
    }

    /// Close the media side and the signaling side. Idempotent.
    pub fn close(&self) {
        self.peer.close();
        self.bridge.trigger_closure();
    }
}

/// Builds relay legs from the media engine and the signaling host
pub struct RelaySessionFactory {
    engine: Arc<dyn MediaEngine>,
    host: Arc<dyn SignalingHost>,
    config: PeerConfig,
}

impl RelaySessionFactory {
    pub fn new(engine: Arc<dyn MediaEngine>, host: Arc<dyn SignalingHost>, config: PeerConfig) -> Self {
        Self {
            engine,
            host,
            config,
        }
    }

    pub fn peer_config(&self) -> &PeerConfig {
        &self.config
    }

    /// Build a source leg for `client` publishing on `address`
    ///
    /// The leg's state machine is started; its signaling connection is not
    /// opened yet (see [`SenderLeg::connect`]).
    pub async fn create_source(
        &self,
        id: LegId,
        address: &str,
        client: &SignalingPeerRef,
        pool: Weak<dyn PeerPool>,
        parent: &Span,
    ) -> Result<SenderLeg> {
        debug!(parent: parent, "Creating incoming relay for {}", address);
        let endpoint = self.engine.create_incoming_endpoint().await?;

        let name = format!("relay-in-{}", client.identity());
        let peer = SourcePeer::new(name.clone(), endpoint, &self.config, parent);
        peer.start();

        let bridge = ProtocolBridge::source(peer.clone(), peer.connection().span());
        let link = self.host.create_peer(pool, Arc::new(bridge.clone()) as Arc<dyn Protocol>, &name);
        bridge.attach(Arc::clone(&link.sink));

        info!(parent: parent, "Created sender {} for {}", id, address);

        Ok(SenderLeg {
            id,
            address: address.to_string(),
            peer,
            bridge,
            link,
        })
    }

    /// Build a sink leg consuming `source` for `client` listening on `address`
    ///
    /// # Errors
    ///
    /// Fails if the engine cannot create the endpoint or if `source` closed
    /// while the endpoint was being created.
    pub async fn create_sink(
        &self,
        id: LegId,
        address: &str,
        source: &SourcePeer,
        client: &SignalingPeerRef,
        pool: Weak<dyn PeerPool>,
        parent: &Span,
    ) -> Result<ReceiverLeg> {
        debug!(parent: parent, "Creating outgoing relay for {}", address);
        let endpoint = self.engine.create_outgoing_endpoint(source.endpoint()).await?;

        let name = format!("relay-out-{}", client.identity());
        let peer = SinkPeer::new(name.clone(), endpoint, &self.config, parent);

        if !source.add_consumer(peer.clone()) {
            return Err(Error::PeerClosed(format!(
                "source of {} closed before its consumer was ready",
                address
            )));
        }
        peer.start();

        let bridge = ProtocolBridge::sink(peer.clone(), peer.connection().span());
        let link = self.host.create_peer(pool, Arc::new(bridge.clone()) as Arc<dyn Protocol>, &name);
        bridge.attach(Arc::clone(&link.sink));

        info!(parent: parent, "Created receiver {} for {}", id, address);

        Ok(ReceiverLeg {
            id,
            address: address.to_string(),
            peer,
            bridge,
            link,
        })
    }
}
