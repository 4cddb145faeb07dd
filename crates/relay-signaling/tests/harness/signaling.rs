//! In-memory signaling transport: client peers and server-controlled relay peers

use parking_lot::Mutex;
use relay_signaling::signaling::{decode_wire_text, encode_wire_text};
use relay_signaling::{
    ConnectionId, NetEventType, NetworkEvent, NetworkSink, PeerId, PeerPool, Protocol,
    SignalingHost, SignalingLink, SignalingPeer, SignalingPeerRef,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// What the pool told a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Listening(String),
    ListeningDenied(String),
    Incoming(PeerId),
    Outgoing(PeerId, ConnectionId),
    ConnectionDenied(String, ConnectionId),
}

/// Client-side signaling peer recording everything it is told
pub struct TestClient {
    id: PeerId,
    name: String,
    events: Mutex<Vec<ClientEvent>>,
}

impl TestClient {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            id: PeerId::new(),
            name: name.to_string(),
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn peer(self: &Arc<Self>) -> SignalingPeerRef {
        Arc::clone(self) as SignalingPeerRef
    }

    pub fn events(&self) -> Vec<ClientEvent> {
        self.events.lock().clone()
    }

    pub fn is_listening(&self, address: &str) -> bool {
        self.events()
            .contains(&ClientEvent::Listening(address.to_string()))
    }

    pub fn was_denied(&self, address: &str) -> bool {
        self.events()
            .contains(&ClientEvent::ListeningDenied(address.to_string()))
    }

    /// Peers that connected to this client
    pub fn incoming(&self) -> Vec<PeerId> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ClientEvent::Incoming(id) => Some(id),
                _ => None,
            })
            .collect()
    }
}

impl SignalingPeer for TestClient {
    fn id(&self) -> PeerId {
        self.id
    }

    fn identity(&self) -> String {
        self.name.clone()
    }

    fn accept_listening(&self, address: &str) {
        self.events
            .lock()
            .push(ClientEvent::Listening(address.to_string()));
    }

    fn deny_listening(&self, address: &str) {
        self.events
            .lock()
            .push(ClientEvent::ListeningDenied(address.to_string()));
    }

    fn accept_incoming_connection(&self, remote: &SignalingPeerRef) {
        self.events.lock().push(ClientEvent::Incoming(remote.id()));
    }

    fn accept_outgoing_connection(&self, remote: &SignalingPeerRef, id: ConnectionId) {
        self.events
            .lock()
            .push(ClientEvent::Outgoing(remote.id(), id));
    }

    fn deny_connection(&self, address: &str, id: ConnectionId) {
        self.events
            .lock()
            .push(ClientEvent::ConnectionDenied(address.to_string(), id));
    }
}

/// Server-controlled signaling peer driven by a relay leg's protocol
pub struct RelayPeer {
    id: PeerId,
    name: String,
    pool: Weak<dyn PeerPool>,
    protocol: Arc<dyn Protocol>,
    this: Weak<RelayPeer>,
    remote: Mutex<Option<(PeerId, ConnectionId)>>,
    denied: Mutex<Vec<String>>,
    events: Mutex<Vec<NetworkEvent>>,
    closed: AtomicBool,
}

impl RelayPeer {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Client this peer is connected to
    pub fn remote(&self) -> Option<(PeerId, ConnectionId)> {
        *self.remote.lock()
    }

    pub fn denied(&self) -> Vec<String> {
        self.denied.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Messages the relay leg sent towards its client
    pub fn sent_messages(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind == NetEventType::ReliableMessageReceived)
            .filter_map(|e| e.bytes().and_then(|b| decode_wire_text(b).ok()))
            .collect()
    }

    /// Every event the protocol delivered to this peer
    pub fn network_events(&self) -> Vec<NetworkEvent> {
        self.events.lock().clone()
    }

    /// Deliver a message from the connected client to the relay leg
    pub fn client_sends(&self, text: &str) {
        let id = self.remote().map(|(_, id)| id).unwrap_or(ConnectionId::INVALID);
        self.protocol
            .send(NetworkEvent::reliable_message(id, encode_wire_text(text)));
    }

    /// The connected client dropped its signaling connection
    pub fn client_disconnects(&self) {
        let id = self.remote().map(|(_, id)| id).unwrap_or(ConnectionId::INVALID);
        self.protocol
            .send(NetworkEvent::new(NetEventType::Disconnected, id));
    }

    fn self_ref(&self) -> Option<SignalingPeerRef> {
        self.this.upgrade().map(|peer| peer as SignalingPeerRef)
    }
}

impl SignalingPeer for RelayPeer {
    fn id(&self) -> PeerId {
        self.id
    }

    fn identity(&self) -> String {
        self.name.clone()
    }

    fn accept_listening(&self, _address: &str) {}

    fn deny_listening(&self, _address: &str) {}

    fn accept_incoming_connection(&self, remote: &SignalingPeerRef) {
        *self.remote.lock() = Some((remote.id(), ConnectionId::INVALID));
    }

    fn accept_outgoing_connection(&self, remote: &SignalingPeerRef, id: ConnectionId) {
        *self.remote.lock() = Some((remote.id(), id));
    }

    fn deny_connection(&self, address: &str, _id: ConnectionId) {
        self.denied.lock().push(address.to_string());
    }
}

impl NetworkSink for RelayPeer {
    fn on_network_event(&self, event: NetworkEvent) {
        self.events.lock().push(event.clone());

        if event.kind == NetEventType::NewConnection {
            let address = event.text().unwrap_or_default().to_string();
            if let (Some(pool), Some(me)) = (self.pool.upgrade(), self.self_ref()) {
                pool.on_connection_request(me, &address, event.connection_id);
            }
        }
    }

    fn on_network_closed(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let (Some(pool), Some(me)) = (self.pool.upgrade(), self.self_ref()) {
            pool.on_cleanup(&me);
        }
        self.protocol.dispose();
    }
}

/// Signaling host creating [`RelayPeer`]s
#[derive(Default)]
pub struct FakeHost {
    peers: Mutex<Vec<Arc<RelayPeer>>>,
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn peers(&self) -> Vec<Arc<RelayPeer>> {
        self.peers.lock().clone()
    }

    /// Relay peers whose name starts with `prefix`
    pub fn peers_named(&self, prefix: &str) -> Vec<Arc<RelayPeer>> {
        self.peers()
            .into_iter()
            .filter(|p| p.name().starts_with(prefix))
            .collect()
    }
}

impl SignalingHost for FakeHost {
    fn create_peer(
        &self,
        pool: Weak<dyn PeerPool>,
        protocol: Arc<dyn Protocol>,
        name: &str,
    ) -> SignalingLink {
        let peer = Arc::new_cyclic(|this| RelayPeer {
            id: PeerId::new(),
            name: name.to_string(),
            pool,
            protocol,
            this: this.clone(),
            remote: Mutex::new(None),
            denied: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        self.peers.lock().push(Arc::clone(&peer));

        SignalingLink {
            peer: Arc::clone(&peer) as SignalingPeerRef,
            sink: peer,
        }
    }
}
