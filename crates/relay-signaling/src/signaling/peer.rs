//! Seams to the signaling transport
//!
//! The transport framework (socket admission, framing, per-client signaling
//! peers) lives outside this crate. It talks to the relay through these
//! traits:
//!
//! - [`SignalingPeer`]: one signaling endpoint, either a real client or a
//!   server-controlled relay leg
//! - [`PeerPool`]: the admission policy the transport consults
//! - [`Protocol`] / [`NetworkSink`]: the two directions of a server-controlled
//!   signaling peer, wired together by a [`SignalingHost`]

use super::events::{ConnectionId, NetworkEvent};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// Unique signaling peer identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(pub Uuid);

impl PeerId {
    /// Generate a new random peer ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for PeerId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Shared handle to a signaling peer
pub type SignalingPeerRef = Arc<dyn SignalingPeer>;

/// A signaling endpoint as seen by a peer pool
pub trait SignalingPeer: Send + Sync {
    /// Stable peer identifier
    fn id(&self) -> PeerId;

    /// Human readable identity for log output
    fn identity(&self) -> String {
        self.id().to_string()
    }

    /// Tell the peer it is now listening on `address`
    fn accept_listening(&self, address: &str);

    /// Tell the peer its listening request for `address` was refused
    fn deny_listening(&self, address: &str);

    /// Tell the peer `remote` connected to it
    fn accept_incoming_connection(&self, remote: &SignalingPeerRef);

    /// Tell the peer its connection request `id` reached `remote`
    fn accept_outgoing_connection(&self, remote: &SignalingPeerRef, id: ConnectionId);

    /// Tell the peer its connection request `id` to `address` failed
    fn deny_connection(&self, address: &str, id: ConnectionId);
}

/// Receiving side of a server-controlled signaling peer
///
/// A [`Protocol`] pushes everything it wants the signaling peer to see through
/// this sink.
pub trait NetworkSink: Send + Sync {
    /// Deliver an event as if it arrived from the network
    fn on_network_event(&self, event: NetworkEvent);

    /// Report that the underlying network connection is gone
    fn on_network_closed(&self);
}

/// Network side of a server-controlled signaling peer
///
/// The signaling peer calls [`Protocol::send`] with every event a remote
/// client addresses to it.
pub trait Protocol: Send + Sync {
    /// Handle an event sent by the remote side
    fn send(&self, event: NetworkEvent);

    /// Release the protocol; later closure requests are ignored
    fn dispose(&self);

    /// Identity for log output
    fn identity(&self) -> String;
}

/// Admission policy consulted by the signaling transport
pub trait PeerPool: Send + Sync {
    /// Track a new signaling connection
    fn add_connection(&self, peer: SignalingPeerRef);

    /// A peer wants to listen on `address`
    fn on_listening_request(&self, peer: SignalingPeerRef, address: &str);

    /// A peer released `address` (explicitly or because its session ended)
    fn on_stop_listening(&self, peer: &SignalingPeerRef, address: &str);

    /// A peer wants to connect to whoever listens on `address`
    fn on_connection_request(&self, peer: SignalingPeerRef, address: &str, id: ConnectionId);

    /// A signaling connection ended and can be forgotten
    fn on_cleanup(&self, peer: &SignalingPeerRef);
}

/// Both halves of a server-controlled signaling peer
#[derive(Clone)]
pub struct SignalingLink {
    /// The peer as it appears to the pool and to other peers
    pub peer: SignalingPeerRef,

    /// Where the protocol delivers events for this peer
    pub sink: Arc<dyn NetworkSink>,
}

impl fmt::Debug for SignalingLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalingLink")
            .field("peer", &self.peer.identity())
            .finish()
    }
}

/// Factory for server-controlled signaling peers
pub trait SignalingHost: Send + Sync {
    /// Create a signaling peer driven by `protocol`
    ///
    /// Requests the new peer raises (e.g. a connection request triggered by a
    /// `NewConnection` event) are routed to `pool`.
    fn create_peer(&self, pool: Weak<dyn PeerPool>, protocol: Arc<dyn Protocol>, name: &str) -> SignalingLink;
}
