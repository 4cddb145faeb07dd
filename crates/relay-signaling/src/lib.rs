//! Relay control plane for a media switching engine
//!
//! This crate lets clients of a peer-to-peer signaling transport publish a
//! stream once and have it relayed to any number of viewers through an
//! external media switching engine.
//!
//! # Features
//!
//! - **Address registry**: one source per `<name>_snd` address, any number of
//!   sinks on `<name>_rec`, plain rendezvous (optionally shared) otherwise
//! - **Relay leg lifecycle**: Connecting/Connected/Closed state machine with a
//!   connect timeout and idempotent close
//! - **Cascade cleanup**: closing a source closes every sink consuming it
//! - **Signaling bridge**: offer/answer/candidate JSON carried in generic
//!   reliable messages, so unmodified clients talk to relay legs
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Clients                                                     │
//! │  ↓ (signaling transport: sockets, framing, SignalingPeers)   │
//! │  RelayController (PeerPool)                                  │
//! │  ├─ ListenerTable (address -> listening peers)               │
//! │  ├─ senders:   _snd address -> SenderLeg                     │
//! │  └─ receivers: _snd address -> [ReceiverLeg]                 │
//! │     ↓                                                        │
//! │  RelaySessionFactory                                         │
//! │  ├─ SourcePeer / SinkPeer (PeerConnection state machine)     │
//! │  ├─ ProtocolBridge (negotiation JSON <-> NetworkEvent)       │
//! │  └─ SignalingHost::create_peer (server-controlled peer)      │
//! │     ↓                                                        │
//! │  MediaEngine (endpoints, producers, consumers)               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use relay_signaling::{RelayAppConfig, RelayServerConfig};
//!
//! let config = RelayServerConfig::from_json(
//!     r#"{"apps":[{"name":"relay","path":"/relay","relay":true}]}"#,
//! )
//! .unwrap();
//!
//! let app: &RelayAppConfig = config.app("/relay").unwrap();
//! assert!(app.relay);
//! assert_eq!(config.peer.connect_timeout_ms, 15_000);
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod peer;
pub mod relay;
pub mod session;
pub mod signaling;

pub use config::{PeerConfig, RelayAppConfig, RelayServerConfig};
pub use engine::{
    DtlsState, IceState, MediaEngine, MediaTransport, SctpState, SinkEndpoint, SourceEndpoint,
    TransportSignal,
};
pub use error::{Error, Result};
pub use peer::{ConnectionState, ListenerId, PeerConnection, SinkPeer, SourcePeer};
pub use relay::{to_sender_address, Admission, AddressKind, RelayController};
pub use session::{
    LegId, ProtocolBridge, ReceiverLeg, RelaySessionFactory, SenderLeg, SINK_CONNECTION_ID,
    SOURCE_CONNECTION_ID,
};
pub use signaling::{
    ConnectionId, NegotiationMessage, NetEventType, NetworkEvent, NetworkSink, PeerId, PeerPool,
    Protocol, SignalingHost, SignalingLink, SignalingPeer, SignalingPeerRef,
};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
