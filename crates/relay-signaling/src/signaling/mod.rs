//! Signaling side of the relay
//!
//! Generic signaling events, the negotiation messages embedded in them, the
//! payload text encoding and the traits through which the external
//! signaling transport is consumed.

pub mod events;
pub mod peer;
pub mod protocol;
pub mod wire;

pub use events::{ConnectionId, EventData, NetEventType, NetworkEvent};
pub use peer::{
    NetworkSink, PeerId, PeerPool, Protocol, SignalingHost, SignalingLink, SignalingPeer,
    SignalingPeerRef,
};
pub use protocol::{IceCandidate, NegotiationMessage, SdpType, SessionDescription};
pub use wire::{decode_wire_text, decode_wire_units, encode_wire_text, encode_wire_units};
