//! Generic signaling events exchanged between signaling peers and protocols

use bytes::Bytes;
use std::fmt;

/// Connection identifier scoped to one signaling peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub i16);

impl ConnectionId {
    /// Marker for "no connection"
    pub const INVALID: ConnectionId = ConnectionId(-1);
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of a signaling network event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetEventType {
    /// Unreliable message received from a connection
    UnreliableMessageReceived,
    /// Reliable message received from a connection
    ReliableMessageReceived,
    /// Listening on an address succeeded
    ServerInitialized,
    /// Listening on an address failed
    ServerInitFailed,
    /// Listening on an address stopped
    ServerClosed,
    /// A new connection was established (or requested, when produced by a protocol)
    NewConnection,
    /// An outgoing connection attempt failed
    ConnectionFailed,
    /// A connection was closed
    Disconnected,
}

/// Payload attached to a network event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventData {
    /// No payload
    None,
    /// Text payload (addresses, error descriptions)
    Text(String),
    /// Raw message bytes
    Bytes(Bytes),
}

/// A single signaling event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkEvent {
    /// Event kind
    pub kind: NetEventType,
    /// Connection the event belongs to
    pub connection_id: ConnectionId,
    /// Attached payload
    pub data: EventData,
}

impl NetworkEvent {
    /// Create an event without payload
    pub fn new(kind: NetEventType, connection_id: ConnectionId) -> Self {
        Self {
            kind,
            connection_id,
            data: EventData::None,
        }
    }

    /// Create an event carrying text (e.g. the address of a new connection)
    pub fn with_text(kind: NetEventType, connection_id: ConnectionId, text: impl Into<String>) -> Self {
        Self {
            kind,
            connection_id,
            data: EventData::Text(text.into()),
        }
    }

    /// Create a reliable message event carrying raw bytes
    pub fn reliable_message(connection_id: ConnectionId, payload: Bytes) -> Self {
        Self {
            kind: NetEventType::ReliableMessageReceived,
            connection_id,
            data: EventData::Bytes(payload),
        }
    }

    /// Text payload, if any
    pub fn text(&self) -> Option<&str> {
        match &self.data {
            EventData::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Byte payload, if any
    pub fn bytes(&self) -> Option<&Bytes> {
        match &self.data {
            EventData::Bytes(b) => Some(b),
            _ => None,
        }
    }
}
