//! Seams to the media switching engine
//!
//! The engine owns the actual WebRTC transports, producers and consumers.
//! The relay only needs five operations from it plus a stream of transport
//! state signals per endpoint.

use crate::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

/// ICE state of an engine transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceState {
    New,
    Connected,
    Completed,
    Disconnected,
    Closed,
}

/// DTLS (secure channel) state of an engine transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtlsState {
    New,
    Connecting,
    Connected,
    Failed,
    Closed,
}

/// SCTP state of an engine transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SctpState {
    New,
    Connecting,
    Connected,
    Failed,
    Closed,
}

/// Lower-layer state change reported by an engine transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSignal {
    Ice(IceState),
    Dtls(DtlsState),
    Sctp(SctpState),
}

impl fmt::Display for TransportSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportSignal::Ice(s) => write!(f, "icestatechange {:?}", s),
            TransportSignal::Dtls(s) => write!(f, "dtlsstatechange {:?}", s),
            TransportSignal::Sctp(s) => write!(f, "sctpstatechange {:?}", s),
        }
    }
}

/// An engine transport endpoint
pub trait MediaTransport: Send + Sync {
    /// Engine-assigned transport id
    fn id(&self) -> String;

    /// Subscribe to lower-layer state signals
    fn subscribe(&self) -> broadcast::Receiver<TransportSignal>;

    /// Close the transport and everything created on it
    fn close(&self);
}

/// Endpoint receiving media from a publishing client
#[async_trait]
pub trait SourceEndpoint: MediaTransport {
    /// Apply the client's offer, create producers and return the answer SDP
    async fn process_offer(&self, offer_sdp: &str) -> Result<String>;
}

/// Endpoint forwarding a source's media to one viewing client
#[async_trait]
pub trait SinkEndpoint: MediaTransport {
    /// Create the offer describing the consumed tracks
    async fn create_offer(&self) -> Result<String>;

    /// Apply the client's answer
    async fn process_answer(&self, answer_sdp: &str) -> Result<()>;

    /// Close the consumers created for this endpoint
    fn release_consumers(&self);
}

/// The media switching engine
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Create an endpoint for an incoming (published) stream
    async fn create_incoming_endpoint(&self) -> Result<Arc<dyn SourceEndpoint>>;

    /// Create an endpoint consuming every producer of `source`
    async fn create_outgoing_endpoint(
        &self,
        source: Arc<dyn SourceEndpoint>,
    ) -> Result<Arc<dyn SinkEndpoint>>;
}
