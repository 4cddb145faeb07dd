//! Protocol bridge between a server-controlled signaling peer and a relay leg
//!
//! The signaling transport normally connects two clients through a socket
//! protocol on each side:
//!
//! ```text
//! client A ── socket ── SignalingPeer A ── pool ── SignalingPeer B ── socket ── client B
//! ```
//!
//! For a relay leg the server itself plays client B. A [`ProtocolBridge`]
//! replaces B's socket protocol: it receives the events client A sends, turns
//! the embedded negotiation messages into calls on the relay leg and feeds the
//! results back to signaling peer B as if they came from the network.

use crate::peer::{SinkPeer, SourcePeer};
use crate::signaling::{
    decode_wire_text, encode_wire_text, ConnectionId, NegotiationMessage, NetEventType,
    NetworkEvent, NetworkSink, Protocol, SdpType, SessionDescription,
};
use crate::Result;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn, Span};

/// Connection id used by source legs when opening their signaling connection
pub const SOURCE_CONNECTION_ID: ConnectionId = ConnectionId(2);

/// Connection id used by sink legs when opening their signaling connection
pub const SINK_CONNECTION_ID: ConnectionId = ConnectionId(17000);

/// Reply to the client's role negotiation probe
///
/// Any number works; the client library only needs a reply to settle into
/// answering mode.
pub const HANDSHAKE_REPLY: &str = "0";

/// The relay leg a bridge drives
#[derive(Clone)]
pub enum BridgeRole {
    /// Publishing client sends an offer, the leg answers
    Source(SourcePeer),
    /// The leg sends an offer, the viewing client answers
    Sink(SinkPeer),
}

impl BridgeRole {
    fn identity(&self) -> &'static str {
        match self {
            BridgeRole::Source(_) => "relay-source",
            BridgeRole::Sink(_) => "relay-sink",
        }
    }

    fn connection_id(&self) -> ConnectionId {
        match self {
            BridgeRole::Source(_) => SOURCE_CONNECTION_ID,
            BridgeRole::Sink(_) => SINK_CONNECTION_ID,
        }
    }
}

/// Adapter between generic signaling events and a relay leg
///
/// Cheap to clone; clones share state. Events passed to [`Protocol::send`]
/// are handled one at a time in arrival order by a background task.
#[derive(Clone)]
pub struct ProtocolBridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    role: BridgeRole,

    /// Signaling peer side; taken out on closure or dispose
    sink: Mutex<Option<Arc<dyn NetworkSink>>>,

    queue: mpsc::UnboundedSender<NetworkEvent>,

    closure_triggered: AtomicBool,
    disposed: AtomicBool,

    span: Span,
}

impl ProtocolBridge {
    /// Bridge for a source leg
    pub fn source(peer: SourcePeer, span: &Span) -> Self {
        Self::new(BridgeRole::Source(peer), span)
    }

    /// Bridge for a sink leg
    pub fn sink(peer: SinkPeer, span: &Span) -> Self {
        Self::new(BridgeRole::Sink(peer), span)
    }

    /// Create a bridge and start its event pump
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(role: BridgeRole, span: &Span) -> Self {
        let (queue, mut events) = mpsc::unbounded_channel::<NetworkEvent>();

        let inner = Arc::new(BridgeInner {
            role,
            sink: Mutex::new(None),
            queue,
            closure_triggered: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            span: span.clone(),
        });

        let weak = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                ProtocolBridge { inner }.handle_event(event).await;
            }
        });

        Self { inner }
    }

    /// Connect the bridge to the signaling peer it feeds
    pub fn attach(&self, sink: Arc<dyn NetworkSink>) {
        if self.is_disposed() || self.inner.closure_triggered.load(Ordering::SeqCst) {
            debug!(parent: &self.inner.span, "Not attaching sink to a finished bridge");
            return;
        }
        *self.inner.sink.lock() = Some(sink);
    }

    /// The relay leg this bridge drives
    pub fn role(&self) -> &BridgeRole {
        &self.inner.role
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Whether the signaling peer was told the network closed
    pub fn is_closure_triggered(&self) -> bool {
        self.inner.closure_triggered.load(Ordering::SeqCst)
    }

    /// Handle one event the remote client sent to this leg
    pub async fn handle_event(&self, event: NetworkEvent) {
        match event.kind {
            NetEventType::ReliableMessageReceived => {
                let Some(payload) = event.bytes() else {
                    warn!(parent: &self.inner.span, "Reliable message without payload");
                    return;
                };

                let text = match decode_wire_text(payload) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(parent: &self.inner.span, "Dropping undecodable message: {}", e);
                        return;
                    }
                };
                debug!(parent: &self.inner.span, "{} INC: {}", self.identity(), text);

                match NegotiationMessage::parse(&text) {
                    Ok(message) => self.handle_message(message, event.connection_id).await,
                    Err(e) => {
                        error!(
                            parent: &self.inner.span,
                            "Failed to parse negotiation message: {}. Raw message: {}",
                            e,
                            text
                        );
                    }
                }
            }
            NetEventType::Disconnected => {
                info!(parent: &self.inner.span, "{} disconnected from client side", self.identity());
                self.trigger_closure();
            }
            other => {
                debug!(parent: &self.inner.span, "Ignoring {:?} event", other);
            }
        }
    }

    async fn handle_message(&self, message: NegotiationMessage, id: ConnectionId) {
        match (&self.inner.role, message) {
            (BridgeRole::Source(_), NegotiationMessage::Handshake(n)) => {
                debug!(parent: &self.inner.span, "Received role probe {}", n);
                self.forward_message(HANDSHAKE_REPLY, id);
            }
            (BridgeRole::Sink(_), NegotiationMessage::Handshake(_)) => {
                // sink legs always offer first
            }
            (BridgeRole::Source(source), NegotiationMessage::Description(desc)) => match desc.sdp_type {
                SdpType::Offer => {
                    debug!(parent: &self.inner.span, "Processing offer");
                    let answer = match source.process_offer(&desc.sdp).await {
                        Ok(answer) => answer,
                        Err(e) => {
                            error!(parent: &self.inner.span, "Failed to process offer: {}", e);
                            return;
                        }
                    };
                    match SessionDescription::answer(answer).to_json() {
                        Ok(json) => self.forward_message(&json, id),
                        Err(e) => error!(parent: &self.inner.span, "{}", e),
                    }
                }
                SdpType::Answer => {
                    error!(
                        parent: &self.inner.span,
                        "Received an answer on an incoming leg. Ignoring it: {}",
                        desc.sdp
                    );
                }
            },
            (BridgeRole::Sink(sink), NegotiationMessage::Description(desc)) => match desc.sdp_type {
                SdpType::Answer => {
                    debug!(parent: &self.inner.span, "Processing answer");
                    if let Err(e) = sink.process_answer(&desc.sdp).await {
                        error!(parent: &self.inner.span, "Failed to process answer: {}", e);
                    }
                }
                SdpType::Offer => {
                    debug!(parent: &self.inner.span, "Client offers on an outgoing leg are not supported");
                }
            },
            (_, NegotiationMessage::Candidate(_)) => {
                // the engine's SDP carries the only usable candidates
            }
            (_, NegotiationMessage::Unknown(json)) => {
                warn!(parent: &self.inner.span, "Unknown message type received: {}", json);
            }
        }
    }

    /// Open the signaling connection to the client listening on `address`
    ///
    /// Sink legs follow up with their offer right away.
    pub async fn trigger_connection_request(&self, address: &str) -> Result<()> {
        let id = self.inner.role.connection_id();
        let Some(sink) = self.network_sink() else {
            debug!(parent: &self.inner.span, "No signaling peer attached, connection request dropped");
            return Ok(());
        };

        info!(parent: &self.inner.span, "Requesting signaling connection to {}", address);
        sink.on_network_event(NetworkEvent::with_text(NetEventType::NewConnection, id, address));

        if let BridgeRole::Sink(peer) = &self.inner.role {
            let offer = peer.create_offer().await?;
            let json = SessionDescription::offer(offer).to_json()?;
            self.forward_message(&json, id);
        }

        Ok(())
    }

    /// Tell the signaling peer its network connection is gone
    ///
    /// Fires at most once and never after [`Protocol::dispose`].
    pub fn trigger_closure(&self) {
        if self.is_disposed() {
            return;
        }
        if self.inner.closure_triggered.swap(true, Ordering::SeqCst) {
            return;
        }

        let sink = self.inner.sink.lock().take();
        if let Some(sink) = sink {
            sink.on_network_closed();
        }
    }

    fn forward_message(&self, text: &str, id: ConnectionId) {
        debug!(parent: &self.inner.span, "{} OUT: {}", self.identity(), text);
        match self.network_sink() {
            Some(sink) => sink.on_network_event(NetworkEvent::reliable_message(id, encode_wire_text(text))),
            None => debug!(parent: &self.inner.span, "No signaling peer attached, message dropped"),
        }
    }

    fn network_sink(&self) -> Option<Arc<dyn NetworkSink>> {
        self.inner.sink.lock().clone()
    }
}

impl Protocol for ProtocolBridge {
    fn send(&self, event: NetworkEvent) {
        if self.inner.queue.send(event).is_err() {
            warn!(parent: &self.inner.span, "Bridge event pump stopped, event dropped");
        }
    }

    fn dispose(&self) {
        if !self.inner.disposed.swap(true, Ordering::SeqCst) {
            self.inner.sink.lock().take();
            info!(parent: &self.inner.span, "{} disposed", self.identity());
        }
    }

    fn identity(&self) -> String {
        self.inner.role.identity().to_string()
    }
}
