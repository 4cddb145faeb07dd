//! Sink leg: forwards a source's media to one viewing client

use super::connection::{ConnectionState, PeerConnection};
use crate::config::PeerConfig;
use crate::engine::{MediaTransport, SinkEndpoint};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, Span};

/// Outgoing relay leg
///
/// Holds the consumers the engine created from the source's producers and
/// releases them when the leg closes.
#[derive(Clone)]
pub struct SinkPeer {
    connection: PeerConnection,
    endpoint: Arc<dyn SinkEndpoint>,
}

impl SinkPeer {
    pub fn new(
        name: impl Into<String>,
        endpoint: Arc<dyn SinkEndpoint>,
        config: &PeerConfig,
        parent: &Span,
    ) -> Self {
        let transport: Arc<dyn MediaTransport> = endpoint.clone();
        let connection = PeerConnection::new(name, transport, config, parent);

        let consumers = Arc::clone(&endpoint);
        let span = connection.span().clone();
        connection.add_listener(move |state| {
            if state == ConnectionState::Closed {
                debug!(parent: &span, "Releasing consumers");
                consumers.release_consumers();
            }
        });

        Self {
            connection,
            endpoint,
        }
    }

    /// The leg's connection state machine
    pub fn connection(&self) -> &PeerConnection {
        &self.connection
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }

    pub fn start(&self) {
        self.connection.start();
    }

    pub fn close(&self) {
        self.connection.close();
    }

    /// Create the offer sent to the viewing client
    pub async fn create_offer(&self) -> Result<String> {
        if self.is_closed() {
            return Err(Error::PeerClosed(self.connection.name().to_string()));
        }
        self.endpoint.create_offer().await
    }

    /// Apply the viewing client's answer
    pub async fn process_answer(&self, answer_sdp: &str) -> Result<()> {
        if self.is_closed() {
            return Err(Error::PeerClosed(self.connection.name().to_string()));
        }
        if answer_sdp.trim().is_empty() {
            return Err(Error::SdpError("answer without session description".to_string()));
        }
        self.endpoint.process_answer(answer_sdp).await
    }
}
