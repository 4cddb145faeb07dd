//! Source leg: receives media from the publishing client

use super::connection::{ConnectionState, PeerConnection};
use super::sink::SinkPeer;
use crate::config::PeerConfig;
use crate::engine::{MediaTransport, SourceEndpoint};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn, Span};
use uuid::Uuid;

type Consumers = Arc<Mutex<HashMap<Uuid, SinkPeer>>>;

/// Incoming relay leg
///
/// Keeps the sink legs consuming its producers. Each sink detaches itself
/// when it closes; closing the source closes every sink still attached.
#[derive(Clone)]
pub struct SourcePeer {
    connection: PeerConnection,
    endpoint: Arc<dyn SourceEndpoint>,
    consumers: Consumers,
}

impl SourcePeer {
    pub fn new(
        name: impl Into<String>,
        endpoint: Arc<dyn SourceEndpoint>,
        config: &PeerConfig,
        parent: &Span,
    ) -> Self {
        let transport: Arc<dyn MediaTransport> = endpoint.clone();
        let connection = PeerConnection::new(name, transport, config, parent);
        let consumers: Consumers = Arc::new(Mutex::new(HashMap::new()));

        let dependents = Arc::clone(&consumers);
        let span = connection.span().clone();
        connection.add_listener(move |state| {
            if state != ConnectionState::Closed {
                return;
            }
            // drained before closing so the sinks' detach listeners find
            // nothing left to remove
            let sinks: Vec<SinkPeer> = dependents.lock().drain().map(|(_, sink)| sink).collect();
            for sink in sinks {
                info!(parent: &span, "Closing consumer {} because the source stopped", sink.connection().name());
                sink.close();
            }
        });

        Self {
            connection,
            endpoint,
            consumers,
        }
    }

    /// The leg's connection state machine
    pub fn connection(&self) -> &PeerConnection {
        &self.connection
    }

    /// Engine endpoint, needed to create sinks consuming this source
    pub fn endpoint(&self) -> Arc<dyn SourceEndpoint> {
        Arc::clone(&self.endpoint)
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

    /// Apply the publishing client's offer and return the answer SDP
    pub async fn process_offer(&self, offer_sdp: &str) -> Result<String> {
        if self.is_closed() {
            return Err(Error::PeerClosed(self.connection.name().to_string()));
        }
        if offer_sdp.trim().is_empty() {
            return Err(Error::SdpError("offer without session description".to_string()));
        }
        self.endpoint.process_offer(offer_sdp).await
    }

    /// Attach a sink consuming this source
    ///
    /// Returns false (and closes the sink) if the source is already closed.
    pub fn add_consumer(&self, sink: SinkPeer) -> bool {
        if self.is_closed() {
            warn!(
                parent: self.connection.span(),
                "Source closed, rejecting consumer {}",
                sink.connection().name()
            );
            sink.close();
            return false;
        }

        let key = sink.connection().connection_id();
        let consumers = Arc::downgrade(&self.consumers);
        let detach = sink.connection().add_listener(move |state| {
            if state == ConnectionState::Closed {
                if let Some(consumers) = consumers.upgrade() {
                    consumers.lock().remove(&key);
                }
            }
        });
        if detach.is_none() {
            debug!(parent: self.connection.span(), "Consumer already closed");
            return false;
        }

        self.consumers.lock().insert(key, sink);

        // the source may have closed (and drained) between the check above
        // and the insert
        if self.is_closed() {
            let orphan = self.consumers.lock().remove(&key);
            if let Some(sink) = orphan {
                sink.close();
            }
            return false;
        }

        true
    }

    /// Number of sinks currently attached
    pub fn consumer_count(&self) -> usize {
        self.consumers.lock().len()
    }
}
