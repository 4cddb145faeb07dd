//! Relay controller
//!
//! Peer pool of a relay application. Besides the plain rendezvous rules of
//! the signaling transport it owns two registries:
//!
//! - `senders`: one source leg per `_snd` address
//! - `receivers`: the sink legs viewing each source, keyed by the sender address
//!
//! A `_snd` address is reserved synchronously when the listening request is
//! accepted, before the media engine is asked for an endpoint. A second
//! request for the same address is therefore denied even while the first leg
//! is still being built.

use super::address::{address_len, to_sender_address, AddressKind};
use super::listeners::ListenerTable;
use crate::config::{PeerConfig, RelayAppConfig, RelayServerConfig};
use crate::engine::MediaEngine;
use crate::peer::{ConnectionState, SourcePeer};
use crate::session::{LegId, ReceiverLeg, RelaySessionFactory, SenderLeg};
use crate::signaling::{ConnectionId, PeerId, PeerPool, SignalingHost, SignalingPeerRef};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Span};

/// Outcome of a listening request
#[derive(Debug)]
pub enum Admission {
    /// The request was refused
    Denied,
    /// Plain rendezvous listener registered
    Listening,
    /// Accepted; the relay leg is being built by `task`
    Relaying { task: JoinHandle<()>, span: Span },
}

impl Admission {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Admission::Denied)
    }

    /// Wait until leg construction (if any) has finished
    pub async fn wait(self) {
        if let Admission::Relaying { task, span } = self {
            if let Err(e) = task.await {
                warn!(parent: &span, "Relay leg construction task failed: {}", e);
            }
        }
    }
}

enum SenderSlot {
    /// Address reserved, endpoint still being created
    Pending(LegId),
    Active(Arc<SenderLeg>),
}

/// Client a relay leg opens its signaling connection to
struct RelayRoute {
    address: String,
    client: SignalingPeerRef,
}

#[derive(Default)]
struct Registry {
    listeners: ListenerTable,
    senders: HashMap<String, SenderSlot>,
    receivers: HashMap<String, Vec<Arc<ReceiverLeg>>>,
    connections: HashMap<PeerId, SignalingPeerRef>,
    /// Relay leg signaling peer -> its client
    routes: HashMap<PeerId, RelayRoute>,
}

/// Address registry and admission policy of a relay application
pub struct RelayController {
    config: RelayAppConfig,
    sessions: RelaySessionFactory,
    registry: Mutex<Registry>,
    span: Span,
    this: Weak<RelayController>,
}

impl RelayController {
    /// Create a controller for one application
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if either configuration is invalid.
    pub fn new(
        config: RelayAppConfig,
        peer_config: PeerConfig,
        engine: Arc<dyn MediaEngine>,
        host: Arc<dyn SignalingHost>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        peer_config.validate()?;

        let span = info_span!("relay", app = %config.name);
        info!(
            parent: &span,
            "Starting pool {} (relay: {}, address sharing: {})",
            config.name,
            config.relay,
            config.address_sharing
        );

        Ok(Arc::new_cyclic(|this| Self {
            config,
            sessions: RelaySessionFactory::new(engine, host, peer_config),
            registry: Mutex::new(Registry::default()),
            span,
            this: this.clone(),
        }))
    }

    /// Create the controller of the application served under `path`
    pub fn for_path(
        server: &RelayServerConfig,
        path: &str,
        engine: Arc<dyn MediaEngine>,
        host: Arc<dyn SignalingHost>,
    ) -> Result<Arc<Self>> {
        let app = server
            .app(path)
            .ok_or_else(|| Error::InvalidConfig(format!("no app configured for path '{}'", path)))?;
        Self::new(app.clone(), server.peer.clone(), engine, host)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &RelayAppConfig {
        &self.config
    }

    pub fn has_address_sharing(&self) -> bool {
        self.config.address_sharing
    }

    /// Handle a listening request
    ///
    /// Tells `peer` whether it may listen and, for relay addresses, starts
    /// building the relay leg.
    pub fn admit(&self, peer: SignalingPeerRef, address: &str) -> Admission {
        let kind = if self.config.relay {
            AddressKind::of(address)
        } else {
            AddressKind::Plain
        };

        match kind {
            AddressKind::Sender => self.admit_sender(peer, address),
            AddressKind::Receiver => self.admit_receiver(peer, address),
            AddressKind::Plain => self.admit_plain(peer, address),
        }
    }

    fn admit_sender(&self, peer: SignalingPeerRef, address: &str) -> Admission {
        let id = LegId::new();
        let reserved = {
            let mut reg = self.registry.lock();
            if reg.senders.contains_key(address) {
                false
            } else {
                reg.senders.insert(address.to_string(), SenderSlot::Pending(id));
                reg.listeners.add(address, Arc::clone(&peer));
                true
            }
        };

        if !reserved {
            info!(parent: &self.span, "New sender denied. Address {} in use.", address);
            peer.deny_listening(address);
            return Admission::Denied;
        }

        info!(parent: &self.span, "New sender address {}", address);
        peer.accept_listening(address);

        let this = self.this.clone();
        let address = address.to_string();
        let task = tokio::spawn(async move {
            if let Some(controller) = this.upgrade() {
                controller.build_sender(id, address, peer).await;
            }
        });
        Admission::Relaying {
            task,
            span: self.span.clone(),
        }
    }

    fn admit_receiver(&self, peer: SignalingPeerRef, address: &str) -> Admission {
        let sender_address = to_sender_address(address);
        let source = {
            let mut reg = self.registry.lock();
            let source = match reg.senders.get(&sender_address) {
                Some(SenderSlot::Active(leg)) if !leg.peer().is_closed() => {
                    Some((leg.id(), leg.peer().clone()))
                }
                _ => None,
            };
            if source.is_some() {
                reg.listeners.add(address, Arc::clone(&peer));
            }
            source
        };

        let Some((sender_id, source)) = source else {
            info!(parent: &self.span, "New receiver denied. No sender available at {}", sender_address);
            peer.deny_listening(address);
            return Admission::Denied;
        };

        info!(parent: &self.span, "New receiver on address {}", address);
        peer.accept_listening(address);

        let this = self.this.clone();
        let address = address.to_string();
        let task = tokio::spawn(async move {
            if let Some(controller) = this.upgrade() {
                controller
                    .build_receiver(LegId::new(), address, sender_address, sender_id, source, peer)
                    .await;
            }
        });
        Admission::Relaying {
            task,
            span: self.span.clone(),
        }
    }

    fn admit_plain(&self, peer: SignalingPeerRef, address: &str) -> Admission {
        let accepted = {
            let mut reg = self.registry.lock();
            if self.available(&reg.listeners, address) {
                reg.listeners.add(address, Arc::clone(&peer));
                true
            } else {
                false
            }
        };

        if !accepted {
            debug!(parent: &self.span, "Address {} not available", address);
            peer.deny_listening(address);
            return Admission::Denied;
        }

        peer.accept_listening(address);
        if self.config.address_sharing {
            self.accept_join(address, &peer);
        }
        Admission::Listening
    }

    /// Connect `client` with every other peer listening on `address`
    pub fn accept_join(&self, address: &str, client: &SignalingPeerRef) {
        let peers = self.registry.lock().listeners.peers(address);
        for other in peers.iter().filter(|other| other.id() != client.id()) {
            other.accept_incoming_connection(client);
            client.accept_incoming_connection(other);
        }
    }

    /// Whether a plain listening request for `address` would be accepted
    pub fn is_address_available(&self, address: &str) -> bool {
        let reg = self.registry.lock();
        self.available(&reg.listeners, address)
    }

    fn available(&self, listeners: &ListenerTable, address: &str) -> bool {
        address_len(address) <= self.config.max_address_length
            && (!listeners.is_listening(address) || self.config.address_sharing)
    }

    /// Unregister `peer` from `address`
    ///
    /// A sender that already connected keeps running: clients may drop their
    /// signaling connection once media flows. A sender that has not connected
    /// yet is removed together with its receivers. Peers that were not
    /// listening on `address` cannot affect its sender.
    pub fn remove_listener(&self, peer: &SignalingPeerRef, address: &str) {
        enum Followup {
            Nothing,
            KeepConnected,
            ReleasedReservation,
            RemoveSender(LegId),
        }

        let followup = {
            let mut reg = self.registry.lock();
            let removed = reg.listeners.remove(address, peer.id());

            let followup = match reg.senders.get(address) {
                _ if !removed => Followup::Nothing,
                None => Followup::Nothing,
                Some(SenderSlot::Pending(_)) => Followup::ReleasedReservation,
                Some(SenderSlot::Active(leg)) if leg.state() == ConnectionState::Connected => {
                    Followup::KeepConnected
                }
                Some(SenderSlot::Active(leg)) => Followup::RemoveSender(leg.id()),
            };
            if matches!(followup, Followup::ReleasedReservation) {
                reg.senders.remove(address);
            }
            followup
        };

        match followup {
            Followup::Nothing => {}
            Followup::KeepConnected => {
                info!(parent: &self.span, "Address {} was freed but an active sender remains.", address);
            }
            Followup::ReleasedReservation => {
                warn!(parent: &self.span, "Address {} was freed before its sender was created", address);
            }
            Followup::RemoveSender(id) => {
                warn!(
                    parent: &self.span,
                    "Removing sender {} because the address was freed before it connected",
                    address
                );
                self.remove_sender_leg(address, id);
            }
        }
    }

    /// Remove whatever sender is registered at `address`, with its receivers
    pub fn remove_sender(&self, address: &str) -> bool {
        let id = {
            let mut reg = self.registry.lock();
            let id = match reg.senders.get(address) {
                None => return false,
                Some(SenderSlot::Pending(_)) => None,
                Some(SenderSlot::Active(leg)) => Some(leg.id()),
            };
            if id.is_none() {
                reg.senders.remove(address);
            }
            id
        };

        match id {
            Some(id) => self.remove_sender_leg(address, id),
            None => {
                info!(parent: &self.span, "Released pending sender reservation for {}", address);
                true
            }
        }
    }

    fn remove_sender_leg(&self, address: &str, id: LegId) -> bool {
        let (sender, receivers) = {
            let mut reg = self.registry.lock();
            let sender = match reg.senders.remove(address) {
                Some(SenderSlot::Active(leg)) if leg.id() == id => leg,
                Some(other) => {
                    reg.senders.insert(address.to_string(), other);
                    return false;
                }
                None => return false,
            };

            let receivers = reg.receivers.remove(address).unwrap_or_default();
            reg.routes.remove(&sender.signaling().peer.id());
            for receiver in &receivers {
                reg.routes.remove(&receiver.signaling().peer.id());
            }
            (sender, receivers)
        };

        sender.close();

        // The engine does not reliably report failure on consumer endpoints
        // once their producer is gone, so receivers are closed here instead of
        // waiting for their own signals.
        for receiver in &receivers {
            receiver.close();
        }

        info!(
            parent: &self.span,
            "Sender for {} removed together with {} receivers",
            address,
            receivers.len()
        );
        true
    }

    /// Remove one receiver of the sender at `sender_address`
    pub fn remove_receiver(&self, sender_address: &str, id: LegId) -> bool {
        let receiver = {
            let mut guard = self.registry.lock();
            let reg = &mut *guard;

            let Some(list) = reg.receivers.get_mut(sender_address) else {
                return false;
            };
            let Some(position) = list.iter().position(|r| r.id() == id) else {
                return false;
            };
            let receiver = list.remove(position);

            if list.is_empty() && !reg.senders.contains_key(sender_address) {
                reg.receivers.remove(sender_address);
                debug!(parent: &self.span, "No receivers left for {}", sender_address);
            }
            reg.routes.remove(&receiver.signaling().peer.id());
            receiver
        };

        receiver.close();
        info!(parent: &self.span, "Receiver {} of {} removed", id, sender_address);
        true
    }

    /// Route a connection request from `client` to `address`
    ///
    /// Relay legs are connected to the client they were built for. Any other
    /// request succeeds only if exactly one peer listens on `address`.
    pub fn connect(&self, client: SignalingPeerRef, address: &str, id: ConnectionId) {
        let target = {
            let reg = self.registry.lock();
            match reg.routes.get(&client.id()) {
                Some(route) => (route.address == address
                    && reg.listeners.contains(address, route.client.id()))
                .then(|| Arc::clone(&route.client)),
                None => {
                    let peers = reg.listeners.peers(address);
                    if peers.len() == 1 {
                        peers.into_iter().next()
                    } else {
                        None
                    }
                }
            }
        };

        match target {
            Some(other) => {
                other.accept_incoming_connection(&client);
                client.accept_outgoing_connection(&other, id);
            }
            None => {
                debug!(parent: &self.span, "Connection request {} to {} denied", id, address);
                client.deny_connection(address, id);
            }
        }
    }

    /// Whether an active sender exists for a `_snd` or `_rec` address
    pub fn has_sender(&self, address: &str) -> bool {
        let sender_address = to_sender_address(address);
        matches!(
            self.registry.lock().senders.get(&sender_address),
            Some(SenderSlot::Active(_))
        )
    }

    /// Number of active senders
    pub fn sender_count(&self) -> usize {
        self.registry
            .lock()
            .senders
            .values()
            .filter(|slot| matches!(slot, SenderSlot::Active(_)))
            .count()
    }

    /// Number of receivers of the sender behind a `_snd` or `_rec` address
    pub fn receiver_count(&self, address: &str) -> usize {
        self.receivers(address).len()
    }

    /// Receivers of the sender behind a `_snd` or `_rec` address
    pub fn receivers(&self, address: &str) -> Vec<LegId> {
        let sender_address = to_sender_address(address);
        self.registry
            .lock()
            .receivers
            .get(&sender_address)
            .map(|list| list.iter().map(|r| r.id()).collect())
            .unwrap_or_default()
    }

    /// Connection state of the sender at `address`
    ///
    /// A reserved address whose leg is still being built reports `Connecting`.
    pub fn sender_state(&self, address: &str) -> Option<ConnectionState> {
        match self.registry.lock().senders.get(address) {
            Some(SenderSlot::Pending(_)) => Some(ConnectionState::Connecting),
            Some(SenderSlot::Active(leg)) => Some(leg.state()),
            None => None,
        }
    }

    /// Whether anyone listens on `address`
    pub fn is_listening(&self, address: &str) -> bool {
        self.registry.lock().listeners.is_listening(address)
    }

    /// Number of tracked signaling connections
    pub fn connection_count(&self) -> usize {
        self.registry.lock().connections.len()
    }

    async fn build_sender(&self, id: LegId, address: String, client: SignalingPeerRef) {
        let pool: Weak<dyn PeerPool> = self.this.clone();
        let leg = match self
            .sessions
            .create_source(id, &address, &client, pool, &self.span)
            .await
        {
            Ok(leg) => Arc::new(leg),
            Err(e) => {
                error!(parent: &self.span, "Failed to create sender for {}: {}", address, e);
                let mut reg = self.registry.lock();
                if matches!(reg.senders.get(&address), Some(SenderSlot::Pending(pending)) if *pending == id)
                {
                    reg.senders.remove(&address);
                }
                return;
            }
        };

        let registered = {
            let mut guard = self.registry.lock();
            let reg = &mut *guard;
            let reserved = matches!(
                reg.senders.get(&address),
                Some(SenderSlot::Pending(pending)) if *pending == id
            );
            if reserved {
                reg.senders
                    .insert(address.clone(), SenderSlot::Active(Arc::clone(&leg)));
                reg.receivers.entry(address.clone()).or_default();

                let relay_peer = Arc::clone(&leg.signaling().peer);
                reg.routes.insert(
                    relay_peer.id(),
                    RelayRoute {
                        address: address.clone(),
                        client: Arc::clone(&client),
                    },
                );
                reg.connections.insert(relay_peer.id(), relay_peer);
            }
            reserved
        };

        if !registered {
            info!(
                parent: &self.span,
                "Address {} was released while its sender was created. Closing it.",
                address
            );
            leg.close();
            return;
        }

        let controller = self.this.clone();
        let watched = address.clone();
        let span = self.span.clone();
        let watching = leg.peer().connection().add_listener(move |state| {
            debug!(parent: &span, "Sender {} state {:?}", watched, state);
            if state == ConnectionState::Closed {
                if let Some(controller) = controller.upgrade() {
                    controller.remove_sender_leg(&watched, id);
                }
            }
        });
        if watching.is_none() {
            self.remove_sender_leg(&address, id);
            return;
        }

        if let Err(e) = leg.connect().await {
            error!(parent: &self.span, "Failed to connect sender {} to its client: {}", address, e);
        }
    }

    async fn build_receiver(
        &self,
        id: LegId,
        address: String,
        sender_address: String,
        sender_id: LegId,
        source: SourcePeer,
        client: SignalingPeerRef,
    ) {
        let pool: Weak<dyn PeerPool> = self.this.clone();
        let leg = match self
            .sessions
            .create_sink(id, &address, &source, &client, pool, &self.span)
            .await
        {
            Ok(leg) => Arc::new(leg),
            Err(e) => {
                error!(parent: &self.span, "Failed to create receiver for {}: {}", address, e);
                return;
            }
        };

        let registered = {
            let mut guard = self.registry.lock();
            let reg = &mut *guard;
            match reg.senders.get(&sender_address) {
                Some(SenderSlot::Active(sender)) if sender.id() == sender_id => {
                    reg.receivers
                        .entry(sender_address.clone())
                        .or_default()
                        .push(Arc::clone(&leg));

                    let relay_peer = Arc::clone(&leg.signaling().peer);
                    reg.routes.insert(
                        relay_peer.id(),
                        RelayRoute {
                            address: address.clone(),
                            client: Arc::clone(&client),
                        },
                    );
                    reg.connections.insert(relay_peer.id(), relay_peer);
                    true
                }
                _ => false,
            }
        };

        if !registered {
            info!(
                parent: &self.span,
                "Sender {} is gone, closing the receiver built for {}",
                sender_address,
                address
            );
            leg.close();
            return;
        }

        let controller = self.this.clone();
        let watched = sender_address.clone();
        let span = self.span.clone();
        let watching = leg.peer().connection().add_listener(move |state| {
            debug!(parent: &span, "Receiver {} of {} state {:?}", id, watched, state);
            if state == ConnectionState::Closed {
                if let Some(controller) = controller.upgrade() {
                    controller.remove_receiver(&watched, id);
                }
            }
        });
        if watching.is_none() {
            self.remove_receiver(&sender_address, id);
            return;
        }

        if let Err(e) = leg.connect().await {
            error!(parent: &self.span, "Failed to send offer to receiver {}: {}", address, e);
        }
    }
}

impl PeerPool for RelayController {
    fn add_connection(&self, peer: SignalingPeerRef) {
        self.registry.lock().connections.insert(peer.id(), peer);
    }

    fn on_listening_request(&self, peer: SignalingPeerRef, address: &str) {
        self.admit(peer, address);
    }

    fn on_stop_listening(&self, peer: &SignalingPeerRef, address: &str) {
        self.remove_listener(peer, address);
    }

    fn on_connection_request(&self, peer: SignalingPeerRef, address: &str, id: ConnectionId) {
        self.connect(peer, address, id);
    }

    fn on_cleanup(&self, peer: &SignalingPeerRef) {
        let remaining = {
            let mut reg = self.registry.lock();
            reg.connections.remove(&peer.id());
            reg.routes.remove(&peer.id());
            reg.connections.len()
        };
        debug!(parent: &self.span, "{} removed", peer.identity());
        debug!(parent: &self.span, "{} connections left in pool", remaining);
    }
}
