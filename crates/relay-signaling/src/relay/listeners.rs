//! Address listener table

use crate::signaling::{PeerId, SignalingPeerRef};
use std::collections::HashMap;

/// Signaling peers listening on each address, in registration order
#[derive(Default)]
pub struct ListenerTable {
    by_address: HashMap<String, Vec<SignalingPeerRef>>,
}

impl ListenerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `peer` on `address`; false if it already listens there
    pub fn add(&mut self, address: &str, peer: SignalingPeerRef) -> bool {
        let peers = self.by_address.entry(address.to_string()).or_default();
        if peers.iter().any(|p| p.id() == peer.id()) {
            return false;
        }
        peers.push(peer);
        true
    }

    /// Unregister `peer` from `address`
    pub fn remove(&mut self, address: &str, peer: PeerId) -> bool {
        let Some(peers) = self.by_address.get_mut(address) else {
            return false;
        };

        let before = peers.len();
        peers.retain(|p| p.id() != peer);
        let removed = peers.len() != before;

        if peers.is_empty() {
            self.by_address.remove(address);
        }
        removed
    }

    /// Peers listening on `address`
    pub fn peers(&self, address: &str) -> Vec<SignalingPeerRef> {
        self.by_address.get(address).cloned().unwrap_or_default()
    }

    pub fn is_listening(&self, address: &str) -> bool {
        self.by_address.contains_key(address)
    }

    pub fn contains(&self, address: &str, peer: PeerId) -> bool {
        self.by_address
            .get(address)
            .is_some_and(|peers| peers.iter().any(|p| p.id() == peer))
    }

    /// Number of addresses with at least one listener
    pub fn address_count(&self) -> usize {
        self.by_address.len()
    }
}
