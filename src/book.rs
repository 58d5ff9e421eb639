//! Collaborator oracles: blockchain state and the shared address book.
//!
//! Both are read-mostly and shared across every agent of a node. The
//! address book additionally accepts batches of gossiped addresses, keyed
//! by the peer that supplied them.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::address::{PeerAddress, PeerId, Protocol};
use crate::Hash;

/// Read-only view of local blockchain state.
pub trait Blockchain: Send + Sync {
    /// Hash of the current chain head.
    fn head_hash(&self) -> Hash;
    /// Hash of the genesis block; peers on a different genesis are not
    /// part of this network.
    fn genesis_hash(&self) -> Hash;
}

struct StoredAddress {
    address: PeerAddress,
    /// Peer that gossiped this record; `None` for locally seeded entries.
    source: Option<PeerId>,
}

/// In-memory store of known peer addresses, shared between agents.
#[derive(Default)]
pub struct AddressBook {
    inner: RwLock<HashMap<PeerId, StoredAddress>>,
}

impl AddressBook {
    pub fn new() -> Self {
        AddressBook::default()
    }

    /// Seed the book with a locally configured address (bootstrap list).
    pub fn seed(&self, address: PeerAddress) {
        let mut inner = self.inner.write().expect("address book lock poisoned");
        inner.insert(
            address.peer_id(),
            StoredAddress {
                address,
                source: None,
            },
        );
    }

    /// Look up the freshest record for a peer id.
    pub fn get(&self, peer_id: &PeerId) -> Option<PeerAddress> {
        let inner = self.inner.read().expect("address book lock poisoned");
        inner.get(peer_id).map(|stored| stored.address.clone())
    }

    /// Return up to `max` addresses matching both masks, freshest first.
    pub fn query(&self, protocol_mask: u8, service_mask: u32, max: usize) -> Vec<PeerAddress> {
        let inner = self.inner.read().expect("address book lock poisoned");
        let mut matches: Vec<PeerAddress> = inner
            .values()
            .filter(|stored| {
                let address = &stored.address;
                address.protocol.mask() & protocol_mask != 0
                    && address.services & service_mask != 0
            })
            .map(|stored| stored.address.clone())
            .collect();
        matches.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matches.truncate(max);
        matches
    }

    /// Merge a gossiped batch. An existing record is replaced only by a
    /// fresher one; on equal timestamps the shorter WebRTC distance wins.
    pub fn add(&self, source: PeerId, addresses: &[PeerAddress]) {
        let mut inner = self.inner.write().expect("address book lock poisoned");
        let mut merged = 0usize;
        for address in addresses {
            let peer_id = address.peer_id();
            let replace = match inner.get(&peer_id) {
                None => true,
                Some(existing) => {
                    address.timestamp > existing.address.timestamp
                        || (address.timestamp == existing.address.timestamp
                            && address.protocol == Protocol::WebRtc
                            && address.distance < existing.address.distance)
                }
            };
            if replace {
                inner.insert(
                    peer_id,
                    StoredAddress {
                        address: address.clone(),
                        source: Some(source),
                    },
                );
                merged += 1;
            }
        }
        if merged > 0 {
            tracing::debug!(
                source = %hex::encode(&source[..8]),
                merged,
                total = inner.len(),
                "address book updated"
            );
        }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.inner.read().expect("address book lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Peer id that supplied a record, if it was gossiped.
    pub fn source_of(&self, peer_id: &PeerId) -> Option<PeerId> {
        let inner = self.inner.read().expect("address book lock poisoned");
        inner.get(peer_id).and_then(|stored| stored.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::services;
    use crate::crypto::keys::Keypair;

    fn address(protocol: Protocol, locator: &str, timestamp: u64) -> PeerAddress {
        let kp = Keypair::generate();
        PeerAddress::signed(protocol, locator, services::FULL, timestamp, &kp)
    }

    #[test]
    fn add_and_get() {
        let book = AddressBook::new();
        let addr = address(Protocol::WebSocket, "wss://a.example.com:8443", 1000);
        book.add([9u8; 32], std::slice::from_ref(&addr));
        let found = book.get(&addr.peer_id()).unwrap();
        assert_eq!(found.locator, addr.locator);
        assert_eq!(book.source_of(&addr.peer_id()), Some([9u8; 32]));
    }

    #[test]
    fn query_filters_by_masks() {
        let book = AddressBook::new();
        let ws = address(Protocol::WebSocket, "wss://a.example.com:8443", 1000);
        let rtc = address(Protocol::WebRtc, "rtc-1", 2000);
        book.add([9u8; 32], &[ws.clone(), rtc.clone()]);

        let only_ws = book.query(Protocol::WebSocket.mask(), services::ALL, 10);
        assert_eq!(only_ws.len(), 1);
        assert_eq!(only_ws[0].peer_id(), ws.peer_id());

        let both = book.query(
            Protocol::WebSocket.mask() | Protocol::WebRtc.mask(),
            services::ALL,
            10,
        );
        assert_eq!(both.len(), 2);
        // Freshest first
        assert_eq!(both[0].peer_id(), rtc.peer_id());

        assert!(book.query(Protocol::WebSocket.mask(), services::NANO, 10).is_empty());
    }

    #[test]
    fn stale_record_does_not_replace_fresh_one() {
        let kp = Keypair::generate();
        let fresh =
            PeerAddress::signed(Protocol::WebSocket, "wss://a.example.com:8443", 1, 2000, &kp);
        let stale =
            PeerAddress::signed(Protocol::WebSocket, "wss://old.example.com:8443", 1, 1000, &kp);
        let book = AddressBook::new();
        book.add([1u8; 32], std::slice::from_ref(&fresh));
        book.add([2u8; 32], std::slice::from_ref(&stale));
        assert_eq!(book.get(&fresh.peer_id()).unwrap().locator, fresh.locator);
    }

    #[test]
    fn equal_timestamp_keeps_shorter_rtc_distance() {
        let kp = Keypair::generate();
        let mut far = PeerAddress::signed(Protocol::WebRtc, "rtc-x", 1, 1000, &kp);
        far.distance = 3;
        let mut near = far.clone();
        near.distance = 1;
        let book = AddressBook::new();
        book.add([1u8; 32], std::slice::from_ref(&far));
        book.add([2u8; 32], std::slice::from_ref(&near));
        assert_eq!(book.get(&near.peer_id()).unwrap().distance, 1);
    }

    #[test]
    fn query_caps_results() {
        let book = AddressBook::new();
        for i in 0..5 {
            let addr = address(
                Protocol::WebSocket,
                &format!("wss://n{i}.example.com:8443"),
                1000 + i,
            );
            book.seed(addr);
        }
        assert_eq!(book.query(Protocol::WebSocket.mask(), services::ALL, 3).len(), 3);
    }
}
