//! Network identity configuration.
//!
//! One [`NetworkConfig`] per node, shared by every per-peer agent. It owns
//! the local keypair, the signed self-address announced in version
//! messages, and the protocol/service masks used when requesting
//! addresses from peers.

use crate::address::PeerAddress;
use crate::crypto::keys::Keypair;

/// Service bitmasks this node provides and accepts.
#[derive(Clone, Copy, Debug)]
pub struct Services {
    /// Services we offer to the network (announced in our peer address).
    pub provided: u32,
    /// Services we want counter-parties to offer.
    pub accepted: u32,
}

impl Services {
    pub fn new(provided: u32, accepted: u32) -> Self {
        Services { provided, accepted }
    }
}

/// Identity and capability configuration of the local node.
pub struct NetworkConfig {
    pub key_pair: Keypair,
    /// Our own signed peer address, relayed to handshaken peers.
    pub peer_address: PeerAddress,
    /// Protocols we can dial, as a bitmask.
    pub protocol_mask: u8,
    pub services: Services,
}

impl NetworkConfig {
    pub fn new(
        key_pair: Keypair,
        peer_address: PeerAddress,
        protocol_mask: u8,
        services: Services,
    ) -> Self {
        debug_assert!(
            peer_address.peer_id() == key_pair.public.peer_id(),
            "own peer address must be signed by the configured keypair"
        );
        NetworkConfig {
            key_pair,
            peer_address,
            protocol_mask,
            services,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{services, Protocol};

    #[test]
    fn config_binds_address_to_keypair() {
        let kp = Keypair::generate();
        let addr = PeerAddress::signed(
            Protocol::WebSocket,
            "wss://node.example.com:8443",
            services::FULL,
            crate::unix_time_ms(),
            &kp,
        );
        let config = NetworkConfig::new(
            kp,
            addr,
            Protocol::WebSocket.mask(),
            Services::new(services::FULL, services::ALL),
        );
        assert!(config.peer_address.verify());
        assert_eq!(
            config.peer_address.peer_id(),
            config.key_pair.public.peer_id()
        );
    }
}
