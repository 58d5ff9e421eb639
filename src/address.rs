//! Signed peer-address records.
//!
//! A [`PeerAddress`] identifies a reachable node: transport protocol, a
//! locator string, service bits, a timestamp, and a signature by the
//! owner's identity key. The derived peer id is the BLAKE3 digest of that
//! key, so any address can be checked for authenticity offline.
//!
//! Two fields are deliberately outside the signature: `distance` grows as
//! a WebRTC address propagates hop by hop, and `net_address` is the IP an
//! intermediary observed, not something the owner can attest.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::crypto::keys::{Keypair, PublicKey, Signature};
use crate::{hash_concat, Hash};

/// A peer identifier (digest of the owning identity key).
pub type PeerId = Hash;

/// Transport protocol of a peer address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    /// Publicly reachable WebSocket endpoint.
    WebSocket,
    /// Browser peer reachable through WebRTC signalling.
    WebRtc,
    /// Node without any listening endpoint.
    Dumb,
}

impl Protocol {
    /// Bit of this protocol in a protocol mask.
    pub fn mask(self) -> u8 {
        match self {
            Protocol::WebSocket => 1,
            Protocol::WebRtc => 1 << 1,
            Protocol::Dumb => 1 << 2,
        }
    }
}

/// Service bits a node may provide or accept.
pub mod services {
    pub const NONE: u32 = 0;
    /// Full blockchain history.
    pub const FULL: u32 = 1;
    /// Headers plus recent state.
    pub const LIGHT: u32 = 1 << 1;
    /// Proof-serving only.
    pub const NANO: u32 = 1 << 2;
    pub const ALL: u32 = FULL | LIGHT | NANO;
}

/// A signed record identifying a remote node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerAddress {
    pub protocol: Protocol,
    /// Endpoint locator, e.g. `wss://host:port` or a signalling id.
    pub locator: String,
    /// Bitmask of services the node provides.
    pub services: u32,
    /// Creation time in ms since the Unix epoch. Zero marks a seed.
    pub timestamp: u64,
    /// WebRTC hop count; grows in transit, not covered by the signature.
    pub distance: u8,
    /// Observed IP, if any intermediary learned one. Not signed.
    pub net_address: Option<IpAddr>,
    pub public_key: PublicKey,
    pub signature: Signature,
}

impl PeerAddress {
    /// Build and sign an address for the given keypair.
    pub fn signed(
        protocol: Protocol,
        locator: impl Into<String>,
        services: u32,
        timestamp: u64,
        key_pair: &Keypair,
    ) -> Self {
        let locator = locator.into();
        let payload = Self::signing_payload(protocol, &locator, services, timestamp);
        let signature = key_pair.sign(&payload);
        PeerAddress {
            protocol,
            locator,
            services,
            timestamp,
            distance: 0,
            net_address: None,
            public_key: key_pair.public.clone(),
            signature,
        }
    }

    /// The signing preimage: everything the owner attests to. Distance and
    /// observed IP are excluded because they mutate in flight.
    fn signing_payload(protocol: Protocol, locator: &str, services: u32, timestamp: u64) -> Hash {
        hash_concat(&[
            b"vesper.peer-address",
            &[protocol.mask()],
            locator.as_bytes(),
            &services.to_le_bytes(),
            &timestamp.to_le_bytes(),
        ])
    }

    /// Derive the peer id from the embedded public key.
    pub fn peer_id(&self) -> PeerId {
        self.public_key.peer_id()
    }

    /// Check the owner signature over the immutable fields.
    pub fn verify(&self) -> bool {
        let payload =
            Self::signing_payload(self.protocol, &self.locator, self.services, self.timestamp);
        self.public_key.verify(&payload, &self.signature)
    }

    /// Seed addresses come from static bootstrap configuration and are
    /// never relayed.
    pub fn is_seed(&self) -> bool {
        self.timestamp == 0
    }

    /// Extract the host part of the locator, if it has one.
    pub fn host(&self) -> Option<&str> {
        let rest = self
            .locator
            .split_once("://")
            .map(|(_, r)| r)
            .unwrap_or(&self.locator);
        let authority = rest.split(['/', '?']).next().unwrap_or(rest);
        if let Some(v6) = authority.strip_prefix('[') {
            return v6.split(']').next().filter(|h| !h.is_empty());
        }
        let host = match authority.rsplit_once(':') {
            Some((h, port)) if port.chars().all(|c| c.is_ascii_digit()) => h,
            _ => authority,
        };
        if host.is_empty() {
            None
        } else {
            Some(host)
        }
    }

    /// Whether the locator points at a publicly routable endpoint.
    ///
    /// Only meaningful for WebSocket addresses; other protocols have no
    /// dialable locator and pass trivially. DNS names are assumed to
    /// resolve publicly.
    pub fn is_globally_reachable(&self) -> bool {
        if self.protocol != Protocol::WebSocket {
            return true;
        }
        let Some(host) = self.host() else {
            return false;
        };
        if host.eq_ignore_ascii_case("localhost") {
            return false;
        }
        match host.parse::<IpAddr>() {
            Ok(ip) => ip_globally_reachable(ip),
            Err(_) => true,
        }
    }
}

/// Reject loopback, unspecified, private, and link-local addresses.
fn ip_globally_reachable(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !v4.is_loopback()
                && !v4.is_unspecified()
                && !v4.is_private()
                && !v4.is_link_local()
                && !v4.is_broadcast()
        }
        IpAddr::V6(v6) => !v6.is_loopback() && !v6.is_unspecified(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unix_time_ms;

    fn ws_address(locator: &str) -> PeerAddress {
        let kp = Keypair::generate();
        PeerAddress::signed(
            Protocol::WebSocket,
            locator,
            services::FULL,
            unix_time_ms(),
            &kp,
        )
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let addr = ws_address("wss://node.example.com:8443");
        assert!(addr.verify());
    }

    #[test]
    fn tampered_address_fails_verification() {
        let mut addr = ws_address("wss://node.example.com:8443");
        addr.services = services::ALL;
        assert!(!addr.verify());
    }

    #[test]
    fn distance_and_net_address_not_signed() {
        let mut addr = ws_address("wss://node.example.com:8443");
        addr.distance = 3;
        addr.net_address = Some("203.0.113.9".parse().unwrap());
        assert!(addr.verify());
    }

    #[test]
    fn seed_is_timestamp_zero() {
        let kp = Keypair::generate();
        let seed =
            PeerAddress::signed(Protocol::WebSocket, "wss://seed1.vesper.net:8443", 0, 0, &kp);
        assert!(seed.is_seed());
        assert!(!ws_address("wss://node.example.com:8443").is_seed());
    }

    #[test]
    fn host_extraction() {
        assert_eq!(
            ws_address("wss://node.example.com:8443").host(),
            Some("node.example.com")
        );
        assert_eq!(ws_address("wss://203.0.113.7:8443").host(), Some("203.0.113.7"));
        assert_eq!(ws_address("wss://[2001:db8::1]:8443").host(), Some("2001:db8::1"));
        assert_eq!(ws_address("wss://203.0.113.7").host(), Some("203.0.113.7"));
    }

    #[test]
    fn global_reachability() {
        assert!(ws_address("wss://203.0.113.7:8443").is_globally_reachable());
        assert!(ws_address("wss://node.example.com:8443").is_globally_reachable());
        assert!(!ws_address("wss://127.0.0.1:8443").is_globally_reachable());
        assert!(!ws_address("wss://10.0.0.1:8443").is_globally_reachable());
        assert!(!ws_address("wss://192.168.1.4:8443").is_globally_reachable());
        assert!(!ws_address("wss://169.254.0.1:8443").is_globally_reachable());
        assert!(!ws_address("wss://localhost:8443").is_globally_reachable());
        assert!(!ws_address("wss://[::1]:8443").is_globally_reachable());
    }

    #[test]
    fn non_websocket_protocols_skip_reachability() {
        let kp = Keypair::generate();
        let rtc = PeerAddress::signed(Protocol::WebRtc, "rtc-7fa2", 0, unix_time_ms(), &kp);
        assert!(rtc.is_globally_reachable());
    }

    #[test]
    fn protocol_masks_are_distinct_bits() {
        let all = Protocol::WebSocket.mask() | Protocol::WebRtc.mask() | Protocol::Dumb.mask();
        assert_eq!(all.count_ones(), 3);
    }
}
