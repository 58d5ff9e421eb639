//! # Vesper
//!
//! Per-peer networking for the Vesper blockchain overlay. Each connected
//! peer is mediated by one [`agent::Agent`]: it negotiates identity through
//! a challenge–response version/verack handshake, gossips signed peer
//! addresses under rate limits, and probes liveness with ping/pong.
//!
//! The crate deliberately stops at the agent boundary. Transport framing,
//! connection selection, and blockchain state live in the supervisor that
//! composes many agents; they are reached through the narrow interfaces in
//! [`book`], [`channel`], and [`config`].

pub mod address;
pub mod agent;
pub mod book;
pub mod channel;
pub mod config;
pub mod crypto;
pub mod message;
pub mod timers;

/// Protocol constants
pub mod constants {
    /// Current protocol version code.
    pub const PROTOCOL_VERSION: u32 = 2;
    /// Oldest protocol version we still accept from a peer.
    pub const MIN_PROTOCOL_VERSION: u32 = 2;
    /// Timeout for each handshake step in milliseconds.
    pub const HANDSHAKE_TIMEOUT_MS: u64 = 4_000;
    /// Timeout for an answer to a connectivity ping in milliseconds.
    pub const PING_TIMEOUT_MS: u64 = 10_000;
    /// Interval between connectivity probes in milliseconds.
    pub const CONNECTIVITY_CHECK_INTERVAL_MS: u64 = 60_000;
    /// Interval between re-announcements of our own peer address.
    pub const ANNOUNCE_ADDR_INTERVAL_MS: u64 = 300_000;
    /// Suppression window before a known address is relayed again.
    pub const RELAY_THROTTLE_MS: u64 = 120_000;
    /// Maximum attempts to transmit our version message.
    pub const VERSION_ATTEMPTS_MAX: u32 = 10;
    /// Delay before retrying a failed version transmission.
    pub const VERSION_RETRY_DELAY_MS: u64 = 500;
    /// Maximum addresses exchanged with one peer per rate-limit window.
    pub const ADDR_RATE_LIMIT: usize = 2_000;
    /// Fixed window backing `ADDR_RATE_LIMIT`.
    pub const ADDR_RATE_LIMIT_WINDOW_MS: u64 = 60_000;
    /// Cadence of the outbound address relay queue.
    pub const ADDR_QUEUE_INTERVAL_MS: u64 = 5_000;
    /// Maximum addresses in a single addr message.
    pub const MAX_ADDR_PER_MESSAGE: usize = 1_000;
    /// Maximum addresses relayed per queue firing.
    pub const MAX_ADDR_RELAY_PER_MESSAGE: usize = 10;
    /// Overall relay queue size; the oldest entry is dropped beyond this.
    pub const MAX_ADDR_QUEUE_SIZE: usize = 1_000;
    /// Maximum WebRTC address propagation distance.
    pub const MAX_DISTANCE: u8 = 4;
    /// Challenge nonce length in bytes.
    pub const CHALLENGE_NONCE_SIZE: usize = 32;
    /// Maximum wire message size (16 MiB).
    pub const MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;
}

/// 32-byte hash used throughout the protocol
pub type Hash = [u8; 32];

/// Compute a domain-separated BLAKE3 hash.
///
/// The domain MUST be valid UTF-8 (all Vesper domains use ASCII).
/// Panics at runtime if domain is not valid UTF-8 — this is a programming
/// error, not an input error.
pub fn hash_domain(domain: &[u8], data: &[u8]) -> Hash {
    let domain_str = std::str::from_utf8(domain).expect("hash_domain: domain must be valid UTF-8");
    let mut hasher = blake3::Hasher::new_derive_key(domain_str);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}

/// Compute BLAKE3 hash of length-prefixed concatenated slices.
///
/// Each part is prefixed with its length as a little-endian u64, preventing
/// ambiguous concatenation (e.g., `["AB","C"]` vs `["A","BC"]`).
pub fn hash_concat(parts: &[&[u8]]) -> Hash {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// Milliseconds since the Unix epoch, saturating at zero for clocks set
/// before 1970.
pub fn unix_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_domain_separates() {
        let a = hash_domain(b"vesper.test.a", b"data");
        let b = hash_domain(b"vesper.test.b", b"data");
        assert_ne!(a, b);
    }

    #[test]
    fn hash_concat_length_prefixed() {
        let a = hash_concat(&[b"AB", b"C"]);
        let b = hash_concat(&[b"A", b"BC"]);
        assert_ne!(a, b);
    }
}
