//! Wire protocol messages exchanged between peers.
//!
//! Framing on the underlying transport is the supervisor's business; this
//! module defines the typed messages and a length-prefixed, size-limited
//! bincode codec for them.

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::address::PeerAddress;
use crate::constants::CHALLENGE_NONCE_SIZE;
use crate::crypto::keys::{PublicKey, Signature};
use crate::Hash;

/// Network protocol messages.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Message {
    /// Opening handshake message, sent by both sides.
    Version {
        version: u32,
        peer_address: PeerAddress,
        genesis_hash: Hash,
        head_hash: Hash,
        challenge_nonce: [u8; CHALLENGE_NONCE_SIZE],
        /// Sender clock in ms since the Unix epoch, for offset estimation.
        timestamp: u64,
    },

    /// Handshake acknowledgement: proves ownership of the announced
    /// identity by signing the counter-party's challenge nonce.
    Verack {
        public_key: PublicKey,
        signature: Signature,
    },

    /// Gossiped peer addresses.
    Addr { addresses: Vec<PeerAddress> },

    /// Request for known peer addresses matching the masks.
    GetAddr { protocol_mask: u8, service_mask: u32 },

    /// Connectivity probe.
    Ping { nonce: u32 },

    /// Answer to a ping, echoing its nonce.
    Pong { nonce: u32 },

    /// Typed refusal of a previously received message.
    Reject {
        kind: MessageKind,
        code: RejectCode,
        reason: String,
    },
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Version { .. } => MessageKind::Version,
            Message::Verack { .. } => MessageKind::Verack,
            Message::Addr { .. } => MessageKind::Addr,
            Message::GetAddr { .. } => MessageKind::GetAddr,
            Message::Ping { .. } => MessageKind::Ping,
            Message::Pong { .. } => MessageKind::Pong,
            Message::Reject { .. } => MessageKind::Reject,
        }
    }
}

/// Discriminant of a [`Message`], used in admission checks and rejects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Version,
    Verack,
    Addr,
    GetAddr,
    Ping,
    Pong,
    Reject,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MessageKind::Version => "version",
            MessageKind::Verack => "verack",
            MessageKind::Addr => "addr",
            MessageKind::GetAddr => "get-addr",
            MessageKind::Ping => "ping",
            MessageKind::Pong => "pong",
            MessageKind::Reject => "reject",
        };
        f.write_str(name)
    }
}

/// Machine-readable reject categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectCode {
    Malformed,
    Invalid,
    /// The rejected message used a protocol version we no longer speak.
    Obsolete,
    Duplicate,
}

/// Why a channel was closed by this side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    SendingOfVersionMessageFailed,
    VersionTimeout,
    VerackTimeout,
    IncompatibleVersion,
    DifferentGenesisBlock,
    InvalidPeerAddressInVersionMessage,
    UnexpectedPeerAddressInVersionMessage,
    InvalidPublicKeyInVerackMessage,
    InvalidSignatureInVerackMessage,
    AddrMessageTooLarge,
    RateLimitExceeded,
    InvalidAddr,
    AddrNotGloballyReachable,
    SendingPingMessageFailed,
    PingTimeout,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            CloseReason::SendingOfVersionMessageFailed => "sending of version message failed",
            CloseReason::VersionTimeout => "version timeout",
            CloseReason::VerackTimeout => "verack timeout",
            CloseReason::IncompatibleVersion => "incompatible version",
            CloseReason::DifferentGenesisBlock => "different genesis block",
            CloseReason::InvalidPeerAddressInVersionMessage => {
                "invalid peer address in version message"
            }
            CloseReason::UnexpectedPeerAddressInVersionMessage => {
                "unexpected peer address in version message"
            }
            CloseReason::InvalidPublicKeyInVerackMessage => "invalid public key in verack message",
            CloseReason::InvalidSignatureInVerackMessage => "invalid signature in verack message",
            CloseReason::AddrMessageTooLarge => "addr message too large",
            CloseReason::RateLimitExceeded => "rate limit exceeded",
            CloseReason::InvalidAddr => "invalid addr",
            CloseReason::AddrNotGloballyReachable => "addr not globally reachable",
            CloseReason::SendingPingMessageFailed => "sending ping message failed",
            CloseReason::PingTimeout => "ping timeout",
        };
        f.write_str(text)
    }
}

/// Codec errors.
#[derive(Clone, Debug, thiserror::Error)]
pub enum MessageError {
    #[error("message serialization failed: {0}")]
    SerializationFailed(String),
    #[error(
        "message exceeds maximum size ({} bytes)",
        crate::constants::MAX_MESSAGE_BYTES
    )]
    MessageTooLarge,
}

/// Size-limited bincode config used for both serialization and
/// deserialization. Prevents allocation-based DoS from crafted length
/// prefixes within payloads.
fn bincode_config() -> impl bincode::Options {
    bincode::DefaultOptions::new().with_limit(crate::constants::MAX_MESSAGE_BYTES as u64)
}

/// Serialize a message to bytes (length-prefixed).
///
/// Returns an error if serialization fails or the encoded message exceeds
/// `MAX_MESSAGE_BYTES`.
pub fn encode_message(msg: &Message) -> Result<Vec<u8>, MessageError> {
    let payload = bincode_config()
        .serialize(msg)
        .map_err(|e| MessageError::SerializationFailed(e.to_string()))?;
    if payload.len() > crate::constants::MAX_MESSAGE_BYTES {
        return Err(MessageError::MessageTooLarge);
    }
    let len = (payload.len() as u32).to_le_bytes();
    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&len);
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Deserialize a message from bytes (length prefix included).
///
/// Rejects messages whose declared length exceeds `MAX_MESSAGE_BYTES`
/// before allocating.
pub fn decode_message(data: &[u8]) -> Option<Message> {
    if data.len() < 4 {
        return None;
    }
    let len = u32::from_le_bytes(data[..4].try_into().ok()?) as usize;
    if len > crate::constants::MAX_MESSAGE_BYTES {
        return None;
    }
    if data.len() < 4 + len {
        return None;
    }
    bincode_config().deserialize(&data[4..4 + len]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{services, Protocol};
    use crate::constants;
    use crate::crypto::keys::Keypair;

    #[test]
    fn version_roundtrip() {
        let kp = Keypair::generate();
        let addr = PeerAddress::signed(
            Protocol::WebSocket,
            "wss://node.example.com:8443",
            services::FULL,
            crate::unix_time_ms(),
            &kp,
        );
        let msg = Message::Version {
            version: constants::PROTOCOL_VERSION,
            peer_address: addr,
            genesis_hash: [1u8; 32],
            head_hash: [2u8; 32],
            challenge_nonce: [3u8; constants::CHALLENGE_NONCE_SIZE],
            timestamp: 1_700_000_000_000,
        };
        let bytes = encode_message(&msg).unwrap();
        let decoded = decode_message(&bytes).unwrap();
        match decoded {
            Message::Version {
                version,
                peer_address,
                challenge_nonce,
                ..
            } => {
                assert_eq!(version, constants::PROTOCOL_VERSION);
                assert!(peer_address.verify());
                assert_eq!(challenge_nonce, [3u8; constants::CHALLENGE_NONCE_SIZE]);
            }
            _ => panic!("wrong message type"),
        }
    }

    #[test]
    fn ping_pong_roundtrip() {
        let bytes = encode_message(&Message::Ping { nonce: 0xdead_beef }).unwrap();
        assert!(matches!(
            decode_message(&bytes),
            Some(Message::Ping { nonce: 0xdead_beef })
        ));
    }

    #[test]
    fn reject_roundtrip() {
        let msg = Message::Reject {
            kind: MessageKind::Version,
            code: RejectCode::Obsolete,
            reason: "incompatible protocol version".into(),
        };
        let bytes = encode_message(&msg).unwrap();
        match decode_message(&bytes).unwrap() {
            Message::Reject { kind, code, .. } => {
                assert_eq!(kind, MessageKind::Version);
                assert_eq!(code, RejectCode::Obsolete);
            }
            _ => panic!("wrong message type"),
        }
    }

    #[test]
    fn decode_rejects_oversized_length() {
        let len_bytes = u32::MAX.to_le_bytes();
        let mut data = Vec::new();
        data.extend_from_slice(&len_bytes);
        data.extend_from_slice(&[0u8; 10]);
        assert!(decode_message(&data).is_none());
    }

    #[test]
    fn decode_rejects_truncated_frame() {
        let bytes = encode_message(&Message::Ping { nonce: 1 }).unwrap();
        assert!(decode_message(&bytes[..bytes.len() - 1]).is_none());
    }

    #[test]
    fn kind_covers_every_variant() {
        assert_eq!(Message::Ping { nonce: 0 }.kind(), MessageKind::Ping);
        assert_eq!(Message::Pong { nonce: 0 }.kind(), MessageKind::Pong);
        assert_eq!(
            Message::GetAddr {
                protocol_mask: 1,
                service_mask: 1
            }
            .kind(),
            MessageKind::GetAddr
        );
        assert_eq!(
            Message::Addr { addresses: vec![] }.kind(),
            MessageKind::Addr
        );
    }
}
