//! Peer channel facade.
//!
//! The transport task owns the socket; the agent talks to it through a
//! bounded frame channel. Emit methods return `bool` — `false` means the
//! transport queue is full or gone, and the caller decides whether that
//! is retryable (version message) or fatal (ping).

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::address::PeerAddress;
use crate::message::{CloseReason, Message, MessageKind, RejectCode};
use crate::Hash;

/// Outbound traffic handed to the transport task, drained in order.
#[derive(Clone, Debug)]
pub enum Frame {
    Message(Message),
    /// Terminal frame; the transport sends a goodbye and tears down.
    Close(CloseReason),
}

/// Inbound traffic surfaced by the transport task.
#[derive(Clone, Debug)]
pub enum ChannelEvent {
    Message(Message),
    /// The remote or the transport closed the connection.
    Close,
}

/// Agent-side handle of one peer connection.
pub struct PeerChannel {
    frame_tx: mpsc::Sender<Frame>,
    /// Expected address for outbound connections; learned from the
    /// version message for inbound ones.
    pub peer_address: Option<PeerAddress>,
    closed: bool,
    last_message_at: Option<Instant>,
}

impl PeerChannel {
    /// Wrap a transport frame sender. `expected` carries the dialed
    /// address for outbound connections and is `None` for inbound ones.
    pub fn new(frame_tx: mpsc::Sender<Frame>, expected: Option<PeerAddress>) -> Self {
        PeerChannel {
            frame_tx,
            peer_address: expected,
            closed: false,
            last_message_at: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed || self.frame_tx.is_closed()
    }

    /// When the last inbound message arrived, if any.
    pub fn last_message_at(&self) -> Option<Instant> {
        self.last_message_at
    }

    pub(crate) fn note_message_received(&mut self) {
        self.last_message_at = Some(Instant::now());
    }

    fn send(&self, msg: Message) -> bool {
        if self.closed {
            return false;
        }
        let kind = msg.kind();
        match self.frame_tx.try_send(Frame::Message(msg)) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(kind = %kind, error = %e, "outbound frame dropped");
                false
            }
        }
    }

    pub fn version(
        &self,
        peer_address: PeerAddress,
        genesis_hash: Hash,
        head_hash: Hash,
        challenge_nonce: [u8; crate::constants::CHALLENGE_NONCE_SIZE],
        timestamp: u64,
    ) -> bool {
        self.send(Message::Version {
            version: crate::constants::PROTOCOL_VERSION,
            peer_address,
            genesis_hash,
            head_hash,
            challenge_nonce,
            timestamp,
        })
    }

    pub fn verack(
        &self,
        public_key: crate::crypto::keys::PublicKey,
        signature: crate::crypto::keys::Signature,
    ) -> bool {
        self.send(Message::Verack {
            public_key,
            signature,
        })
    }

    pub fn addr(&self, addresses: Vec<PeerAddress>) -> bool {
        self.send(Message::Addr { addresses })
    }

    pub fn get_addr(&self, protocol_mask: u8, service_mask: u32) -> bool {
        self.send(Message::GetAddr {
            protocol_mask,
            service_mask,
        })
    }

    pub fn ping(&self, nonce: u32) -> bool {
        self.send(Message::Ping { nonce })
    }

    pub fn pong(&self, nonce: u32) -> bool {
        self.send(Message::Pong { nonce })
    }

    /// Best-effort typed refusal; failure to enqueue is not actionable.
    pub fn reject(&self, kind: MessageKind, code: RejectCode, reason: &str) {
        let _ = self.send(Message::Reject {
            kind,
            code,
            reason: reason.to_string(),
        });
    }

    /// Queue the terminal close frame and latch the channel shut. All
    /// later sends fail. Idempotent.
    pub fn close(&mut self, reason: CloseReason) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.frame_tx.try_send(Frame::Close(reason)).is_err() {
            tracing::debug!(reason = %reason, "close frame dropped, transport already gone");
        }
    }
}
