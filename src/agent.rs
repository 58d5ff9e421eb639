//! Per-peer handshake and liveness agent.
//!
//! One [`Agent`] mediates one channel between the local node and one
//! remote peer. It drives the version/verack exchange with
//! challenge–response identity proofs, gates every later message on the
//! handshake state, gossips peer addresses under rate limits, and probes
//! liveness with periodic pings.
//!
//! The agent is an actor: all handlers are synchronous and run to
//! completion on one task, driven by [`Agent::run`]'s select loop over
//! inbound channel events, supervisor commands, and the named timer
//! registry. Observers registered with [`Agent::on_event`] are invoked
//! inline from the handlers and may close the channel on the spot — the
//! version handler checks for exactly that and aborts. Protocol
//! violations never surface as errors — they close the channel with a
//! typed [`CloseReason`].

use std::collections::HashMap;
use std::sync::Arc;

use rand::{Rng, RngCore};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

use crate::address::{PeerAddress, PeerId, Protocol};
use crate::book::{AddressBook, Blockchain};
use crate::channel::{ChannelEvent, PeerChannel};
use crate::config::NetworkConfig;
use crate::constants;
use crate::crypto::keys::{PublicKey, Signature};
use crate::message::{CloseReason, Message, MessageKind, RejectCode};
use crate::timers::{RateLimit, ThrottledQueue, Timers};
use crate::{hash_concat, Hash};

const TIMER_VERSION: &str = "version";
const TIMER_VERSION_RETRY: &str = "version-retry";
const TIMER_VERACK: &str = "verack";
const TIMER_CONNECTIVITY: &str = "connectivity";
const TIMER_ANNOUNCE_ADDR: &str = "announce-addr";
const TIMER_ADDR_QUEUE: &str = "addr-queue";
const PING_TIMER_PREFIX: &str = "ping_";

fn ping_timer_name(nonce: u32) -> String {
    format!("{PING_TIMER_PREFIX}{nonce}")
}

/// The signing preimage of a verack: the counter-party's peer id and the
/// challenge nonce it sent us.
fn verack_payload(peer_id: &PeerId, nonce: &[u8; constants::CHALLENGE_NONCE_SIZE]) -> Hash {
    hash_concat(&[b"vesper.verack", peer_id, nonce])
}

/// Negotiated view of the remote peer, built from its version message.
#[derive(Clone, Debug)]
pub struct Peer {
    pub peer_address: PeerAddress,
    /// Protocol version the peer announced.
    pub version: u32,
    /// The peer's chain head at handshake time.
    pub head_hash: Hash,
    /// Remote clock minus local clock at receipt, in ms.
    pub time_offset: i64,
}

impl Peer {
    pub fn id(&self) -> PeerId {
        self.peer_address.peer_id()
    }
}

/// Observable agent events.
///
/// Delivered synchronously: every listener runs inside the handler that
/// produced the event, before the agent continues. A listener that needs
/// async machinery should forward the event into its own channel.
#[derive(Clone, Debug)]
pub enum AgentEvent {
    /// A valid version message was accepted.
    Version(Peer),
    /// Both verack directions completed. Fires exactly once.
    Handshake(Peer),
    /// An addr batch passed all checks and entered the address book.
    Addr(Vec<PeerAddress>),
    /// A tracked ping was answered; carries the round-trip time.
    PingPong(Duration),
}

/// A synchronous event observer. Receives the peer channel alongside the
/// event so it can veto a peer by closing mid-handshake.
pub type AgentListener = Box<dyn FnMut(&AgentEvent, &mut PeerChannel) + Send>;

/// Supervisor-side commands, sent through an [`AgentHandle`].
#[derive(Debug)]
pub enum AgentCommand {
    Handshake,
    RelayAddresses(Vec<PeerAddress>),
    Close(CloseReason),
}

/// The agent task has terminated; commands can no longer be delivered.
#[derive(Clone, Debug, thiserror::Error)]
#[error("agent terminated")]
pub struct AgentGone;

/// Handle for the supervisor to interact with a running agent.
#[derive(Clone)]
pub struct AgentHandle {
    command_tx: mpsc::Sender<AgentCommand>,
}

impl AgentHandle {
    /// Initiate the handshake. Idempotent after the first success.
    pub async fn handshake(&self) -> Result<(), AgentGone> {
        self.command_tx
            .send(AgentCommand::Handshake)
            .await
            .map_err(|_| AgentGone)
    }

    /// Offer addresses for relay to this peer.
    pub async fn relay_addresses(&self, addresses: Vec<PeerAddress>) -> Result<(), AgentGone> {
        self.command_tx
            .send(AgentCommand::RelayAddresses(addresses))
            .await
            .map_err(|_| AgentGone)
    }

    /// Close the channel with the given reason.
    pub async fn close(&self, reason: CloseReason) -> Result<(), AgentGone> {
        self.command_tx
            .send(AgentCommand::Close(reason))
            .await
            .map_err(|_| AgentGone)
    }
}

/// What we remember about an address the peer already knows.
struct KnownAddress {
    protocol: Protocol,
    distance: u8,
    /// When we learned that the peer knows it; relay suppression runs
    /// against this clock, and re-relaying restarts it.
    since: Instant,
}

impl KnownAddress {
    fn of(address: &PeerAddress, now: Instant) -> Self {
        KnownAddress {
            protocol: address.protocol,
            distance: address.distance,
            since: now,
        }
    }
}

/// Per-peer handshake and liveness agent. See the module docs.
pub struct Agent {
    channel: PeerChannel,
    blockchain: Arc<dyn Blockchain>,
    addresses: Arc<AddressBook>,
    config: Arc<NetworkConfig>,
    listeners: Vec<AgentListener>,

    peer: Option<Peer>,
    version_sent: bool,
    version_received: bool,
    verack_sent: bool,
    verack_received: bool,
    /// True once the remote's self-declared address is proven: by equality
    /// with the dialed address, or by its verack signature.
    peer_address_verified: bool,
    handshaken: bool,
    closed: bool,

    version_attempts: u32,
    /// Random nonce in our version message; the remote must sign it.
    challenge_nonce: [u8; constants::CHALLENGE_NONCE_SIZE],
    /// Nonce the remote sent us; we sign it in our verack.
    peer_challenge_nonce: Option<[u8; constants::CHALLENGE_NONCE_SIZE]>,

    known_addresses: HashMap<PeerId, KnownAddress>,
    ping_times: HashMap<u32, Instant>,
    addr_queue: ThrottledQueue<PeerAddress>,
    addr_limit: RateLimit,
    timers: Timers,
}

impl Agent {
    pub fn new(
        channel: PeerChannel,
        blockchain: Arc<dyn Blockchain>,
        addresses: Arc<AddressBook>,
        config: Arc<NetworkConfig>,
    ) -> Self {
        let mut challenge_nonce = [0u8; constants::CHALLENGE_NONCE_SIZE];
        rand::rng().fill_bytes(&mut challenge_nonce);
        let window = Duration::from_millis(constants::ADDR_RATE_LIMIT_WINDOW_MS);
        Agent {
            channel,
            blockchain,
            addresses,
            config,
            listeners: Vec::new(),
            peer: None,
            version_sent: false,
            version_received: false,
            verack_sent: false,
            verack_received: false,
            peer_address_verified: false,
            handshaken: false,
            closed: false,
            version_attempts: 0,
            challenge_nonce,
            peer_challenge_nonce: None,
            known_addresses: HashMap::new(),
            ping_times: HashMap::new(),
            addr_queue: ThrottledQueue::new(
                constants::MAX_ADDR_QUEUE_SIZE,
                constants::MAX_ADDR_RELAY_PER_MESSAGE,
                constants::ADDR_RATE_LIMIT,
                window,
            ),
            addr_limit: RateLimit::new(constants::ADDR_RATE_LIMIT, window),
            timers: Timers::new(),
        }
    }

    /// Register a synchronous event observer. Listeners run inline from
    /// the emitting handler, in registration order.
    pub fn on_event(
        &mut self,
        listener: impl FnMut(&AgentEvent, &mut PeerChannel) + Send + 'static,
    ) {
        self.listeners.push(Box::new(listener));
    }

    /// The negotiated peer, once a version message was accepted.
    pub fn peer(&self) -> Option<&Peer> {
        self.peer.as_ref()
    }

    pub fn is_handshaken(&self) -> bool {
        self.handshaken
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Spawn the agent's event loop and return a command handle.
    pub fn spawn(self, inbound: mpsc::Receiver<ChannelEvent>) -> AgentHandle {
        let (command_tx, command_rx) = mpsc::channel(16);
        tokio::spawn(self.run(inbound, command_rx));
        AgentHandle { command_tx }
    }

    /// Drive the agent until the channel closes. Inbound events are
    /// processed in arrival order; timers fire between events, never
    /// concurrently with a handler.
    pub async fn run(
        mut self,
        mut inbound: mpsc::Receiver<ChannelEvent>,
        mut commands: mpsc::Receiver<AgentCommand>,
    ) {
        let mut commands_open = true;
        loop {
            if self.closed {
                break;
            }
            let deadline = self.timers.next_deadline();
            let sleep_target =
                deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));
            tokio::select! {
                event = inbound.recv() => match event {
                    Some(ChannelEvent::Message(msg)) => {
                        self.channel.note_message_received();
                        self.on_message(msg);
                    }
                    Some(ChannelEvent::Close) | None => {
                        tracing::debug!("channel closed");
                        self.teardown();
                    }
                },
                command = commands.recv(), if commands_open => match command {
                    Some(AgentCommand::Handshake) => self.handshake(),
                    Some(AgentCommand::RelayAddresses(addresses)) => {
                        self.relay_addresses(addresses);
                    }
                    Some(AgentCommand::Close(reason)) => self.close(reason),
                    None => commands_open = false,
                },
                _ = tokio::time::sleep_until(sleep_target), if deadline.is_some() => {
                    let now = Instant::now();
                    for name in self.timers.take_expired(now) {
                        if self.closed {
                            break;
                        }
                        self.on_timeout(&name);
                    }
                }
            }
        }
    }

    // ── Handshake ──

    /// Initiate the handshake by transmitting our version message.
    /// Idempotent once the message went out.
    pub fn handshake(&mut self) {
        if self.version_sent {
            return;
        }
        let now = Instant::now();
        let sent = self.channel.version(
            self.config.peer_address.clone(),
            self.blockchain.genesis_hash(),
            self.blockchain.head_hash(),
            self.challenge_nonce,
            crate::unix_time_ms(),
        );
        if !sent {
            self.version_attempts += 1;
            if self.version_attempts >= constants::VERSION_ATTEMPTS_MAX || self.channel.is_closed()
            {
                self.close(CloseReason::SendingOfVersionMessageFailed);
                return;
            }
            tracing::debug!(
                attempt = self.version_attempts,
                max = constants::VERSION_ATTEMPTS_MAX,
                "version message not sent, retrying"
            );
            self.timers.set(
                TIMER_VERSION_RETRY,
                now + Duration::from_millis(constants::VERSION_RETRY_DELAY_MS),
            );
            return;
        }
        self.version_sent = true;

        if !self.version_received {
            self.timers.set(
                TIMER_VERSION,
                now + Duration::from_millis(constants::HANDSHAKE_TIMEOUT_MS),
            );
        } else if self.peer_address_verified {
            self.send_verack();
        }
        if !self.verack_received {
            self.timers.set(
                TIMER_VERACK,
                now + Duration::from_millis(2 * constants::HANDSHAKE_TIMEOUT_MS),
            );
        }
        self.maybe_finish();
    }

    fn on_message(&mut self, msg: Message) {
        match msg {
            Message::Version {
                version,
                peer_address,
                genesis_hash,
                head_hash,
                challenge_nonce,
                timestamp,
            } => self.on_version(
                version,
                peer_address,
                genesis_hash,
                head_hash,
                challenge_nonce,
                timestamp,
            ),
            Message::Verack {
                public_key,
                signature,
            } => self.on_verack(public_key, signature),
            Message::Addr { addresses } => self.on_addr(addresses),
            Message::GetAddr {
                protocol_mask,
                service_mask,
            } => self.on_get_addr(protocol_mask, service_mask),
            Message::Ping { nonce } => self.on_ping(nonce),
            Message::Pong { nonce } => self.on_pong(nonce),
            Message::Reject { kind, code, reason } => {
                tracing::debug!(kind = %kind, code = ?code, reason = %reason,
                    "peer rejected our message");
            }
        }
    }

    /// Message admission: nothing but version before version, nothing but
    /// verack between version and verack.
    fn admit(&self, kind: MessageKind) -> bool {
        if !self.version_received && kind != MessageKind::Version {
            tracing::warn!(kind = %kind, "dropping message, no version received yet");
            return false;
        }
        if self.version_received
            && !self.verack_received
            && !matches!(kind, MessageKind::Version | MessageKind::Verack)
        {
            tracing::warn!(kind = %kind, "dropping message, handshake incomplete");
            return false;
        }
        true
    }

    fn on_version(
        &mut self,
        version: u32,
        mut peer_address: PeerAddress,
        genesis_hash: Hash,
        head_hash: Hash,
        challenge_nonce: [u8; constants::CHALLENGE_NONCE_SIZE],
        timestamp: u64,
    ) {
        if !self.admit(MessageKind::Version) {
            return;
        }
        if self.version_received {
            tracing::debug!("ignoring duplicate version message");
            return;
        }
        self.timers.cancel(TIMER_VERSION);

        if version < constants::MIN_PROTOCOL_VERSION {
            tracing::warn!(
                version,
                min = constants::MIN_PROTOCOL_VERSION,
                "peer runs an incompatible protocol version"
            );
            self.channel.reject(
                MessageKind::Version,
                RejectCode::Obsolete,
                "incompatible protocol version",
            );
            self.close(CloseReason::IncompatibleVersion);
            return;
        }
        if genesis_hash != self.blockchain.genesis_hash() {
            self.close(CloseReason::DifferentGenesisBlock);
            return;
        }
        if !peer_address.verify() {
            self.close(CloseReason::InvalidPeerAddressInVersionMessage);
            return;
        }

        if let Some(expected) = &self.channel.peer_address {
            if expected.peer_id() != peer_address.peer_id() {
                self.close(CloseReason::UnexpectedPeerAddressInVersionMessage);
                return;
            }
            // Outbound connection: the dialed identity answered, so the
            // address is proven without waiting for the verack.
            self.peer_address_verified = true;
        }

        if peer_address.net_address.is_none() {
            if let Some(stored) = self.addresses.get(&peer_address.peer_id()) {
                peer_address.net_address = stored.net_address;
            }
        }
        self.channel.peer_address = Some(peer_address.clone());

        let time_offset = timestamp as i64 - crate::unix_time_ms() as i64;
        let peer = Peer {
            peer_address,
            version,
            head_hash,
            time_offset,
        };
        let peer_id = peer.id();
        self.peer = Some(peer.clone());
        self.peer_challenge_nonce = Some(challenge_nonce);
        self.version_received = true;

        tracing::debug!(
            peer = %hex::encode(&peer_id[..8]),
            version,
            time_offset,
            "version message accepted"
        );
        self.emit(AgentEvent::Version(peer));
        if self.channel.is_closed() {
            // A listener vetoed the peer mid-handshake
            self.teardown();
            return;
        }

        if !self.version_sent {
            self.handshake();
            if self.closed {
                return;
            }
        }
        if self.peer_address_verified && !self.verack_sent {
            self.send_verack();
        }
    }

    fn send_verack(&mut self) {
        debug_assert!(
            self.peer_address_verified,
            "verack requires a verified peer address"
        );
        let (peer_id, nonce) = match (&self.peer, self.peer_challenge_nonce) {
            (Some(peer), Some(nonce)) => (peer.id(), nonce),
            _ => {
                debug_assert!(false, "verack requires a negotiated peer");
                return;
            }
        };
        let payload = verack_payload(&peer_id, &nonce);
        let signature = self.config.key_pair.sign(&payload);
        if !self
            .channel
            .verack(self.config.key_pair.public.clone(), signature)
        {
            tracing::debug!("verack message not sent");
        }
        self.verack_sent = true;
        self.maybe_finish();
    }

    fn on_verack(&mut self, public_key: PublicKey, signature: Signature) {
        if !self.admit(MessageKind::Verack) {
            return;
        }
        if self.verack_received {
            tracing::debug!("ignoring duplicate verack message");
            return;
        }
        self.timers.cancel(TIMER_VERACK);

        let Some(peer) = self.peer.clone() else {
            debug_assert!(false, "verack admitted without a negotiated peer");
            return;
        };
        if public_key.peer_id() != peer.id() {
            self.close(CloseReason::InvalidPublicKeyInVerackMessage);
            return;
        }
        let payload = verack_payload(&self.config.peer_address.peer_id(), &self.challenge_nonce);
        if !public_key.verify(&payload, &signature) {
            self.close(CloseReason::InvalidSignatureInVerackMessage);
            return;
        }

        if !self.peer_address_verified {
            // Inbound connection: the signature over our challenge proves
            // the announced address, so our verack can go out now.
            self.peer_address_verified = true;
            if self.version_sent && !self.verack_sent {
                self.send_verack();
            }
        }

        self.known_addresses.insert(
            peer.id(),
            KnownAddress::of(&peer.peer_address, Instant::now()),
        );
        self.verack_received = true;
        let peer_id = peer.id();
        tracing::debug!(peer = %hex::encode(&peer_id[..8]), "verack message accepted");
        self.maybe_finish();
    }

    /// Complete the handshake once both verack directions are done:
    /// install the liveness and self-announce intervals, notify
    /// observers, and ask the peer for addresses.
    fn maybe_finish(&mut self) {
        if self.handshaken
            || self.closed
            || !self.verack_sent
            || !self.verack_received
        {
            return;
        }
        self.handshaken = true;
        let now = Instant::now();
        self.timers.set(
            TIMER_CONNECTIVITY,
            now + Duration::from_millis(constants::CONNECTIVITY_CHECK_INTERVAL_MS),
        );
        self.timers.set(
            TIMER_ANNOUNCE_ADDR,
            now + Duration::from_millis(constants::ANNOUNCE_ADDR_INTERVAL_MS),
        );

        let Some(peer) = self.peer.clone() else {
            debug_assert!(false, "handshake finished without a negotiated peer");
            return;
        };
        let peer_id = peer.id();
        tracing::info!(peer = %hex::encode(&peer_id[..8]), "handshake completed");
        self.emit(AgentEvent::Handshake(peer));

        if !self
            .channel
            .get_addr(self.config.protocol_mask, self.config.services.accepted)
        {
            tracing::debug!("get-addr message not sent");
        }
    }

    // ── Address relay ──

    /// Offer addresses for relay to this peer. A no-op until our version
    /// went out and the peer's verack came back.
    pub fn relay_addresses(&mut self, addresses: Vec<PeerAddress>) {
        if !self.verack_received || !self.version_sent || self.closed {
            return;
        }
        for address in addresses {
            self.addr_queue.enqueue(address);
        }
        if !self.addr_queue.is_empty() && !self.timers.contains(TIMER_ADDR_QUEUE) {
            self.timers.set(
                TIMER_ADDR_QUEUE,
                Instant::now() + Duration::from_millis(constants::ADDR_QUEUE_INTERVAL_MS),
            );
        }
    }

    fn flush_addr_queue(&mut self) {
        let now = Instant::now();
        let throttle = Duration::from_millis(constants::RELAY_THROTTLE_MS);
        let batch = self.addr_queue.dequeue_batch(now);
        let mut relayed: Vec<PeerAddress> = Vec::new();
        for address in batch {
            if address.protocol == Protocol::WebRtc && address.distance >= constants::MAX_DISTANCE
            {
                continue;
            }
            if address.protocol == Protocol::Dumb {
                continue;
            }
            if address.is_seed() {
                continue;
            }
            let fresh = match self.known_addresses.get(&address.peer_id()) {
                None => true,
                Some(known) => {
                    (known.protocol == Protocol::WebRtc && known.distance > address.distance)
                        || now.duration_since(known.since) > throttle
                }
            };
            if fresh {
                relayed.push(address);
            }
        }
        if !relayed.is_empty() {
            if !self.channel.addr(relayed.clone()) {
                tracing::debug!(count = relayed.len(), "addr message not sent");
            }
            for address in relayed {
                self.known_addresses
                    .insert(address.peer_id(), KnownAddress::of(&address, now));
            }
        }
        if !self.addr_queue.is_empty() {
            self.timers.set(
                TIMER_ADDR_QUEUE,
                now + Duration::from_millis(constants::ADDR_QUEUE_INTERVAL_MS),
            );
        }
    }

    fn announce_own_address(&mut self) {
        self.timers.set(
            TIMER_ANNOUNCE_ADDR,
            Instant::now() + Duration::from_millis(constants::ANNOUNCE_ADDR_INTERVAL_MS),
        );
        self.relay_addresses(vec![self.config.peer_address.clone()]);
    }

    fn on_addr(&mut self, addresses: Vec<PeerAddress>) {
        if !self.admit(MessageKind::Addr) {
            return;
        }
        if addresses.len() > constants::MAX_ADDR_PER_MESSAGE {
            self.close(CloseReason::AddrMessageTooLarge);
            return;
        }
        let now = Instant::now();
        if !self.addr_limit.note(addresses.len(), now) {
            self.close(CloseReason::RateLimitExceeded);
            return;
        }
        for address in &addresses {
            if !address.verify() {
                self.close(CloseReason::InvalidAddr);
                return;
            }
            if address.protocol == Protocol::WebSocket && !address.is_globally_reachable() {
                self.close(CloseReason::AddrNotGloballyReachable);
                return;
            }
            self.known_addresses
                .insert(address.peer_id(), KnownAddress::of(address, now));
        }
        let Some(peer) = &self.peer else {
            debug_assert!(false, "addr admitted without a negotiated peer");
            return;
        };
        self.addresses.add(peer.id(), &addresses);
        tracing::debug!(count = addresses.len(), "addr message accepted");
        self.emit(AgentEvent::Addr(addresses));
    }

    fn on_get_addr(&mut self, protocol_mask: u8, service_mask: u32) {
        if !self.admit(MessageKind::GetAddr) {
            return;
        }
        let now = Instant::now();
        let throttle = Duration::from_millis(constants::RELAY_THROTTLE_MS);
        let results =
            self.addresses
                .query(protocol_mask, service_mask, constants::MAX_ADDR_PER_MESSAGE);
        let filtered: Vec<PeerAddress> = results
            .into_iter()
            .filter(|address| {
                if address.protocol == Protocol::WebRtc
                    && address.distance >= constants::MAX_DISTANCE
                {
                    return false;
                }
                match self.known_addresses.get(&address.peer_id()) {
                    None => true,
                    Some(known) => now.duration_since(known.since) > throttle,
                }
            })
            .collect();
        // Never answer with an empty addr message
        if filtered.is_empty() {
            return;
        }
        if !self.channel.addr(filtered) {
            tracing::debug!("addr response not sent");
        }
    }

    // ── Liveness ──

    fn check_connectivity(&mut self) {
        let now = Instant::now();
        let interval = Duration::from_millis(constants::CONNECTIVITY_CHECK_INTERVAL_MS);
        self.timers.set(TIMER_CONNECTIVITY, now + interval);

        let mut nonce: u32 = rand::rng().random();
        while self.ping_times.contains_key(&nonce) {
            nonce = rand::rng().random();
        }
        if !self.channel.ping(nonce) {
            self.close(CloseReason::SendingPingMessageFailed);
            return;
        }
        self.ping_times.insert(nonce, now);

        // Only a channel that has been quiet for a full interval gets a
        // deadline on this nonce; active peers prove liveness by talking.
        let quiet = self
            .channel
            .last_message_at()
            .map_or(true, |at| now.duration_since(at) > interval);
        if quiet {
            self.timers.set(
                ping_timer_name(nonce),
                now + Duration::from_millis(constants::PING_TIMEOUT_MS),
            );
        }
    }

    fn on_ping(&mut self, nonce: u32) {
        if !self.admit(MessageKind::Ping) {
            return;
        }
        if !self.channel.pong(nonce) {
            tracing::debug!(nonce, "pong message not sent");
        }
    }

    fn on_pong(&mut self, nonce: u32) {
        if !self.admit(MessageKind::Pong) {
            return;
        }
        self.timers.cancel(&ping_timer_name(nonce));
        if let Some(start) = self.ping_times.remove(&nonce) {
            let delta = Instant::now().duration_since(start);
            if !delta.is_zero() {
                tracing::debug!(nonce, delta_ms = delta.as_millis() as u64, "ping answered");
                self.emit(AgentEvent::PingPong(delta));
            }
        }
    }

    // ── Timers & close ──

    fn on_timeout(&mut self, name: &str) {
        match name {
            TIMER_VERSION_RETRY => self.handshake(),
            TIMER_VERSION => {
                tracing::warn!("peer sent no version message in time");
                self.close(CloseReason::VersionTimeout);
            }
            TIMER_VERACK => {
                tracing::warn!("peer sent no verack message in time");
                self.close(CloseReason::VerackTimeout);
            }
            TIMER_CONNECTIVITY => self.check_connectivity(),
            TIMER_ANNOUNCE_ADDR => self.announce_own_address(),
            TIMER_ADDR_QUEUE => self.flush_addr_queue(),
            name if name.starts_with(PING_TIMER_PREFIX) => {
                if let Ok(nonce) = name[PING_TIMER_PREFIX.len()..].parse::<u32>() {
                    self.ping_times.remove(&nonce);
                }
                tracing::warn!("peer did not answer ping in time");
                self.close(CloseReason::PingTimeout);
            }
            _ => tracing::debug!(timer = name, "expired timer without a handler"),
        }
    }

    /// Close the channel with a reason and tear the agent down.
    /// Idempotent; after the first call no timer fires and no event is
    /// emitted.
    pub fn close(&mut self, reason: CloseReason) {
        if self.closed {
            return;
        }
        tracing::info!(reason = %reason, "closing peer channel");
        self.channel.close(reason);
        self.teardown();
    }

    fn teardown(&mut self) {
        self.closed = true;
        self.timers.clear();
        self.addr_queue.clear();
    }

    fn emit(&mut self, event: AgentEvent) {
        let channel = &mut self.channel;
        for listener in &mut self.listeners {
            listener(&event, channel);
        }
    }
}
