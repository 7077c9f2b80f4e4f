//! Signal/discovery adapter interface.
//!
//! The adapter tells a swarm which peers exist and brokers the transport
//! channel when one peer dials another. Real backends (signal servers, NAT
//! traversal, relays) live outside this crate and implement
//! [`SignalManager`]; the in-memory [`MemorySignalManager`] included here
//! gives two manager instances in the same process immediate discovery with
//! no network delay, which is what the deterministic tests run on. Both
//! backends present identical observable semantics to the swarm.

use crate::config::SignalOptions;
use crate::error::{NetworkError, NetworkResult};
use async_trait::async_trait;
use peermesh_types::{PeerId, Topic};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

/// Events pushed by a signal adapter into a swarm.
///
/// Per `(topic, peer)` registration the adapter must deliver events in the
/// order it observed them; the swarm processes them sequentially.
#[derive(Debug)]
pub enum SignalEvent {
    /// A peer announced itself on the topic.
    PeerDiscovered {
        /// The announced peer.
        peer: PeerId,
    },

    /// A peer left the topic or its announcement expired.
    PeerLost {
        /// The lost peer.
        peer: PeerId,
    },

    /// A remote peer dialed us; the channel is our half of the transport.
    InboundDial {
        /// The dialing peer.
        from: PeerId,
        /// Our half of the negotiated transport.
        channel: TransportChannel,
    },
}

/// One half of a bidirectional transport between two peers.
pub struct TransportChannel {
    /// Payloads written here arrive at the remote half.
    pub tx: mpsc::UnboundedSender<Vec<u8>>,
    /// Payloads sent by the remote half arrive here.
    pub rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// Create a crossed pair of transport halves.
pub fn transport_pair() -> (TransportChannel, TransportChannel) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (
        TransportChannel { tx: a_tx, rx: a_rx },
        TransportChannel { tx: b_tx, rx: b_rx },
    )
}

impl std::fmt::Debug for TransportChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportChannel").finish_non_exhaustive()
    }
}

/// A swarm's subscription request, handed to [`SignalManager::join`].
pub struct SwarmRegistration {
    /// The topic being joined.
    pub topic: Topic,
    /// The local peer identity within the topic.
    pub peer_id: PeerId,
    /// Where the adapter pushes discovery events and inbound dials.
    pub events: mpsc::UnboundedSender<SignalEvent>,
    /// Opaque backend configuration, forwarded from `join`.
    pub options: SignalOptions,
}

/// External mechanism that informs a swarm which peers exist and brokers
/// transport negotiation.
#[async_trait]
pub trait SignalManager: Send + Sync {
    /// Register a `(topic, peer)` subscription.
    ///
    /// Must be idempotent: re-registering the same pair replaces the
    /// previous subscription and re-announces the peer to the topic.
    async fn join(&self, registration: SwarmRegistration) -> NetworkResult<()>;

    /// Drop a `(topic, peer)` subscription. Unknown pairs are a no-op.
    async fn leave(&self, topic: &Topic, peer: &PeerId) -> NetworkResult<()>;

    /// Negotiate a transport to `to`, delivering the remote half as an
    /// [`SignalEvent::InboundDial`] on the callee's subscription.
    async fn dial(
        &self,
        topic: &Topic,
        from: &PeerId,
        to: &PeerId,
    ) -> NetworkResult<TransportChannel>;
}

type PeerTable = HashMap<PeerId, mpsc::UnboundedSender<SignalEvent>>;

#[derive(Default)]
struct MemoryHub {
    topics: HashMap<Topic, PeerTable>,
}

/// In-memory signal adapter.
///
/// Clones share one hub; peers registered through any clone discover each
/// other immediately. Delivery is synchronous sends on the subscribers'
/// event channels, so ordering per subscriber follows registration order.
#[derive(Clone, Default)]
pub struct MemorySignalManager {
    inner: Arc<Mutex<MemoryHub>>,
}

impl MemorySignalManager {
    /// Create a hub with no subscriptions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of peers currently registered on a topic.
    pub fn peer_count(&self, topic: &Topic) -> usize {
        let hub = self.inner.lock().expect("hub poisoned");
        hub.topics.get(topic).map(|table| table.len()).unwrap_or(0)
    }
}

#[async_trait]
impl SignalManager for MemorySignalManager {
    async fn join(&self, registration: SwarmRegistration) -> NetworkResult<()> {
        let SwarmRegistration {
            topic,
            peer_id,
            events,
            options: _,
        } = registration;

        let mut hub = self.inner.lock().expect("hub poisoned");
        let table = hub.topics.entry(topic).or_default();

        // Announce the newcomer to everyone already on the topic. Dead
        // subscribers (dropped receivers) are pruned as they are found.
        table.retain(|existing, sender| {
            if *existing == peer_id {
                return true;
            }
            sender
                .send(SignalEvent::PeerDiscovered { peer: peer_id })
                .is_ok()
        });

        // Announce everyone already on the topic to the newcomer.
        for existing in table.keys().filter(|existing| **existing != peer_id) {
            let _ = events.send(SignalEvent::PeerDiscovered { peer: *existing });
        }

        // Re-registration replaces the previous subscription.
        table.insert(peer_id, events);
        debug!(topic = %topic, peer = %peer_id, "registered with in-memory hub");
        Ok(())
    }

    async fn leave(&self, topic: &Topic, peer: &PeerId) -> NetworkResult<()> {
        let mut hub = self.inner.lock().expect("hub poisoned");
        let Some(table) = hub.topics.get_mut(topic) else {
            return Ok(());
        };
        if table.remove(peer).is_none() {
            return Ok(());
        }
        for sender in table.values() {
            let _ = sender.send(SignalEvent::PeerLost { peer: *peer });
        }
        if table.is_empty() {
            hub.topics.remove(topic);
        }
        debug!(topic = %topic, peer = %peer, "left in-memory hub");
        Ok(())
    }

    async fn dial(
        &self,
        topic: &Topic,
        from: &PeerId,
        to: &PeerId,
    ) -> NetworkResult<TransportChannel> {
        let callee = {
            let hub = self.inner.lock().expect("hub poisoned");
            hub.topics
                .get(topic)
                .and_then(|table| table.get(to))
                .cloned()
        };
        let callee = callee.ok_or_else(|| NetworkError::ConnectionFailed {
            peer: *to,
            reason: "peer not registered on topic".to_string(),
        })?;

        let (local, remote) = transport_pair();
        callee
            .send(SignalEvent::InboundDial {
                from: *from,
                channel: remote,
            })
            .map_err(|_| NetworkError::ConnectionFailed {
                peer: *to,
                reason: "peer subscription closed".to_string(),
            })?;
        Ok(local)
    }
}
