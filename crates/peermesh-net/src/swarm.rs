//! Swarm reconciliation engine.
//!
//! One swarm owns all state for one topic: the known peer set, the live
//! connections, and the topology strategy. It runs as a dedicated task and
//! processes its inbox sequentially, which is what serializes discovery
//! events, topology swaps and teardown per topic while leaving distinct
//! topics fully concurrent.
//!
//! Reconciliation: whenever membership or topology changes, recompute the
//! desired connection set and converge. Connections no longer desired are
//! torn down first, then missing ones are initiated. For a peer pair whose
//! topologies both want the link, the side with the lower peer id dials and
//! the other side holds an accepting `Connecting` entry until the dial
//! arrives, so a pair never ends up with two live sessions on one topic.

use crate::connection::{Connection, ConnectionState};
use crate::error::{NetworkError, NetworkResult};
use crate::protocol::ProtocolSession;
use crate::signal::{SignalEvent, SignalManager, TransportChannel};
use crate::topology::Topology;
use peermesh_types::{PeerId, Topic};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn, Instrument};

/// Control messages sent to a swarm task.
pub(crate) enum SwarmCtrl {
    /// Replace the topology strategy and reconcile against it.
    SetTopology {
        topology: Topology,
        ack: oneshot::Sender<()>,
    },

    /// Snapshot the swarm state.
    Info { reply: oneshot::Sender<SwarmInfo> },

    /// An outbound dial finished.
    DialComplete {
        peer: PeerId,
        generation: u64,
        result: NetworkResult<TransportChannel>,
    },

    /// A connection's receive pump observed the remote closing.
    PumpClosed { peer: PeerId, generation: u64 },

    /// Tear everything down and stop the task.
    Shutdown {
        ack: oneshot::Sender<NetworkResult<()>>,
    },
}

/// Point-in-time snapshot of one swarm, for tooling and tests.
#[derive(Debug, Clone)]
pub struct SwarmInfo {
    /// The topic this swarm serves.
    pub topic: Topic,
    /// The local peer identity.
    pub local_peer: PeerId,
    /// The active topology strategy.
    pub topology: Topology,
    /// Peers currently announced on the topic (sorted).
    pub known_peers: Vec<PeerId>,
    /// Tracked connections and their states (sorted by peer).
    pub connections: Vec<(PeerId, ConnectionState)>,
}

impl SwarmInfo {
    /// Whether an established connection to `peer` exists.
    pub fn is_connected_to(&self, peer: &PeerId) -> bool {
        self.connections
            .iter()
            .any(|(p, state)| p == peer && *state == ConnectionState::Connected)
    }

    /// Peers with an established connection (sorted).
    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.connections
            .iter()
            .filter(|(_, state)| *state == ConnectionState::Connected)
            .map(|(peer, _)| *peer)
            .collect()
    }
}

/// Cheap handle for driving a swarm task.
#[derive(Clone)]
pub(crate) struct SwarmHandle {
    ctrl: mpsc::UnboundedSender<SwarmCtrl>,
}

impl SwarmHandle {
    pub(crate) async fn set_topology(&self, topology: Topology) -> NetworkResult<()> {
        let (ack, done) = oneshot::channel();
        self.ctrl
            .send(SwarmCtrl::SetTopology { topology, ack })
            .map_err(|_| NetworkError::ChannelClosed)?;
        done.await.map_err(|_| NetworkError::ChannelClosed)
    }

    pub(crate) async fn info(&self) -> NetworkResult<SwarmInfo> {
        let (reply, info) = oneshot::channel();
        self.ctrl
            .send(SwarmCtrl::Info { reply })
            .map_err(|_| NetworkError::ChannelClosed)?;
        info.await.map_err(|_| NetworkError::ChannelClosed)
    }

    /// Tear the swarm down. Every session notification owed by live
    /// connections is delivered before this resolves.
    pub(crate) async fn shutdown(self) -> NetworkResult<()> {
        let (ack, done) = oneshot::channel();
        self.ctrl
            .send(SwarmCtrl::Shutdown { ack })
            .map_err(|_| NetworkError::ChannelClosed)?;
        done.await.map_err(|_| NetworkError::ChannelClosed)?
    }
}

pub(crate) struct Swarm {
    topic: Topic,
    local_peer: PeerId,
    topology: Topology,
    session: Arc<dyn ProtocolSession>,
    signal: Arc<dyn SignalManager>,
    known_peers: HashSet<PeerId>,
    connections: HashMap<PeerId, Connection>,
    ctrl_tx: mpsc::UnboundedSender<SwarmCtrl>,
    next_generation: u64,
}

impl Swarm {
    /// Start the swarm task and return its handle.
    pub(crate) fn spawn(
        parent: &tracing::Span,
        topic: Topic,
        local_peer: PeerId,
        topology: Topology,
        session: Arc<dyn ProtocolSession>,
        signal: Arc<dyn SignalManager>,
        signal_rx: mpsc::UnboundedReceiver<SignalEvent>,
    ) -> SwarmHandle {
        let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
        let swarm = Swarm {
            topic,
            local_peer,
            topology,
            session,
            signal,
            known_peers: HashSet::new(),
            connections: HashMap::new(),
            ctrl_tx: ctrl_tx.clone(),
            next_generation: 0,
        };
        let span =
            tracing::info_span!(parent: parent, "swarm", topic = %topic, peer = %local_peer);
        tokio::spawn(swarm.run(ctrl_rx, signal_rx).instrument(span));
        SwarmHandle { ctrl: ctrl_tx }
    }

    async fn run(
        mut self,
        mut ctrl_rx: mpsc::UnboundedReceiver<SwarmCtrl>,
        mut signal_rx: mpsc::UnboundedReceiver<SignalEvent>,
    ) {
        let mut signal_open = true;
        loop {
            tokio::select! {
                ctrl = ctrl_rx.recv() => match ctrl {
                    Some(SwarmCtrl::Shutdown { ack }) => {
                        let result = self.shutdown().await;
                        let _ = ack.send(result);
                        return;
                    }
                    Some(ctrl) => self.handle_ctrl(ctrl),
                    // Every handle dropped without an explicit leave;
                    // release connections so sessions still observe their
                    // disconnects.
                    None => {
                        let _ = self.shutdown().await;
                        return;
                    }
                },
                event = signal_rx.recv(), if signal_open => match event {
                    Some(event) => self.handle_signal(event),
                    None => signal_open = false,
                },
            }
        }
    }

    fn handle_signal(&mut self, event: SignalEvent) {
        match event {
            SignalEvent::PeerDiscovered { peer } => {
                if peer == self.local_peer {
                    return;
                }
                if self.known_peers.insert(peer) {
                    debug!(peer = %peer, "peer discovered");
                } else {
                    trace!(peer = %peer, "peer re-announced");
                }
                self.reconcile();
            }
            SignalEvent::PeerLost { peer } => {
                if self.known_peers.remove(&peer) {
                    debug!(peer = %peer, "peer lost");
                    self.reconcile();
                }
            }
            SignalEvent::InboundDial { from, channel } => self.handle_inbound_dial(from, channel),
        }
    }

    fn handle_ctrl(&mut self, ctrl: SwarmCtrl) {
        match ctrl {
            SwarmCtrl::SetTopology { topology, ack } => {
                debug!(%topology, "topology reassigned");
                self.topology = topology;
                self.reconcile();
                let _ = ack.send(());
            }
            SwarmCtrl::Info { reply } => {
                let _ = reply.send(self.info());
            }
            SwarmCtrl::DialComplete {
                peer,
                generation,
                result,
            } => self.handle_dial_complete(peer, generation, result),
            SwarmCtrl::PumpClosed { peer, generation } => {
                if self.connections.get(&peer).map(Connection::generation) == Some(generation) {
                    debug!(peer = %peer, "remote closed transport");
                    self.teardown(&peer);
                }
            }
            SwarmCtrl::Shutdown { .. } => unreachable!("shutdown is intercepted by the run loop"),
        }
    }

    /// Converge `connections` to `topology(known_peers, local_peer)`.
    /// Undesired connections are released before any new one is initiated.
    fn reconcile(&mut self) {
        let desired = self.topology.evaluate(&self.known_peers, &self.local_peer);

        let extra: Vec<PeerId> = self
            .connections
            .keys()
            .filter(|peer| !desired.contains(*peer))
            .copied()
            .collect();
        for peer in extra {
            self.teardown(&peer);
        }

        let mut missing: Vec<PeerId> = desired
            .into_iter()
            .filter(|peer| !self.connections.contains_key(peer))
            .collect();
        missing.sort();
        for peer in missing {
            self.connect(peer);
        }
    }

    fn connect(&mut self, peer: PeerId) {
        let generation = self.next_generation;
        self.next_generation += 1;

        let mut connection = Connection::new(peer, generation, self.session.clone());
        connection.begin_connecting();

        if self.initiates_to(&peer) {
            let signal = self.signal.clone();
            let ctrl = self.ctrl_tx.clone();
            let topic = self.topic;
            let local = self.local_peer;
            tokio::spawn(
                async move {
                    let result = signal.dial(&topic, &local, &peer).await;
                    let _ = ctrl.send(SwarmCtrl::DialComplete {
                        peer,
                        generation,
                        result,
                    });
                }
                .in_current_span(),
            );
        }

        self.connections.insert(peer, connection);
    }

    fn teardown(&mut self, peer: &PeerId) {
        if let Some(mut connection) = self.connections.remove(peer) {
            connection.close();
        }
    }

    fn handle_dial_complete(
        &mut self,
        peer: PeerId,
        generation: u64,
        result: NetworkResult<TransportChannel>,
    ) {
        let current = self.connections.get(&peer).map(Connection::generation);
        if current != Some(generation) {
            // The connection was replaced or torn down while the dial was
            // in flight; dropping the channel closes the remote half.
            trace!(peer = %peer, "discarding stale dial result");
            return;
        }
        match result {
            Ok(channel) => {
                let ctrl = self.ctrl_tx.clone();
                if let Some(connection) = self.connections.get_mut(&peer) {
                    connection.establish(channel, move || {
                        let _ = ctrl.send(SwarmCtrl::PumpClosed { peer, generation });
                    });
                }
            }
            Err(error) => {
                if let Some(connection) = self.connections.get_mut(&peer) {
                    connection.fail(error);
                }
                // Leave the peer known but unconnected; a re-announcement
                // from discovery is what triggers a retry.
                self.teardown(&peer);
            }
        }
    }

    fn handle_inbound_dial(&mut self, from: PeerId, channel: TransportChannel) {
        if self.initiates_to(&from) {
            debug!(peer = %from, "dropping inbound dial from peer we initiate to");
            return;
        }
        let ctrl = self.ctrl_tx.clone();
        let Some(connection) = self.connections.get_mut(&from) else {
            debug!(peer = %from, "dropping inbound dial from undesired peer");
            return;
        };
        if connection.state() != ConnectionState::Connecting {
            debug!(peer = %from, state = ?connection.state(), "dropping redundant inbound dial");
            return;
        }
        let generation = connection.generation();
        connection.establish(channel, move || {
            let _ = ctrl.send(SwarmCtrl::PumpClosed {
                peer: from,
                generation,
            });
        });
    }

    /// The lower peer id dials; the higher side accepts.
    fn initiates_to(&self, peer: &PeerId) -> bool {
        self.local_peer < *peer
    }

    async fn shutdown(&mut self) -> NetworkResult<()> {
        debug!("swarm shutting down");
        let mut result = Ok(());
        if let Err(error) = self.signal.leave(&self.topic, &self.local_peer).await {
            warn!(%error, "discovery deregistration failed");
            result = Err(NetworkError::Teardown(error.to_string()));
        }
        let peers: Vec<PeerId> = self.connections.keys().copied().collect();
        for peer in peers {
            self.teardown(&peer);
        }
        self.known_peers.clear();
        result
    }

    fn info(&self) -> SwarmInfo {
        let mut known_peers: Vec<PeerId> = self.known_peers.iter().copied().collect();
        known_peers.sort();
        let mut connections: Vec<(PeerId, ConnectionState)> = self
            .connections
            .iter()
            .map(|(peer, connection)| (*peer, connection.state()))
            .collect();
        connections.sort_by_key(|(peer, _)| *peer);
        SwarmInfo {
            topic: self.topic,
            local_peer: self.local_peer,
            topology: self.topology,
            known_peers,
            connections,
        }
    }
}
