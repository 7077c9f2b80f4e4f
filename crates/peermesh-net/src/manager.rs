//! Network manager registry.
//!
//! The manager is the public entry point: it keys swarms by topic, routes
//! discovery registrations to the signal adapter, and owns the only state
//! shared across topics, the registry itself. Structural operations are
//! serialized per topic (claim the slot, then register; remove the slot,
//! then await teardown) while distinct topics proceed fully concurrently.

use crate::config::SignalOptions;
use crate::error::{NetworkError, NetworkResult};
use crate::protocol::ProtocolProvider;
use crate::signal::{MemorySignalManager, SignalManager, SwarmRegistration};
use crate::swarm::{Swarm, SwarmHandle, SwarmInfo};
use crate::topology::Topology;
use futures::future::join_all;
use peermesh_types::{PeerId, Topic};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Options for joining one swarm.
pub struct JoinSwarmOptions {
    /// The topic to join.
    pub topic: Topic,
    /// The local peer identity within this swarm.
    pub peer_id: PeerId,
    /// Factory for the protocol session attached to the swarm.
    pub protocol: Arc<dyn ProtocolProvider>,
    /// Topology strategy. Default: full mesh.
    pub topology: Topology,
    /// Opaque configuration forwarded to the signal adapter.
    pub signal: SignalOptions,
}

impl JoinSwarmOptions {
    /// Create options with the default topology and empty signal config.
    pub fn new(topic: Topic, peer_id: PeerId, protocol: Arc<dyn ProtocolProvider>) -> Self {
        Self {
            topic,
            peer_id,
            protocol,
            topology: Topology::default(),
            signal: SignalOptions::default(),
        }
    }

    /// Set the topology strategy.
    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    /// Set the signal adapter configuration.
    pub fn with_signal(mut self, signal: SignalOptions) -> Self {
        self.signal = signal;
        self
    }
}

/// Registry of swarms keyed by topic.
///
/// The manager emits nothing itself; every observable side effect flows
/// through the protocol sessions supplied at `join`.
pub struct NetworkManager {
    signal: Arc<dyn SignalManager>,
    swarms: Mutex<HashMap<Topic, SwarmHandle>>,
    destroyed: AtomicBool,
    span: tracing::Span,
}

impl NetworkManager {
    /// Create a manager backed by the given signal adapter.
    pub fn new(signal: Arc<dyn SignalManager>) -> Self {
        let instance = format!("{:08x}", rand::random::<u32>());
        let span = tracing::info_span!("network_manager", %instance);
        Self {
            signal,
            swarms: Mutex::new(HashMap::new()),
            destroyed: AtomicBool::new(false),
            span,
        }
    }

    /// Create a manager backed by a private in-memory hub.
    ///
    /// Two managers built this way do not discover each other; share one
    /// [`MemorySignalManager`] clone across managers for that.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySignalManager::new()))
    }

    /// Create or reject a swarm for `topic` and begin reconciliation.
    ///
    /// Configuration errors (zero identifiers, occupied topic, destroyed
    /// manager) fail here; connection establishment proceeds asynchronously
    /// and is observed through the protocol session, not this return.
    pub async fn join_swarm(&self, options: JoinSwarmOptions) -> NetworkResult<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(NetworkError::ManagerDestroyed);
        }
        if options.topic.is_zero() {
            return Err(NetworkError::InvalidTopic(
                "zero-valued topic is reserved".to_string(),
            ));
        }
        if options.peer_id.is_zero() {
            return Err(NetworkError::InvalidPeerId(
                "zero-valued peer id is reserved".to_string(),
            ));
        }

        let JoinSwarmOptions {
            topic,
            peer_id,
            protocol,
            topology,
            signal: signal_options,
        } = options;

        let session = protocol.create_session(&topic, &peer_id);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        {
            let mut swarms = self.swarms.lock().expect("registry poisoned");
            // Re-checked under the lock so a concurrent destroy cannot
            // drain the registry between the check and the insert.
            if self.destroyed.load(Ordering::SeqCst) {
                return Err(NetworkError::ManagerDestroyed);
            }
            if swarms.contains_key(&topic) {
                return Err(NetworkError::TopicAlreadyJoined(topic));
            }
            let handle = Swarm::spawn(
                &self.span,
                topic,
                peer_id,
                topology,
                session,
                self.signal.clone(),
                signal_rx,
            );
            swarms.insert(topic, handle);
        }

        // The registry slot is claimed first so concurrent joins for the
        // topic are rejected; a failed discovery registration releases it.
        let registration = SwarmRegistration {
            topic,
            peer_id,
            events: signal_tx,
            options: signal_options,
        };
        if let Err(error) = self.signal.join(registration).await {
            let handle = self.swarms.lock().expect("registry poisoned").remove(&topic);
            if let Some(handle) = handle {
                let _ = handle.shutdown().await;
            }
            return Err(error);
        }

        info!(parent: &self.span, topic = %topic, peer = %peer_id, "joined swarm");
        Ok(())
    }

    /// Tear down the swarm for `topic`, if any.
    ///
    /// Resolves after every connection reached its terminal state and every
    /// owed `Disconnected` notification was delivered. Unknown topics are a
    /// no-op. A teardown failure is reported after the registry entry is
    /// already released, so a failing close cannot wedge the topic.
    pub async fn leave_swarm(&self, topic: &Topic) -> NetworkResult<()> {
        let handle = self.swarms.lock().expect("registry poisoned").remove(topic);
        let Some(handle) = handle else {
            debug!(parent: &self.span, topic = %topic, "leave for unknown topic ignored");
            return Ok(());
        };
        let result = handle.shutdown().await;
        info!(parent: &self.span, topic = %topic, "left swarm");
        result
    }

    /// Tear down every swarm, concurrently. Idempotent; the first teardown
    /// error (if any) is reported after all swarms finished.
    pub async fn destroy(&self) -> NetworkResult<()> {
        let handles: Vec<SwarmHandle> = {
            let mut swarms = self.swarms.lock().expect("registry poisoned");
            self.destroyed.store(true, Ordering::SeqCst);
            swarms.drain().map(|(_, handle)| handle).collect()
        };
        if handles.is_empty() {
            return Ok(());
        }
        let results = join_all(handles.into_iter().map(SwarmHandle::shutdown)).await;
        info!(parent: &self.span, "network manager destroyed");
        results.into_iter().find(Result::is_err).unwrap_or(Ok(()))
    }

    /// Replace the topology for `topic` and reconcile against it.
    ///
    /// Safe at any time, including while connections are establishing.
    pub async fn set_topology(&self, topic: &Topic, topology: Topology) -> NetworkResult<()> {
        let handle = self.handle_for(topic)?;
        handle.set_topology(topology).await
    }

    /// Snapshot the state of one swarm.
    pub async fn swarm_info(&self, topic: &Topic) -> NetworkResult<SwarmInfo> {
        let handle = self.handle_for(topic)?;
        handle.info().await
    }

    /// Topics with a live swarm, in no particular order.
    pub fn topics(&self) -> Vec<Topic> {
        self.swarms
            .lock()
            .expect("registry poisoned")
            .keys()
            .copied()
            .collect()
    }

    /// Whether `destroy` has been called.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn handle_for(&self, topic: &Topic) -> NetworkResult<SwarmHandle> {
        self.swarms
            .lock()
            .expect("registry poisoned")
            .get(topic)
            .cloned()
            .ok_or(NetworkError::UnknownTopic(*topic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ProtocolEvent;
    use crate::protocol::ProtocolSession;

    struct NullSession;

    impl ProtocolSession for NullSession {
        fn deliver(&self, _event: ProtocolEvent) {}
    }

    fn null_provider() -> Arc<dyn ProtocolProvider> {
        Arc::new(|_: &Topic, _: &PeerId| -> Arc<dyn ProtocolSession> { Arc::new(NullSession) })
    }

    fn options(topic: Topic, peer_id: PeerId) -> JoinSwarmOptions {
        JoinSwarmOptions::new(topic, peer_id, null_provider())
    }

    #[tokio::test]
    async fn test_join_rejects_zero_identifiers() {
        let manager = NetworkManager::in_memory();

        let err = manager
            .join_swarm(options(Topic::from_bytes([0u8; 32]), PeerId::random()))
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::InvalidTopic(_)));
        assert!(err.is_config());

        let err = manager
            .join_swarm(options(Topic::random(), PeerId::from_bytes([0u8; 32])))
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::InvalidPeerId(_)));
    }

    #[tokio::test]
    async fn test_duplicate_join_is_rejected() {
        let manager = NetworkManager::in_memory();
        let topic = Topic::random();

        manager
            .join_swarm(options(topic, PeerId::random()))
            .await
            .unwrap();
        let err = manager
            .join_swarm(options(topic, PeerId::random()))
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::TopicAlreadyJoined(t) if t == topic));
    }

    #[tokio::test]
    async fn test_topic_is_reusable_after_leave() {
        let manager = NetworkManager::in_memory();
        let topic = Topic::random();

        manager
            .join_swarm(options(topic, PeerId::random()))
            .await
            .unwrap();
        manager.leave_swarm(&topic).await.unwrap();
        manager
            .join_swarm(options(topic, PeerId::random()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_leave_unknown_topic_is_noop() {
        let manager = NetworkManager::in_memory();
        manager.leave_swarm(&Topic::random()).await.unwrap();
    }

    #[tokio::test]
    async fn test_topics_tracks_registry() {
        let manager = NetworkManager::in_memory();
        let topic_a = Topic::random();
        let topic_b = Topic::random();

        manager
            .join_swarm(options(topic_a, PeerId::random()))
            .await
            .unwrap();
        manager
            .join_swarm(options(topic_b, PeerId::random()))
            .await
            .unwrap();

        let mut topics = manager.topics();
        topics.sort();
        let mut expected = vec![topic_a, topic_b];
        expected.sort();
        assert_eq!(topics, expected);

        manager.leave_swarm(&topic_a).await.unwrap();
        assert_eq!(manager.topics(), vec![topic_b]);
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent_and_blocks_joins() {
        let manager = NetworkManager::in_memory();
        let topic = Topic::random();
        manager
            .join_swarm(options(topic, PeerId::random()))
            .await
            .unwrap();

        manager.destroy().await.unwrap();
        assert!(manager.is_destroyed());
        assert!(manager.topics().is_empty());

        manager.destroy().await.unwrap();

        let err = manager
            .join_swarm(options(Topic::random(), PeerId::random()))
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::ManagerDestroyed));
    }

    #[tokio::test]
    async fn test_set_topology_requires_live_swarm() {
        let manager = NetworkManager::in_memory();
        let topic = Topic::random();
        let err = manager
            .set_topology(&topic, Topology::FullMesh)
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::UnknownTopic(t) if t == topic));
    }

    #[tokio::test]
    async fn test_swarm_info_reflects_join() {
        let manager = NetworkManager::in_memory();
        let topic = Topic::random();
        let peer_id = PeerId::random();
        let hub = PeerId::random();

        manager
            .join_swarm(options(topic, peer_id).with_topology(Topology::Star { hub }))
            .await
            .unwrap();

        let info = manager.swarm_info(&topic).await.unwrap();
        assert_eq!(info.topic, topic);
        assert_eq!(info.local_peer, peer_id);
        assert_eq!(info.topology, Topology::Star { hub });
        assert!(info.known_peers.is_empty());
        assert!(info.connections.is_empty());
    }

    #[tokio::test]
    async fn test_join_registers_with_shared_hub() {
        let hub = MemorySignalManager::new();
        let manager = NetworkManager::new(Arc::new(hub.clone()));
        let topic = Topic::random();

        manager
            .join_swarm(options(topic, PeerId::random()))
            .await
            .unwrap();
        assert_eq!(hub.peer_count(&topic), 1);

        manager.leave_swarm(&topic).await.unwrap();
        assert_eq!(hub.peer_count(&topic), 0);
    }
}
