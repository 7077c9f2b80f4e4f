//! Helper functions for creating test fixtures.
//!
//! A test peer is one network manager joined to one topic through a shared
//! in-memory signal hub, with a [`TestProtocolPlugin`] attached for
//! assertions.

use crate::TestProtocolPlugin;
use peermesh_net::{JoinSwarmOptions, MemorySignalManager, NetworkManager, Topology};
use peermesh_types::{PeerId, Topic};
use std::sync::Arc;

/// Install a test subscriber that honors `RUST_LOG`.
///
/// Safe to call from every test; only the first call takes effect.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One in-process peer: its own network manager, joined to a single topic.
pub struct TestPeer {
    /// The manager hosting this peer's swarm.
    pub manager: NetworkManager,
    /// The spy session attached to the swarm.
    pub plugin: TestProtocolPlugin,
    /// The peer's identity within the topic.
    pub peer_id: PeerId,
}

/// Join a fresh peer with a random id to `topic` through `hub`.
pub async fn create_peer(hub: &MemorySignalManager, topic: Topic, topology: Topology) -> TestPeer {
    create_peer_with_id(hub, topic, PeerId::random(), topology).await
}

/// Join a fresh peer with a fixed id to `topic` through `hub`.
pub async fn create_peer_with_id(
    hub: &MemorySignalManager,
    topic: Topic,
    peer_id: PeerId,
    topology: Topology,
) -> TestPeer {
    create_peer_with_plugin(hub, topic, topology, TestProtocolPlugin::new(peer_id)).await
}

/// Join a peer whose plugin was configured up front (handlers installed
/// before any connection can be established).
pub async fn create_peer_with_plugin(
    hub: &MemorySignalManager,
    topic: Topic,
    topology: Topology,
    plugin: TestProtocolPlugin,
) -> TestPeer {
    let peer_id = plugin.peer_id();
    let manager = NetworkManager::new(Arc::new(hub.clone()));
    manager
        .join_swarm(JoinSwarmOptions::new(topic, peer_id, plugin.provider()).with_topology(topology))
        .await
        .expect("test peer failed to join");
    TestPeer {
        manager,
        plugin,
        peer_id,
    }
}
