//! End-to-end swarm tests over the in-memory signal hub.
//!
//! Every scenario runs two or more network managers in one process, sharing
//! a [`MemorySignalManager`] so discovery is immediate and deterministic.
//! Payload delivery, connect/disconnect notification ordering, topology
//! enforcement, and topic isolation are all observed through the spy
//! protocol plugin.

use peermesh_net::{
    JoinSwarmOptions, MemorySignalManager, NetworkError, NetworkManager, Topology,
};
use peermesh_test_utils::{
    create_peer, create_peer_with_id, create_peer_with_plugin, init_test_logging,
    TestProtocolPlugin,
};
use peermesh_types::{PeerId, Topic};
use std::collections::HashSet;
use std::sync::Arc;

#[tokio::test]
async fn test_two_peers_connect_and_exchange_payload() {
    init_test_logging();
    let hub = MemorySignalManager::new();
    let topic = Topic::random();

    let peer1 = create_peer(&hub, topic, Topology::FullMesh).await;
    let peer2 = create_peer(&hub, topic, Topology::FullMesh).await;

    peer1.plugin.wait_for_connects(1).await;
    peer2.plugin.wait_for_connects(1).await;
    assert_eq!(peer1.plugin.connected_peers(), vec![peer2.peer_id]);
    assert_eq!(peer2.plugin.connected_peers(), vec![peer1.peer_id]);

    peer2.plugin.send(&peer1.peer_id, "Foo").unwrap();
    peer1.plugin.wait_for_receives(1).await;

    // Delivered exactly once, with the sender resolvable to peer2.
    assert_eq!(
        peer1.plugin.received(),
        vec![(peer2.peer_id, b"Foo".to_vec())]
    );

    peer1.manager.destroy().await.unwrap();
    peer2.manager.destroy().await.unwrap();
}

#[tokio::test]
async fn test_join_and_leave_swarm() {
    init_test_logging();
    let hub = MemorySignalManager::new();
    let topic = Topic::random();

    let peer1 = create_peer(&hub, topic, Topology::FullMesh).await;
    let peer2 = create_peer(&hub, topic, Topology::FullMesh).await;

    peer1.plugin.wait_for_connects(1).await;
    peer2.plugin.wait_for_connects(1).await;

    peer1.manager.leave_swarm(&topic).await.unwrap();

    // The local disconnect is delivered before `leave` resolves.
    assert_eq!(peer1.plugin.disconnected_peers(), vec![peer2.peer_id]);

    // The remote side observes it eventually.
    peer2.plugin.wait_for_disconnects(1).await;
    assert_eq!(peer2.plugin.disconnected_peers(), vec![peer1.peer_id]);

    peer1.manager.destroy().await.unwrap();
    peer2.manager.destroy().await.unwrap();
}

#[tokio::test]
async fn test_rejoin_after_leave_reconnects() {
    init_test_logging();
    let hub = MemorySignalManager::new();
    let topic = Topic::random();

    let peer1 = create_peer(&hub, topic, Topology::FullMesh).await;
    let peer2 = create_peer(&hub, topic, Topology::FullMesh).await;

    peer1.plugin.wait_for_connects(1).await;
    peer2.plugin.wait_for_connects(1).await;

    peer2.manager.leave_swarm(&topic).await.unwrap();
    peer1.plugin.wait_for_disconnects(1).await;

    // The same identity re-announces; a fresh connection replaces nothing
    // and duplicates nothing.
    peer2
        .manager
        .join_swarm(JoinSwarmOptions::new(
            topic,
            peer2.peer_id,
            peer2.plugin.provider(),
        ))
        .await
        .unwrap();

    peer1.plugin.wait_for_connects(2).await;
    peer2.plugin.wait_for_connects(2).await;
    assert_eq!(peer1.plugin.connect_count(), 2);
    assert_eq!(peer1.plugin.disconnect_count(), 1);

    peer1.manager.destroy().await.unwrap();
    peer2.manager.destroy().await.unwrap();
}

#[tokio::test]
async fn test_star_topology_keeps_leaves_apart() {
    init_test_logging();
    let hub = MemorySignalManager::new();
    let topic = Topic::random();

    let hub_id = PeerId::random();
    let star = Topology::Star { hub: hub_id };

    let hub_peer = create_peer_with_id(&hub, topic, hub_id, star).await;
    let leaf_a = create_peer(&hub, topic, star).await;
    let leaf_b = create_peer(&hub, topic, star).await;

    hub_peer.plugin.wait_for_connects(2).await;
    leaf_a.plugin.wait_for_connects(1).await;
    leaf_b.plugin.wait_for_connects(1).await;

    // Leaves connect to the hub and never to each other.
    assert_eq!(leaf_a.plugin.connected_peers(), vec![hub_id]);
    assert_eq!(leaf_b.plugin.connected_peers(), vec![hub_id]);

    let info = leaf_a.manager.swarm_info(&topic).await.unwrap();
    assert_eq!(info.connected_peers(), vec![hub_id]);
    assert!(!info.is_connected_to(&leaf_b.peer_id));

    assert!(matches!(
        leaf_a.plugin.send(&leaf_b.peer_id, "direct"),
        Err(NetworkError::PeerNotConnected(_))
    ));

    // Payloads still flow over the hub links.
    leaf_a.plugin.send(&hub_id, "to hub").unwrap();
    hub_peer.plugin.wait_for_receives(1).await;
    assert_eq!(
        hub_peer.plugin.received(),
        vec![(leaf_a.peer_id, b"to hub".to_vec())]
    );

    hub_peer.manager.destroy().await.unwrap();
    leaf_a.manager.destroy().await.unwrap();
    leaf_b.manager.destroy().await.unwrap();
}

#[tokio::test]
async fn test_two_swarms_at_the_same_time() {
    init_test_logging();
    let hub = MemorySignalManager::new();
    let topic_a = Topic::random();
    let topic_b = Topic::random();

    let peer_a1 = create_peer(&hub, topic_a, Topology::FullMesh).await;
    let peer_a2 = create_peer(&hub, topic_a, Topology::FullMesh).await;
    let peer_b1 = create_peer(&hub, topic_b, Topology::FullMesh).await;
    let peer_b2 = create_peer(&hub, topic_b, Topology::FullMesh).await;

    peer_a1.plugin.wait_for_connects(1).await;
    peer_a2.plugin.wait_for_connects(1).await;
    peer_b1.plugin.wait_for_connects(1).await;
    peer_b2.plugin.wait_for_connects(1).await;

    // No cross-topic connection events.
    assert_eq!(peer_a1.plugin.connected_peers(), vec![peer_a2.peer_id]);
    assert_eq!(peer_b1.plugin.connected_peers(), vec![peer_b2.peer_id]);

    peer_a2.plugin.send(&peer_a1.peer_id, "Foo A").unwrap();
    peer_b2.plugin.send(&peer_b1.peer_id, "Foo B").unwrap();

    peer_a1.plugin.wait_for_receives(1).await;
    peer_b1.plugin.wait_for_receives(1).await;
    assert_eq!(
        peer_a1.plugin.received(),
        vec![(peer_a2.peer_id, b"Foo A".to_vec())]
    );
    assert_eq!(
        peer_b1.plugin.received(),
        vec![(peer_b2.peer_id, b"Foo B".to_vec())]
    );

    for peer in [peer_a1, peer_a2, peer_b1, peer_b2] {
        peer.manager.destroy().await.unwrap();
    }
}

#[tokio::test]
async fn test_many_topics_ping_pong() {
    init_test_logging();
    let hub = MemorySignalManager::new();
    const NUM_TOPICS: usize = 5;
    const PEERS_PER_TOPIC: usize = 5;

    let mut swarms = Vec::new();
    for _ in 0..NUM_TOPICS {
        let topic = Topic::random();
        let mut peers = Vec::new();
        for _ in 0..PEERS_PER_TOPIC {
            let plugin = TestProtocolPlugin::new(PeerId::random());
            plugin.on_connect(|plugin, peer| {
                let _ = plugin.send(&peer, "ping");
            });
            plugin.on_receive(|plugin, peer, payload| {
                if payload == b"ping" {
                    let _ = plugin.send(&peer, "pong");
                }
            });
            peers.push(create_peer_with_plugin(&hub, topic, Topology::FullMesh, plugin).await);
        }
        swarms.push(peers);
    }

    for peers in &swarms {
        let members: HashSet<PeerId> = peers.iter().map(|peer| peer.peer_id).collect();
        for peer in peers {
            peer.plugin.wait_for_connects(PEERS_PER_TOPIC - 1).await;
            // One ping and one pong per mesh neighbor.
            peer.plugin
                .wait_for_receives(2 * (PEERS_PER_TOPIC - 1))
                .await;

            let received = peer.plugin.received();
            let pongs = received.iter().filter(|(_, p)| p == b"pong").count();
            assert_eq!(pongs, PEERS_PER_TOPIC - 1);

            // Every observed event references a member of this topic only.
            for (sender, _) in &received {
                assert!(members.contains(sender));
            }
            for sender in peer.plugin.connected_peers() {
                assert!(members.contains(&sender));
            }
        }
    }

    for peers in &swarms {
        for peer in peers {
            peer.manager.destroy().await.unwrap();
        }
    }
}

#[tokio::test]
async fn test_destroy_twice_without_duplicate_disconnects() {
    init_test_logging();
    let hub = MemorySignalManager::new();
    let topic = Topic::random();

    let peer1 = create_peer(&hub, topic, Topology::FullMesh).await;
    let peer2 = create_peer(&hub, topic, Topology::FullMesh).await;

    peer1.plugin.wait_for_connects(1).await;
    peer2.plugin.wait_for_connects(1).await;

    peer1.manager.destroy().await.unwrap();
    peer1.manager.destroy().await.unwrap();
    assert_eq!(peer1.plugin.disconnect_count(), 1);

    peer2.plugin.wait_for_disconnects(1).await;
    peer2.manager.destroy().await.unwrap();
    peer2.manager.destroy().await.unwrap();
    assert_eq!(peer2.plugin.disconnect_count(), 1);
}

#[tokio::test]
async fn test_topology_swap_reconciles_live_swarm() {
    init_test_logging();
    let hub = MemorySignalManager::new();
    let topic = Topic::random();

    let peer1 = create_peer(&hub, topic, Topology::FullMesh).await;
    let peer2 = create_peer(&hub, topic, Topology::FullMesh).await;
    let peer3 = create_peer(&hub, topic, Topology::FullMesh).await;

    peer1.plugin.wait_for_connects(2).await;
    peer2.plugin.wait_for_connects(2).await;
    peer3.plugin.wait_for_connects(2).await;

    // Collapse the mesh into a star around peer1: the peer2-peer3 edge is
    // torn down, the hub edges survive.
    let star = Topology::Star { hub: peer1.peer_id };
    peer1.manager.set_topology(&topic, star).await.unwrap();
    peer2.manager.set_topology(&topic, star).await.unwrap();
    peer3.manager.set_topology(&topic, star).await.unwrap();

    peer2.plugin.wait_for_disconnects(1).await;
    peer3.plugin.wait_for_disconnects(1).await;
    assert_eq!(peer2.plugin.disconnected_peers(), vec![peer3.peer_id]);
    assert_eq!(peer3.plugin.disconnected_peers(), vec![peer2.peer_id]);
    assert_eq!(peer1.plugin.disconnect_count(), 0);

    let info = peer2.manager.swarm_info(&topic).await.unwrap();
    assert_eq!(info.connected_peers(), vec![peer1.peer_id]);
    let info = peer1.manager.swarm_info(&topic).await.unwrap();
    assert_eq!(info.connected_peers().len(), 2);

    for peer in [peer1, peer2, peer3] {
        peer.manager.destroy().await.unwrap();
    }
}

#[tokio::test]
async fn test_duplicate_join_on_one_manager_is_rejected() {
    init_test_logging();
    let hub = MemorySignalManager::new();
    let topic = Topic::random();

    let manager = NetworkManager::new(Arc::new(hub.clone()));
    let plugin = TestProtocolPlugin::new(PeerId::random());
    manager
        .join_swarm(JoinSwarmOptions::new(
            topic,
            plugin.peer_id(),
            plugin.provider(),
        ))
        .await
        .unwrap();

    let err = manager
        .join_swarm(JoinSwarmOptions::new(
            topic,
            PeerId::random(),
            plugin.provider(),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, NetworkError::TopicAlreadyJoined(t) if t == topic));

    manager.destroy().await.unwrap();
}
