//! Swarm networking for peermesh.
//!
//! This crate maintains, for each communication topic, a live set of
//! peer-to-peer connections whose membership is continuously reconciled
//! against a pluggable topology strategy. It includes:
//!
//! - **Network Manager**: registry of swarms keyed by topic, with
//!   `join`/`leave`/`destroy` as the public entry points
//! - **Reconciliation**: per-topic convergence of actual connections to the
//!   topology's desired set as peers appear and disappear
//! - **Topologies**: full mesh and star (hub-and-spoke)
//! - **Signal adapters**: an abstract discovery/transport-negotiation
//!   capability, with an in-memory hub for deterministic in-process tests
//!
//! # Overview
//!
//! The application attaches a protocol session to each swarm it joins. The
//! session is notified when connections come and go and receives payloads;
//! it sends through the [`PeerLink`] handle carried by the `Connected`
//! notification. The core never interprets payloads.
//!
//! # Example
//!
//! ```no_run
//! use peermesh_net::{
//!     JoinSwarmOptions, MemorySignalManager, NetworkManager, ProtocolEvent, ProtocolSession,
//!     Topology,
//! };
//! use peermesh_types::{PeerId, Topic};
//! use std::sync::Arc;
//!
//! struct EchoSession;
//!
//! impl ProtocolSession for EchoSession {
//!     fn deliver(&self, event: ProtocolEvent) {
//!         if let ProtocolEvent::Connected { peer, link } = event {
//!             println!("connected to {peer}");
//!             let _ = link.send(b"hello".to_vec());
//!         }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Managers sharing one hub discover each other immediately.
//!     let hub = MemorySignalManager::new();
//!     let manager = NetworkManager::new(Arc::new(hub.clone()));
//!
//!     let topic = Topic::random();
//!     let peer_id = PeerId::random();
//!     let provider = Arc::new(|_: &Topic, _: &PeerId| {
//!         Arc::new(EchoSession) as Arc<dyn ProtocolSession>
//!     });
//!
//!     manager
//!         .join_swarm(JoinSwarmOptions::new(topic, peer_id, provider).with_topology(Topology::FullMesh))
//!         .await?;
//!
//!     // ... the session observes connections as peers join the topic ...
//!
//!     manager.destroy().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Topologies
//!
//! A topology is a pure function from the known peer set to the desired
//! connection set, re-evaluated on every discovery event. Swapping the
//! topology at runtime is a plain reassignment followed by a reconciliation
//! pass:
//!
//! ```no_run
//! use peermesh_net::{NetworkManager, Topology};
//! use peermesh_types::{PeerId, Topic};
//!
//! async fn example(manager: &NetworkManager, topic: Topic, hub: PeerId) {
//!     manager.set_topology(&topic, Topology::Star { hub }).await.unwrap();
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod manager;
pub mod protocol;
pub mod signal;
pub mod swarm;
pub mod topology;

// Re-export main types at crate root

// Configuration
pub use config::SignalOptions;

// Error types
pub use error::{NetworkError, NetworkResult};

// Event types
pub use event::ProtocolEvent;

// Manager
pub use manager::{JoinSwarmOptions, NetworkManager};

// Protocol capability
pub use protocol::{PeerLink, ProtocolProvider, ProtocolSession};

// Signal adapters
pub use signal::{
    transport_pair, MemorySignalManager, SignalEvent, SignalManager, SwarmRegistration,
    TransportChannel,
};

// Swarm state
pub use connection::ConnectionState;
pub use swarm::SwarmInfo;

// Topologies
pub use topology::Topology;

// Re-export identifier types commonly needed
pub use peermesh_types::{PeerId, Topic};
