//! Shared test utilities for peermesh.
//!
//! Provides the spy protocol plugin used by swarm tests and helpers for
//! spinning up in-process peers on a shared in-memory signal hub.

mod helpers;
mod test_protocol;

pub use helpers::{
    create_peer, create_peer_with_id, create_peer_with_plugin, init_test_logging, TestPeer,
};
pub use test_protocol::TestProtocolPlugin;
