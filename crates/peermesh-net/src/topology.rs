//! Topology strategies.
//!
//! A topology is a pure decision function: given the peers currently known
//! to a swarm and the local peer id, it returns the set of peers the swarm
//! should hold connections to. The reconciliation engine re-evaluates it on
//! every discovery event, so evaluation must be side-effect free and stable
//! for identical inputs.

use peermesh_types::PeerId;
use std::collections::HashSet;

/// Connection topology for one swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// Connect to every known peer.
    ///
    /// Connection count grows quadratically with swarm size; intended for
    /// small swarms (test/demo scale).
    FullMesh,

    /// A designated hub connects to all peers; everyone else connects only
    /// to the hub.
    Star {
        /// The hub peer.
        hub: PeerId,
    },
}

impl Default for Topology {
    fn default() -> Self {
        Topology::FullMesh
    }
}

impl Topology {
    /// Compute the desired connection set for the given membership.
    ///
    /// The local peer is never part of the result.
    pub fn evaluate(&self, known_peers: &HashSet<PeerId>, local_peer: &PeerId) -> HashSet<PeerId> {
        match self {
            Topology::FullMesh => known_peers
                .iter()
                .filter(|peer| *peer != local_peer)
                .copied()
                .collect(),
            Topology::Star { hub } => {
                if local_peer == hub {
                    known_peers
                        .iter()
                        .filter(|peer| *peer != local_peer)
                        .copied()
                        .collect()
                } else {
                    known_peers.iter().filter(|peer| *peer == hub).copied().collect()
                }
            }
        }
    }
}

impl std::fmt::Display for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Topology::FullMesh => write!(f, "full-mesh"),
            Topology::Star { hub } => write!(f, "star({})", hub),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peers(ids: &[&PeerId]) -> HashSet<PeerId> {
        ids.iter().map(|p| **p).collect()
    }

    #[test]
    fn test_full_mesh_excludes_local() {
        let local = PeerId::random();
        let a = PeerId::random();
        let b = PeerId::random();
        let known = peers(&[&local, &a, &b]);

        let desired = Topology::FullMesh.evaluate(&known, &local);
        assert_eq!(desired, peers(&[&a, &b]));
    }

    #[test]
    fn test_full_mesh_empty_when_alone() {
        let local = PeerId::random();
        let known = peers(&[&local]);
        assert!(Topology::FullMesh.evaluate(&known, &local).is_empty());
    }

    #[test]
    fn test_star_hub_connects_to_all() {
        let hub = PeerId::random();
        let a = PeerId::random();
        let b = PeerId::random();
        let known = peers(&[&hub, &a, &b]);

        let desired = Topology::Star { hub }.evaluate(&known, &hub);
        assert_eq!(desired, peers(&[&a, &b]));
    }

    #[test]
    fn test_star_leaf_connects_to_hub_only() {
        let hub = PeerId::random();
        let a = PeerId::random();
        let b = PeerId::random();
        let known = peers(&[&hub, &a, &b]);

        let desired = Topology::Star { hub }.evaluate(&known, &a);
        assert_eq!(desired, peers(&[&hub]));
    }

    #[test]
    fn test_star_leaf_without_hub_known() {
        let hub = PeerId::random();
        let a = PeerId::random();
        let b = PeerId::random();
        let known = peers(&[&a, &b]);

        let desired = Topology::Star { hub }.evaluate(&known, &a);
        assert!(desired.is_empty());
    }

    #[test]
    fn test_evaluate_is_referentially_transparent() {
        let local = PeerId::random();
        let a = PeerId::random();
        let known = peers(&[&local, &a]);

        let topology = Topology::FullMesh;
        let first = topology.evaluate(&known, &local);
        let second = topology.evaluate(&known, &local);
        assert_eq!(first, second);
        // Inputs are untouched.
        assert_eq!(known, peers(&[&local, &a]));
    }

    #[test]
    fn test_default_is_full_mesh() {
        assert_eq!(Topology::default(), Topology::FullMesh);
    }
}
