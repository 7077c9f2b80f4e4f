//! Protocol notifications.
//!
//! This module defines the events delivered to a swarm's protocol session.
//! Delivery guarantees per connection: `Connected` and `Disconnected` are
//! each emitted at most once, `Connected` strictly before `Disconnected`,
//! and a connection cancelled during establishment emits neither.

use crate::error::NetworkError;
use crate::protocol::PeerLink;
use peermesh_types::PeerId;

/// Notifications delivered to a [`ProtocolSession`](crate::ProtocolSession).
#[derive(Debug)]
#[non_exhaustive]
pub enum ProtocolEvent {
    /// A connection to a peer is established and usable.
    Connected {
        /// The remote peer.
        peer: PeerId,
        /// Send handle for this connection.
        link: PeerLink,
    },

    /// An established connection was fully released.
    Disconnected {
        /// The remote peer.
        peer: PeerId,
    },

    /// A payload arrived from a peer.
    Received {
        /// The sending peer.
        peer: PeerId,
        /// Opaque payload bytes.
        payload: Vec<u8>,
    },

    /// Connection establishment to a peer failed.
    ///
    /// Emitted instead of `Connected`/`Disconnected`; the peer is retried
    /// only if the discovery adapter re-announces it.
    Error {
        /// The peer the attempt was for.
        peer: PeerId,
        /// What went wrong.
        error: NetworkError,
    },
}

impl ProtocolEvent {
    /// The peer this event is about.
    pub fn peer(&self) -> PeerId {
        match self {
            ProtocolEvent::Connected { peer, .. }
            | ProtocolEvent::Disconnected { peer }
            | ProtocolEvent::Received { peer, .. }
            | ProtocolEvent::Error { peer, .. } => *peer,
        }
    }
}
