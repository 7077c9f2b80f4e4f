//! Protocol plugin capability interface.
//!
//! The network manager does not interpret application payloads. Each `join`
//! supplies a [`ProtocolProvider`], a factory that builds the
//! [`ProtocolSession`] attached to that swarm. The session receives the
//! notifications described in [`ProtocolEvent`](crate::event::ProtocolEvent)
//! and sends payloads through the [`PeerLink`] handle carried by the
//! `Connected` notification.

use crate::error::{NetworkError, NetworkResult};
use crate::event::ProtocolEvent;
use peermesh_types::{PeerId, Topic};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Application-layer handler attached to one swarm.
///
/// Implementations must be non-blocking: events are delivered from the
/// swarm task, and a blocked `deliver` stalls reconciliation for that topic.
pub trait ProtocolSession: Send + Sync {
    /// Handle one notification from the swarm.
    fn deliver(&self, event: ProtocolEvent);
}

/// Factory for protocol sessions, supplied by the caller of `join`.
///
/// Called once per successful `join` with the topic and the local peer id
/// the session will serve.
pub trait ProtocolProvider: Send + Sync {
    /// Build the session for a swarm.
    fn create_session(&self, topic: &Topic, local_peer: &PeerId) -> Arc<dyn ProtocolSession>;
}

impl<F> ProtocolProvider for F
where
    F: Fn(&Topic, &PeerId) -> Arc<dyn ProtocolSession> + Send + Sync,
{
    fn create_session(&self, topic: &Topic, local_peer: &PeerId) -> Arc<dyn ProtocolSession> {
        self(topic, local_peer)
    }
}

/// Send handle for one established peer connection.
///
/// Carried by the `Connected` notification. Cloneable; all clones are
/// invalidated together when the connection closes, after which `send`
/// returns [`NetworkError::LinkClosed`].
#[derive(Clone)]
pub struct PeerLink {
    peer: PeerId,
    gate: Arc<Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>>,
}

impl PeerLink {
    /// Wrap a raw transport sender.
    ///
    /// Links are normally created by the swarm when a connection is
    /// established; constructing one directly is useful for exercising a
    /// session implementation without a swarm.
    pub fn new(peer: PeerId, tx: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self {
            peer,
            gate: Arc::new(Mutex::new(Some(tx))),
        }
    }

    /// The remote peer this link sends to.
    pub fn peer(&self) -> PeerId {
        self.peer
    }

    /// Send an opaque payload to the remote peer.
    pub fn send(&self, payload: impl Into<Vec<u8>>) -> NetworkResult<()> {
        let guard = self.gate.lock().expect("link gate poisoned");
        let tx = guard.as_ref().ok_or(NetworkError::LinkClosed)?;
        tx.send(payload.into())
            .map_err(|_| NetworkError::LinkClosed)
    }

    /// Whether the link has been invalidated by connection teardown.
    pub fn is_closed(&self) -> bool {
        self.gate.lock().expect("link gate poisoned").is_none()
    }

    /// Invalidate every clone of this link. Dropping the inner sender is
    /// what lets the remote receive loop observe the close.
    pub(crate) fn revoke(&self) {
        self.gate.lock().expect("link gate poisoned").take();
    }
}

impl std::fmt::Debug for PeerLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerLink")
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}
