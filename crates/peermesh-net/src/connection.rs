//! Peer connection state machine.
//!
//! One [`Connection`] is one bidirectional link to a remote peer within a
//! single swarm. All transitions are driven by the owning swarm task, so no
//! internal locking is needed; the only concurrent piece is the receive
//! pump spawned on establishment.
//!
//! Notification invariant: per connection instance, `Connected` and
//! `Disconnected` are delivered at most once each, `Connected` strictly
//! first. A connection cancelled while `Connecting` reaches `Closed`
//! without delivering either; a failed attempt delivers `Error` only.

use crate::error::NetworkError;
use crate::event::ProtocolEvent;
use crate::protocol::{PeerLink, ProtocolSession};
use crate::signal::TransportChannel;
use peermesh_types::PeerId;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, Instrument};

/// Lifecycle states of a peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, not yet negotiating.
    Idle,
    /// Transport negotiation in progress (dialing or awaiting the dial).
    Connecting,
    /// Established and usable.
    Connected,
    /// Release in progress.
    Disconnecting,
    /// Terminal: fully released.
    Closed,
    /// Terminal: negotiation failed.
    Failed,
}

pub(crate) struct Connection {
    peer: PeerId,
    state: ConnectionState,
    generation: u64,
    session: Arc<dyn ProtocolSession>,
    link: Option<PeerLink>,
    pump: Option<JoinHandle<()>>,
}

impl Connection {
    pub(crate) fn new(peer: PeerId, generation: u64, session: Arc<dyn ProtocolSession>) -> Self {
        Self {
            peer,
            state: ConnectionState::Idle,
            generation,
            session,
            link: None,
            pump: None,
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    /// Generation tag distinguishing this instance from earlier connections
    /// to the same peer, so late dial results and pump shutdown events
    /// cannot affect a replacement connection.
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// `Idle → Connecting`.
    pub(crate) fn begin_connecting(&mut self) {
        debug_assert_eq!(self.state, ConnectionState::Idle);
        self.state = ConnectionState::Connecting;
        trace!(peer = %self.peer, "connecting");
    }

    /// `Connecting → Connected`.
    ///
    /// Delivers `Connected` (with the send handle), then spawns the receive
    /// pump. `on_closed` fires when the remote half closes the transport.
    pub(crate) fn establish<F>(&mut self, channel: TransportChannel, on_closed: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.state != ConnectionState::Connecting {
            debug!(peer = %self.peer, state = ?self.state, "dropping transport for non-connecting link");
            return;
        }

        let TransportChannel { tx, mut rx } = channel;
        let link = PeerLink::new(self.peer, tx);
        self.link = Some(link.clone());
        self.state = ConnectionState::Connected;
        trace!(peer = %self.peer, "connected");
        self.session.deliver(ProtocolEvent::Connected {
            peer: self.peer,
            link,
        });

        let session = self.session.clone();
        let peer = self.peer;
        self.pump = Some(tokio::spawn(
            async move {
                while let Some(payload) = rx.recv().await {
                    session.deliver(ProtocolEvent::Received { peer, payload });
                }
                on_closed();
            }
            .in_current_span(),
        ));
    }

    /// `Connecting → Failed`. Delivers `Error`; never `Connected` or
    /// `Disconnected`.
    pub(crate) fn fail(&mut self, error: NetworkError) {
        if self.state != ConnectionState::Connecting {
            debug!(peer = %self.peer, state = ?self.state, "ignoring failure for non-connecting link");
            return;
        }
        self.state = ConnectionState::Failed;
        debug!(peer = %self.peer, %error, "connection attempt failed");
        self.session.deliver(ProtocolEvent::Error {
            peer: self.peer,
            error,
        });
    }

    /// Drive the connection to `Closed` from any state.
    ///
    /// An established connection passes through `Disconnecting`, releases
    /// the transport, and delivers its single `Disconnected`; every other
    /// state is released silently.
    pub(crate) fn close(&mut self) {
        match self.state {
            ConnectionState::Connected => {
                self.state = ConnectionState::Disconnecting;
                self.release();
                self.state = ConnectionState::Closed;
                trace!(peer = %self.peer, "closed");
                self.session
                    .deliver(ProtocolEvent::Disconnected { peer: self.peer });
            }
            ConnectionState::Closed => {}
            _ => {
                self.release();
                self.state = ConnectionState::Closed;
                trace!(peer = %self.peer, "closed without establishment");
            }
        }
    }

    fn release(&mut self) {
        if let Some(link) = self.link.take() {
            link.revoke();
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("state", &self.state)
            .field("generation", &self.generation)
            .finish()
    }
}
