//! Network error types.
//!
//! This module defines all error types for the peermesh-net crate.

use peermesh_types::{PeerId, Topic};
use thiserror::Error;

/// Network-specific errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NetworkError {
    /// Malformed topic supplied to `join`.
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    /// Malformed peer id supplied to `join`.
    #[error("invalid peer id: {0}")]
    InvalidPeerId(String),

    /// A swarm already exists for this topic.
    #[error("already joined topic {0}")]
    TopicAlreadyJoined(Topic),

    /// No swarm exists for this topic.
    #[error("unknown topic {0}")]
    UnknownTopic(Topic),

    /// The manager has been destroyed and accepts no further joins.
    #[error("network manager destroyed")]
    ManagerDestroyed,

    /// Connection establishment to a peer failed.
    #[error("connection to {peer} failed: {reason}")]
    ConnectionFailed { peer: PeerId, reason: String },

    /// No established connection to the peer.
    #[error("peer {0} is not connected")]
    PeerNotConnected(PeerId),

    /// The per-connection send handle is no longer usable.
    #[error("peer link closed")]
    LinkClosed,

    /// Signal/discovery adapter error.
    #[error("signaling error: {0}")]
    Signal(String),

    /// Failure while releasing a connection or a discovery registration.
    #[error("teardown error: {0}")]
    Teardown(String),

    /// Internal channel closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,
}

impl NetworkError {
    /// Returns true if this error is a configuration error that fails
    /// synchronously at the `join` call.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::InvalidTopic(_)
                | Self::InvalidPeerId(_)
                | Self::TopicAlreadyJoined(_)
                | Self::ManagerDestroyed
        )
    }

    /// Returns true if this error is local to a single peer connection and
    /// leaves sibling connections in the same swarm unaffected.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::PeerNotConnected(_) | Self::LinkClosed
        )
    }
}

/// Result type alias using NetworkError.
pub type NetworkResult<T> = Result<T, NetworkError>;
