//! Identifier types for peermesh swarms.
//!
//! A swarm is named by a [`Topic`] and its members are distinguished by
//! [`PeerId`]s. Both are opaque 32-byte values (public-key-shaped); the
//! networking layer never interprets their contents beyond equality and
//! ordering. The all-zero value is reserved and treated as malformed by
//! consumers.
//!
//! Human-readable format: a short type prefix followed by the base58
//! encoding of the raw bytes (`pmt1...` for topics, `pmp1...` for peers).
//!
//! # Example
//!
//! ```
//! use peermesh_types::{PeerId, Topic};
//!
//! let topic = Topic::random();
//! let peer = PeerId::random();
//!
//! let parsed: PeerId = peer.to_string().parse().unwrap();
//! assert_eq!(parsed, peer);
//! assert_ne!(topic.to_string(), peer.to_string());
//! ```

mod error;

pub use error::IdParseError;

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Length in bytes of [`Topic`] and [`PeerId`] values.
pub const ID_LEN: usize = 32;

/// Human-readable prefix for topic identifiers.
const TOPIC_PREFIX: &str = "pmt1";

/// Human-readable prefix for peer identifiers.
const PEER_ID_PREFIX: &str = "pmp1";

fn random_bytes() -> [u8; ID_LEN] {
    let mut bytes = [0u8; ID_LEN];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

fn parse_b58(s: &str, prefix: &'static str) -> Result<[u8; ID_LEN], IdParseError> {
    let encoded = s
        .strip_prefix(prefix)
        .ok_or(IdParseError::MissingPrefix { expected: prefix })?;
    let decoded = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| IdParseError::InvalidBase58(e.to_string()))?;
    let bytes: [u8; ID_LEN] = decoded
        .as_slice()
        .try_into()
        .map_err(|_| IdParseError::InvalidLength {
            expected: ID_LEN,
            got: decoded.len(),
        })?;
    Ok(bytes)
}

/// Identifier naming one independent swarm namespace.
///
/// Multiple swarms may exist concurrently and never share state; the topic
/// is the registry key that keeps them apart.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Topic(pub [u8; ID_LEN]);

impl Topic {
    /// Create a topic from raw bytes.
    pub fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Generate a random topic.
    pub fn random() -> Self {
        Self(random_bytes())
    }

    /// Get the raw bytes of the topic.
    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// Whether this is the reserved all-zero value.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ID_LEN]
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", TOPIC_PREFIX, bs58::encode(&self.0).into_string())
    }
}

impl std::fmt::Debug for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Topic({}{}..)",
            TOPIC_PREFIX,
            bs58::encode(&self.0[..4]).into_string()
        )
    }
}

impl std::str::FromStr for Topic {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_b58(s, TOPIC_PREFIX).map(Self)
    }
}

impl AsRef<[u8]> for Topic {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Identifier distinguishing a peer within a topic.
///
/// One process may host distinct local peer identities in different swarms,
/// which is how two local peers are tested inside a single process.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(pub [u8; ID_LEN]);

impl PeerId {
    /// Create a peer id from raw bytes.
    pub fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Generate a random peer id.
    pub fn random() -> Self {
        Self(random_bytes())
    }

    /// Get the raw bytes of the peer id.
    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// Whether this is the reserved all-zero value.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ID_LEN]
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}",
            PEER_ID_PREFIX,
            bs58::encode(&self.0).into_string()
        )
    }
}

impl std::fmt::Debug for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "PeerId({}{}..)",
            PEER_ID_PREFIX,
            bs58::encode(&self.0[..4]).into_string()
        )
    }
}

impl std::str::FromStr for PeerId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_b58(s, PEER_ID_PREFIX).map(Self)
    }
}

impl AsRef<[u8]> for PeerId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
