//! Signal adapter configuration.
//!
//! This module defines the opaque configuration handed through to the
//! signal/discovery adapter. The core never interprets it; a real backend
//! reads the server list and ICE credentials, the in-memory adapter ignores
//! it entirely.

use serde::{Deserialize, Serialize};

/// Opaque transport/signaling configuration passed through unmodified from
/// `join` to the signal adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalOptions {
    /// Signal server endpoints (e.g. websocket URLs).
    ///
    /// Default: empty.
    pub servers: Vec<String>,

    /// ICE/relay server configuration, forwarded as-is.
    ///
    /// Default: `None`.
    pub ice: Option<serde_json::Value>,
}

impl SignalOptions {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a signal server endpoint.
    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.servers.push(server.into());
        self
    }

    /// Set the ICE configuration.
    pub fn with_ice(mut self, ice: serde_json::Value) -> Self {
        self.ice = Some(ice);
        self
    }
}
