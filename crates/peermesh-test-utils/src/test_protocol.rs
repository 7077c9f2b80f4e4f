//! Spy implementation of the `ProtocolSession` trait for testing.
//!
//! Records every notification, keeps the send handles of established
//! connections, and exposes waiters so tests can await swarm convergence.

use peermesh_net::{
    NetworkError, NetworkResult, PeerLink, ProtocolEvent, ProtocolProvider, ProtocolSession,
};
use peermesh_types::{PeerId, Topic};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type ConnectHandler = Arc<dyn Fn(&TestProtocolPlugin, PeerId) + Send + Sync>;
type ReceiveHandler = Arc<dyn Fn(&TestProtocolPlugin, PeerId, &[u8]) + Send + Sync>;

#[derive(Default)]
struct PluginState {
    links: HashMap<PeerId, PeerLink>,
    connects: Vec<PeerId>,
    disconnects: Vec<PeerId>,
    receives: Vec<(PeerId, Vec<u8>)>,
    errors: Vec<(PeerId, String)>,
    on_connect: Option<ConnectHandler>,
    on_receive: Option<ReceiveHandler>,
}

struct PluginInner {
    peer_id: PeerId,
    state: Mutex<PluginState>,
}

/// A spy protocol session.
///
/// Cheap to clone; all clones share the same recorded state, so a test can
/// hand one clone to the network manager and keep another for assertions.
#[derive(Clone)]
pub struct TestProtocolPlugin {
    inner: Arc<PluginInner>,
}

impl TestProtocolPlugin {
    /// Create a plugin for the given local peer id.
    pub fn new(peer_id: PeerId) -> Self {
        Self {
            inner: Arc::new(PluginInner {
                peer_id,
                state: Mutex::new(PluginState::default()),
            }),
        }
    }

    /// The local peer this plugin represents.
    pub fn peer_id(&self) -> PeerId {
        self.inner.peer_id
    }

    /// A provider handing this plugin out as the swarm's session.
    pub fn provider(&self) -> Arc<dyn ProtocolProvider> {
        let plugin = self.clone();
        Arc::new(
            move |_: &Topic, _: &PeerId| -> Arc<dyn ProtocolSession> { Arc::new(plugin.clone()) },
        )
    }

    /// Send a payload to a connected peer.
    pub fn send(&self, peer: &PeerId, payload: impl Into<Vec<u8>>) -> NetworkResult<()> {
        let link = {
            let state = self.state();
            state
                .links
                .get(peer)
                .cloned()
                .ok_or(NetworkError::PeerNotConnected(*peer))?
        };
        link.send(payload.into())
    }

    /// Run `handler` on every `Connected` notification.
    ///
    /// The handler runs on the swarm task and must not block.
    pub fn on_connect(
        &self,
        handler: impl Fn(&TestProtocolPlugin, PeerId) + Send + Sync + 'static,
    ) {
        self.state().on_connect = Some(Arc::new(handler));
    }

    /// Run `handler` on every `Received` notification.
    pub fn on_receive(
        &self,
        handler: impl Fn(&TestProtocolPlugin, PeerId, &[u8]) + Send + Sync + 'static,
    ) {
        self.state().on_receive = Some(Arc::new(handler));
    }

    // =========================================================================
    // Assertion Helpers
    // =========================================================================

    /// Peers that delivered a `Connected` notification, in order.
    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.state().connects.clone()
    }

    /// Peers that delivered a `Disconnected` notification, in order.
    pub fn disconnected_peers(&self) -> Vec<PeerId> {
        self.state().disconnects.clone()
    }

    /// All received payloads with their senders, in order.
    pub fn received(&self) -> Vec<(PeerId, Vec<u8>)> {
        self.state().receives.clone()
    }

    /// All reported connection errors, in order.
    pub fn errors(&self) -> Vec<(PeerId, String)> {
        self.state().errors.clone()
    }

    /// Number of `Connected` notifications observed so far.
    pub fn connect_count(&self) -> usize {
        self.state().connects.len()
    }

    /// Number of `Disconnected` notifications observed so far.
    pub fn disconnect_count(&self) -> usize {
        self.state().disconnects.len()
    }

    // =========================================================================
    // Waiters
    // =========================================================================

    /// Wait until at least `n` `Connected` notifications were observed.
    pub async fn wait_for_connects(&self, n: usize) {
        self.wait_until(&format!("{} connects", n), |state| state.connects.len() >= n)
            .await;
    }

    /// Wait until at least `n` `Disconnected` notifications were observed.
    pub async fn wait_for_disconnects(&self, n: usize) {
        self.wait_until(&format!("{} disconnects", n), |state| {
            state.disconnects.len() >= n
        })
        .await;
    }

    /// Wait until at least `n` payloads were received.
    pub async fn wait_for_receives(&self, n: usize) {
        self.wait_until(&format!("{} receives", n), |state| {
            state.receives.len() >= n
        })
        .await;
    }

    /// Poll until the predicate holds; panics after 10 seconds.
    async fn wait_until(&self, what: &str, predicate: impl Fn(&PluginState) -> bool) {
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        loop {
            if predicate(&self.state()) {
                return;
            }
            if std::time::Instant::now() > deadline {
                panic!("peer {} timed out waiting for {}", self.inner.peer_id, what);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, PluginState> {
        self.inner.state.lock().expect("plugin state poisoned")
    }
}

impl ProtocolSession for TestProtocolPlugin {
    fn deliver(&self, event: ProtocolEvent) {
        match event {
            ProtocolEvent::Connected { peer, link } => {
                let handler = {
                    let mut state = self.state();
                    state.links.insert(peer, link);
                    state.connects.push(peer);
                    state.on_connect.clone()
                };
                if let Some(handler) = handler {
                    handler(self, peer);
                }
            }
            ProtocolEvent::Disconnected { peer } => {
                let mut state = self.state();
                state.links.remove(&peer);
                state.disconnects.push(peer);
            }
            ProtocolEvent::Received { peer, payload } => {
                let handler = {
                    let mut state = self.state();
                    state.receives.push((peer, payload.clone()));
                    state.on_receive.clone()
                };
                if let Some(handler) = handler {
                    handler(self, peer, &payload);
                }
            }
            ProtocolEvent::Error { peer, error } => {
                self.state().errors.push((peer, error.to_string()));
            }
            _ => {}
        }
    }
}
