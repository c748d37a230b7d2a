use std::collections::HashMap;

use super::backoff::ReconnectPolicy;
use super::manager::{ConnectionKind, ReconnectionManager, ReconnectionStatus};

/// One independent `webrtc-peer` reconnection manager per remote peer id.
pub struct PeerReconnections {
    policy: ReconnectPolicy,
    managers: HashMap<String, ReconnectionManager>,
}

impl PeerReconnections {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            managers: HashMap::new(),
        }
    }

    pub fn manager(&mut self, peer_id: &str) -> &mut ReconnectionManager {
        let policy = &self.policy;
        self.managers
            .entry(peer_id.to_string())
            .or_insert_with(|| ReconnectionManager::new(ConnectionKind::WebrtcPeer, policy.clone()))
    }

    /// Take a peer's manager out to drive it from its own task.
    pub fn take(&mut self, peer_id: &str) -> ReconnectionManager {
        self.managers
            .remove(peer_id)
            .unwrap_or_else(|| ReconnectionManager::new(ConnectionKind::WebrtcPeer, self.policy.clone()))
    }

    pub fn put_back(&mut self, peer_id: &str, manager: ReconnectionManager) {
        self.managers.insert(peer_id.to_string(), manager);
    }

    pub fn remove(&mut self, peer_id: &str) -> bool {
        self.managers.remove(peer_id).is_some()
    }

    pub fn status(&self, peer_id: &str) -> Option<&ReconnectionStatus> {
        self.managers.get(peer_id).map(ReconnectionManager::status)
    }

    pub fn statuses(&self) -> impl Iterator<Item = (&str, &ReconnectionStatus)> {
        self.managers
            .iter()
            .map(|(id, m)| (id.as_str(), m.status()))
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    pub fn clear(&mut self) {
        self.managers.clear();
    }
}
