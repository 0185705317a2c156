use std::collections::HashMap;

use crate::http::connection::ConnectionId;
use crate::proxy::upstream::Proxy;

/// In-flight proxies keyed by the server connection they answer.
#[derive(Debug, Default)]
pub struct ProxyManager {
    proxies: HashMap<ConnectionId, Proxy>,
}

impl ProxyManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `proxy`. Returns `false` when its connection already has one
    /// in flight; the existing entry is kept.
    pub fn add(&mut self, proxy: Proxy) -> bool {
        let id = proxy.conn_id();
        if self.proxies.contains_key(&id) {
            tracing::warn!(conn = id, "Proxy already in flight");
            return false;
        }
        self.proxies.insert(id, proxy);
        tracing::debug!(conn = id, in_flight = self.proxies.len(), "Proxy added");
        true
    }

    pub fn find(&self, conn_id: ConnectionId) -> Option<&Proxy> {
        self.proxies.get(&conn_id)
    }

    pub fn remove(&mut self, conn_id: ConnectionId) -> Option<Proxy> {
        self.proxies.remove(&conn_id)
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}
