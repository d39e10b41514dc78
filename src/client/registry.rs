//! Client registry
//!
//! Tracks authenticated sessions so the server can enforce its client limit.

use std::collections::HashMap;
use std::net::SocketAddr;

use crate::storage::UserIdentity;

#[derive(Debug, Clone)]
pub struct ClientEntry {
    pub peer: SocketAddr,
    pub identity: UserIdentity,
}

/// Registry for tracking active clients
#[derive(Debug, Default)]
pub struct ClientRegistry {
    next_id: u64,
    clients: HashMap<u64, ClientEntry>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session unless `max_clients` sessions are already active.
    /// Returns the id to release the slot with.
    pub fn try_register(
        &mut self,
        peer: SocketAddr,
        identity: UserIdentity,
        max_clients: usize,
    ) -> Option<u64> {
        if self.clients.len() >= max_clients {
            return None;
        }

        self.next_id += 1;
        let id = self.next_id;
        self.clients.insert(id, ClientEntry { peer, identity });
        Some(id)
    }

    pub fn remove(&mut self, id: u64) -> Option<ClientEntry> {
        self.clients.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Number of active sessions acting as `identity`.
    pub fn sessions_for(&self, identity: &UserIdentity) -> usize {
        self.clients
            .values()
            .filter(|entry| &entry.identity == identity)
            .count()
    }
}
