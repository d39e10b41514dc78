//! Module `state`
//!
//! Defines the `Session` struct tracking one connected client: its peer
//! address and, once authenticated, the identity it acts as.

use std::net::SocketAddr;

use crate::storage::UserIdentity;

/// Represents the state of a connected client.
#[derive(Debug)]
pub struct Session {
    peer: SocketAddr,
    identity: Option<UserIdentity>,
    session_id: Option<u64>,
}

impl Session {
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            identity: None,
            session_id: None,
        }
    }

    /// Marks the session authenticated as `identity` under the registry slot
    /// `session_id`.
    pub fn authenticate(&mut self, identity: UserIdentity, session_id: u64) {
        self.identity = Some(identity);
        self.session_id = Some(session_id);
    }

    /// Clears the identity and hands back the registry slot to release.
    pub fn logout(&mut self) -> Option<u64> {
        self.identity = None;
        self.session_id.take()
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn identity(&self) -> Option<&UserIdentity> {
        self.identity.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}
