//! Session token store
//!
//! Maps bearer tokens issued by the external identity provider to the
//! stable user identity they stand for.

use std::collections::HashMap;

use crate::config::IdentityEntry;
use crate::storage::UserIdentity;

#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    tokens: HashMap<String, UserIdentity>,
}

impl TokenStore {
    pub fn from_entries(entries: &[IdentityEntry]) -> Self {
        let tokens = entries
            .iter()
            .map(|entry| (entry.token.clone(), UserIdentity::new(entry.user.clone())))
            .collect();
        Self { tokens }
    }

    pub fn insert(&mut self, token: impl Into<String>, identity: UserIdentity) {
        self.tokens.insert(token.into(), identity);
    }

    pub fn lookup(&self, token: &str) -> Option<&UserIdentity> {
        self.tokens.get(token)
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
