//! Authentication validator
//!
//! Checks a presented session token and yields the identity it was issued
//! for.

use super::credentials::TokenStore;
use crate::error::AuthError;
use crate::storage::UserIdentity;

const MAX_TOKEN_LENGTH: usize = 4096;

/// Performs basic input sanitation to reject malicious or malformed tokens.
fn is_valid_input(input: &str, max_length: usize) -> bool {
    !input.trim().is_empty()
        && input.len() <= max_length
        && !input.chars().any(char::is_control)
}

/// Validates a token and returns the identity it belongs to.
pub fn validate_token(store: &TokenStore, token: &str) -> Result<UserIdentity, AuthError> {
    if !is_valid_input(token, MAX_TOKEN_LENGTH) {
        return Err(AuthError::MalformedToken);
    }

    store.lookup(token).cloned().ok_or(AuthError::InvalidToken)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> TokenStore {
        let mut store = TokenStore::default();
        store.insert("secret-alice", UserIdentity::new("alice"));
        store
    }

    #[test]
    fn test_valid_token() {
        let identity = validate_token(&store(), "secret-alice").unwrap();
        assert_eq!(identity.as_str(), "alice");
    }

    #[test]
    fn test_unknown_token() {
        assert!(matches!(
            validate_token(&store(), "secret-mallory"),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_tokens_are_case_sensitive() {
        assert!(validate_token(&store(), "SECRET-ALICE").is_err());
    }

    #[test]
    fn test_malformed_tokens() {
        let oversized = "x".repeat(MAX_TOKEN_LENGTH + 1);
        for token in ["", "   ", "secret\r\nalice", oversized.as_str()] {
            assert!(matches!(
                validate_token(&store(), token),
                Err(AuthError::MalformedToken)
            ));
        }
    }
}
