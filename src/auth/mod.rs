//! Authentication boundary
//!
//! Resolves session tokens to user identities. Issuing tokens is the job of
//! the external identity provider.

pub mod credentials;
pub mod validator;

pub use credentials::TokenStore;
pub use validator::validate_token;
