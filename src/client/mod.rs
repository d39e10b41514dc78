//! Client management system
//!
//! Handles client connections, session state, and the registry of active
//! sessions.

pub mod handler;
pub mod registry;
pub mod state;

pub use handler::handle_client;
pub use registry::{ClientEntry, ClientRegistry};
pub use state::Session;
