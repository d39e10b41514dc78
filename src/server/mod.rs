//! Server core functionality
//!
//! The listener, its accept loop, and the state shared by every session.

pub mod context;
pub mod core;

pub use context::ServerContext;
pub use core::Server;
