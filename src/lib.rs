//! Filevault server
//!
//! Per-user file storage served over a line-delimited JSON protocol. Each
//! authenticated identity is confined to its own directory tree.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod transfer;

pub use config::ServerConfig;
pub use server::Server;
