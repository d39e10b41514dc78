//! Transfer module
//!
//! Streams file contents to clients.

pub mod file_ops;

pub use file_ops::send_file;
