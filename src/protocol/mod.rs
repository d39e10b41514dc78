//! Wire protocol
//!
//! Line-delimited JSON requests and responses, plus dispatch of requests to
//! the storage engine.

pub mod commands;
pub mod handlers;
pub mod responses;

pub use commands::{CommandStatus, Request, parse_request};
pub use handlers::{Reply, handle_request};
pub use responses::{Response, ResponseData};
