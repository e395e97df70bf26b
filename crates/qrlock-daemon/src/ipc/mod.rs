//! IPC server for CLI communication
//!
//! Newline-delimited JSON over a Unix domain socket. Each request carries
//! the caller's session token; each response hands back the token to use
//! next (absent when the session was cleared).

mod client;
mod framing;
mod server;
mod types;
mod unix;

// Public API
pub use client::IpcClient;
pub use framing::{max_request_bytes, MAX_RESPONSE_BYTES};
pub use server::IpcServer;
pub use types::{IpcRequest, IpcResponse};
