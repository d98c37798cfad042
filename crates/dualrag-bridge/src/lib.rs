//! Cross-process bridge to a remotely held index.
//!
//! Frames are single-line JSON objects separated by `\n`, over any
//! bidirectional byte stream (child process pipes, TCP, in-memory duplex).

pub mod client;
pub mod protocol;
pub mod server;

pub use client::BridgeClient;
pub use protocol::{ErrorBody, Method, Request, Response};
pub use server::BridgeServer;
