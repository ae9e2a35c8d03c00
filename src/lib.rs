//! Model Context Protocol (MCP) tool server.
//!
//! Exposes a fixed set of tools over JSON-RPC 2.0, either on a newline-framed
//! byte stream (stdin/stdout or any async reader/writer pair) or over HTTP.

pub mod core;
pub mod tools;

pub use crate::core::client::RpcClient;
pub use crate::core::codec::LineCodec;
pub use crate::core::dispatcher::{Dispatcher, ServerInfo};
pub use crate::core::registry::{ToolDescriptor, ToolParameter, ToolRegistry};
pub use crate::core::transport::StreamTransport;
