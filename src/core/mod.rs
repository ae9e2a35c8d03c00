/// Core Server Framework Module
///
/// This module contains the protocol core and its transports:
/// - registry.rs / invoker.rs: tool descriptors, argument binding, execution
/// - dispatcher.rs / protocol.rs: JSON-RPC routing and message types
/// - codec.rs / transport.rs / client.rs: newline-framed streams and request correlation
/// - server.rs: STDIO and HTTP runners
/// - config.rs / logging.rs / error.rs: environment configuration, tracing setup, error types

pub mod client;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod invoker;
pub mod logging;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod transport;
