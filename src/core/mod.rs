/// Core Server Framework Module
///
/// This module contains everything between the transports and the tools:
/// - config.rs: settings loaded from the environment
/// - error.rs: error types and JSON-RPC error codes
/// - sandbox.rs: path confinement for the file tools
/// - registry.rs: tool descriptors and the handler trait
/// - dispatcher.rs: argument validation and failure normalization
/// - protocol.rs: JSON-RPC envelopes and method routing
/// - server.rs: HTTP and STDIO transports

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod sandbox;
pub mod server;
