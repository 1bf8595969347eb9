//! Model Context Protocol (MCP) server handling and JSON-RPC implementations
//!
//! Provides the protocol-server handle transports attach to, plus JSON-RPC validation,
//! negotiation, formatting, and routing.

pub mod handle;
pub mod rpc;
pub mod server;
