//! The boundary between transports and the protocol server
//!
//! Transports never own the server. They attach to it with [`ProtocolServer::connect`],
//! hand it inbound payloads, and detach when their channel goes away.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::errors::DeliveryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Duplex,
    SingleEndpoint,
    Streaming,
}

impl ChannelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Duplex => "duplex",
            Self::SingleEndpoint => "single_endpoint",
            Self::Streaming => "streaming",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerError {
    #[error("server already has an exclusive {channel} connection or cannot become exclusive")]
    AlreadyConnected { channel: ChannelKind },
    #[error("server is closed")]
    Closed,
}

#[async_trait]
pub trait ProtocolServer: Send + Sync {
    fn connect(&self, channel: ChannelKind) -> Result<ConnectionId, ServerError>;

    /// Processes one inbound payload and returns the reply, if the payload warrants one.
    async fn handle_message(&self, connection: ConnectionId, payload: Value) -> Option<Value>;

    fn disconnect(&self, connection: ConnectionId);

    fn report_delivery_error(&self, connection: ConnectionId, error: &DeliveryError);

    /// Releases the server. Calling it again after success is a no-op.
    async fn close(&self) -> Result<(), ServerError>;
}

pub type ServerHandle = Arc<dyn ProtocolServer>;
