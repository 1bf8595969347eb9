use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use crate::errors::DeliveryError;
use crate::mcp::handle::{ChannelKind, ConnectionId, ServerError, ServerHandle};

/// A transport's attachment to the protocol server.
///
/// Dropping the connection detaches it from the server.
pub struct Connection {
    id: ConnectionId,
    server: ServerHandle,
    outbound: Option<mpsc::Sender<Value>>,
}

impl Connection {
    pub fn open(
        server: &ServerHandle,
        channel: ChannelKind,
        outbound: Option<mpsc::Sender<Value>>,
    ) -> Result<Self, ServerError> {
        let id = server.connect(channel)?;
        Ok(Self {
            id,
            server: server.clone(),
            outbound,
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Hands the payload to the server and returns its reply to the caller.
    pub async fn request(&self, payload: Value) -> Option<Value> {
        self.server.handle_message(self.id, payload).await
    }

    /// Hands the payload to the server and pushes any reply into the outbound channel.
    ///
    /// `closed` is checked before the request and again before the push, so a reply for a
    /// channel that closed in the meantime is reported as lost instead of being queued.
    /// Never waits for channel capacity. Every failure is reported to the server.
    pub async fn deliver(
        &self,
        payload: Value,
        closed: &CancellationToken,
    ) -> Result<(), DeliveryError> {
        if closed.is_cancelled() {
            return Err(self.report(DeliveryError::ChannelClosed));
        }
        let Some(reply) = self.request(payload).await else {
            return Ok(());
        };
        if closed.is_cancelled() {
            return Err(self.report(DeliveryError::ChannelClosed));
        }
        self.push(reply)
    }

    pub fn push(&self, message: Value) -> Result<(), DeliveryError> {
        let Some(outbound) = &self.outbound else {
            return Err(self.report(DeliveryError::NoChannel));
        };
        outbound.try_send(message).map_err(|err| {
            self.report(match err {
                TrySendError::Full(_) => DeliveryError::Backpressure,
                TrySendError::Closed(_) => DeliveryError::ChannelClosed,
            })
        })
    }

    fn report(&self, error: DeliveryError) -> DeliveryError {
        self.server.report_delivery_error(self.id, &error);
        error
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.server.disconnect(self.id);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("has_outbound", &self.outbound.is_some())
            .finish()
    }
}
