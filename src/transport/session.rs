//! Streaming session management

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::errors::DeliveryError;
use crate::transport::connection::Connection;

/// Session identifier handed to streaming clients
pub type SessionId = String;

/// One connected streaming client
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    connection: Connection,
    closed: CancellationToken,
}

impl Session {
    fn new(id: SessionId, connection: Connection) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            connection,
            closed: CancellationToken::new(),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Routes an inbound message to the server; the reply goes out on the push channel.
    pub async fn deliver(&self, payload: Value) -> Result<(), DeliveryError> {
        self.connection.deliver(payload, &self.closed).await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Token cancelled once the session has been closed.
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    fn close(&self) {
        self.closed.cancel();
    }
}

/// Concurrent map of live sessions.
///
/// Insert, lookup and remove are each atomic per key; a session is removed from the map
/// before its channel is closed, so a lookup never returns a session that was already
/// torn down by `close`.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<SessionId, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the connection under a freshly generated identifier.
    pub fn register(&self, connection: Connection) -> Arc<Session> {
        loop {
            let id = Uuid::new_v4().to_string();
            if let Entry::Vacant(slot) = self.sessions.entry(id.clone()) {
                let session = Arc::new(Session::new(id, connection));
                slot.insert(session.clone());
                return session;
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Removes and closes the session. Returns `false` if it was already gone, so
    /// teardown runs once no matter how many sources report the closure.
    pub fn close(&self, id: &str) -> bool {
        let Some((_, session)) = self.sessions.remove(id) else {
            return false;
        };
        session.close();
        info!(
            session_id = %session.id,
            connection = %session.connection.id(),
            open_for_ms = (Utc::now() - session.created_at).num_milliseconds(),
            active = self.sessions.len(),
            "session closed"
        );
        true
    }

    pub fn close_all(&self) -> usize {
        let ids: Vec<SessionId> = self
            .sessions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.iter().filter(|id| self.close(id)).count()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Closes its session when dropped, tying registry removal to the push stream's lifetime.
#[derive(Debug)]
pub struct SessionGuard {
    registry: SessionRegistry,
    id: SessionId,
}

impl SessionGuard {
    pub fn new(registry: SessionRegistry, id: SessionId) -> Self {
        Self { registry, id }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.close(&self.id);
    }
}
