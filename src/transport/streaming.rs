//! Streaming transport: server-sent events plus a shared inbound route
//!
//! `GET /sse` opens a push channel and announces the session's message URL as an
//! `endpoint` event. Clients then `POST /messages?sessionId=<id>`; replies come back as
//! `message` events on their own push channel.

use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Router,
};
use futures::{stream, Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::{net::TcpListener, sync::mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::{AppError, BindError, TransportError};
use crate::http::{handlers::DiscoveryResponse, with_common_routes};
use crate::mcp::handle::{ChannelKind, ServerHandle};
use crate::transport::{
    connection::Connection,
    session::{Session, SessionGuard, SessionRegistry},
    RunningTransport,
};

pub const SSE_ROUTE: &str = "/sse";
pub const MESSAGES_ROUTE: &str = "/messages";

const OUTBOUND_CAPACITY: usize = 64;
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct StreamingAdapter {
    addr: SocketAddr,
}

impl StreamingAdapter {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn bind(
        self,
        server: &ServerHandle,
        shutdown: CancellationToken,
    ) -> Result<RunningTransport, TransportError> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|source| BindError::Listener {
                addr: self.addr,
                source,
            })?;
        self.serve(listener, StreamingState::new(server.clone(), shutdown))
    }

    pub fn serve(
        self,
        listener: TcpListener,
        state: StreamingState,
    ) -> Result<RunningTransport, TransportError> {
        let local_addr = listener.local_addr().map_err(|source| BindError::Listener {
            addr: self.addr,
            source,
        })?;
        let sessions = state.sessions.clone();
        let shutdown = state.shutdown.clone();
        let app = router(state);

        info!(
            addr = %local_addr,
            sse = SSE_ROUTE,
            messages = MESSAGES_ROUTE,
            "sse transport listening"
        );
        let drain = sessions.clone();
        let task = tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async move {
                    shutdown.cancelled().await;
                    let closed = drain.close_all();
                    info!(closed, "closed streaming sessions for shutdown");
                })
                .await
                .map_err(TransportError::Serve)
        });

        Ok(RunningTransport::new(
            ChannelKind::Streaming,
            Some(local_addr),
            Some(sessions),
            task,
        ))
    }
}

#[derive(Clone)]
pub struct StreamingState {
    server: ServerHandle,
    sessions: SessionRegistry,
    shutdown: CancellationToken,
}

impl StreamingState {
    pub fn new(server: ServerHandle, shutdown: CancellationToken) -> Self {
        Self {
            server,
            sessions: SessionRegistry::new(),
            shutdown,
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }
}

pub fn router(state: StreamingState) -> Router {
    let routes = Router::new()
        .route(SSE_ROUTE, get(open_session))
        .route(MESSAGES_ROUTE, post(post_message))
        .with_state(state);
    with_common_routes(
        routes,
        ChannelKind::Streaming,
        DiscoveryResponse::streaming(SSE_ROUTE, MESSAGES_ROUTE),
    )
}

async fn open_session(
    State(state): State<StreamingState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    if state.shutdown.is_cancelled() {
        return Err(shutting_down());
    }

    let (outbound, inbound) = mpsc::channel(OUTBOUND_CAPACITY);
    let connection = Connection::open(&state.server, ChannelKind::Streaming, Some(outbound))
        .map_err(|err| {
            warn!(error = %err, "protocol server refused streaming session");
            AppError::unavailable("connect_refused", "protocol server refused the session")
        })?;
    let session = admit_session(&state, connection)?;

    info!(
        session_id = %session.id,
        connection = %session.connection().id(),
        active = state.sessions.len(),
        "session opened"
    );

    let endpoint = format!("{MESSAGES_ROUTE}?sessionId={}", session.id);
    let guard = SessionGuard::new(state.sessions.clone(), session.id.clone());
    let closed = session.closed();

    let announce = stream::once(async move {
        Ok::<_, Infallible>(Event::default().event("endpoint").data(endpoint))
    });
    let replies = ReceiverStream::new(inbound).map(|message: Value| {
        Ok::<_, Infallible>(Event::default().event("message").data(message.to_string()))
    });
    let events = announce
        .chain(replies)
        .take_until(closed.cancelled_owned())
        .map(move |event| {
            let _guard = &guard;
            event
        });

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)))
}

/// Registers the session, undoing it if shutdown began meanwhile so the shutdown sweep
/// never misses a session.
fn admit_session(
    state: &StreamingState,
    connection: Connection,
) -> Result<Arc<Session>, AppError> {
    let session = state.sessions.register(connection);
    if state.shutdown.is_cancelled() {
        state.sessions.close(&session.id);
        return Err(shutting_down());
    }
    Ok(session)
}

fn shutting_down() -> AppError {
    AppError::unavailable("shutting_down", "server is shutting down")
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

async fn post_message(
    State(state): State<StreamingState>,
    Query(query): Query<MessageQuery>,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let session_id = query
        .session_id
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            AppError::bad_request("missing_session_id", "sessionId query parameter is required")
        })?;

    let Some(session) = state.sessions.get(&session_id) else {
        warn!(session_id = %session_id, "message for unknown session");
        return Err(TransportError::UnknownSession(session_id).into());
    };

    let payload: Value = serde_json::from_slice(&body).map_err(|err| {
        AppError::bad_request("invalid_message", format!("invalid message: {err}"))
    })?;

    match session.deliver(payload).await {
        Ok(()) => Ok(StatusCode::ACCEPTED),
        Err(error) => {
            state.sessions.close(&session_id);
            warn!(
                session_id = %session_id,
                error = %error,
                "session closed after delivery failure"
            );
            Err(TransportError::Delivery(error).into())
        }
    }
}
