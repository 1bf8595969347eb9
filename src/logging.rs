use std::{io, time::Instant};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::mcp::handle::ChannelKind;

/// Logs go to stderr: in stdio mode stdout carries protocol frames only.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();
}

pub async fn request_logging_middleware(
    State(transport): State<ChannelKind>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let has_session = request
        .uri()
        .query()
        .is_some_and(|query| query.contains("sessionId="));
    let started_at = Instant::now();

    let response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = started_at.elapsed().as_millis();

    info!(
        transport = %transport,
        method = %method,
        path = %path,
        has_session,
        status = status.as_u16(),
        duration_ms = elapsed_ms,
        "request summary"
    );

    if status.is_server_error() {
        error!(
            transport = %transport,
            method = %method,
            path = %path,
            status = status.as_u16(),
            "request failed"
        );
    } else if status.is_client_error() {
        warn!(
            transport = %transport,
            method = %method,
            path = %path,
            status = status.as_u16(),
            "request rejected"
        );
    }

    response
}
