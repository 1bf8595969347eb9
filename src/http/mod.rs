//! HTTP plumbing shared by the network transports
//!
//! Every listener mounts `/health` and `/.well-known/mcp` next to its protocol routes and
//! logs a summary line per request.

use axum::{middleware, routing::get, Json, Router};

use crate::logging;
use crate::mcp::handle::ChannelKind;

pub mod handlers;

use handlers::DiscoveryResponse;

pub fn with_common_routes(
    router: Router,
    transport: ChannelKind,
    discovery: DiscoveryResponse,
) -> Router {
    router
        .route("/health", get(handlers::health))
        .route(
            "/.well-known/mcp",
            get(move || {
                let discovery = discovery.clone();
                async move { Json(discovery) }
            }),
        )
        .layer(middleware::from_fn_with_state(
            transport,
            logging::request_logging_middleware,
        ))
}
