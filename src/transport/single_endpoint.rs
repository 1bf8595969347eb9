//! Single-endpoint HTTP transport
//!
//! One `POST` route takes a JSON-RPC payload and answers it synchronously. Nothing is
//! remembered between requests.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::errors::{BindError, TransportError};
use crate::http::{handlers::DiscoveryResponse, with_common_routes};
use crate::mcp::handle::{ChannelKind, ServerHandle};
use crate::mcp::rpc::{json_rpc_error, PARSE_ERROR};
use crate::transport::{connection::Connection, RunningTransport};

#[derive(Debug, Clone)]
pub struct SingleEndpointAdapter {
    addr: SocketAddr,
    route: String,
}

impl SingleEndpointAdapter {
    pub fn new(addr: SocketAddr, route: String) -> Self {
        Self { addr, route }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub async fn bind(
        self,
        server: &ServerHandle,
        shutdown: CancellationToken,
    ) -> Result<RunningTransport, TransportError> {
        let connection = Connection::open(server, ChannelKind::SingleEndpoint, None)
            .map_err(BindError::from)?;
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|source| BindError::Listener {
                addr: self.addr,
                source,
            })?;
        self.serve(listener, connection, shutdown)
    }

    pub fn serve(
        self,
        listener: TcpListener,
        connection: Connection,
        shutdown: CancellationToken,
    ) -> Result<RunningTransport, TransportError> {
        let local_addr = listener.local_addr().map_err(|source| BindError::Listener {
            addr: self.addr,
            source,
        })?;
        let app = router(&self.route, Arc::new(connection));

        info!(addr = %local_addr, route = %self.route, "http transport listening");
        let task = tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
                .map_err(TransportError::Serve)
        });

        Ok(RunningTransport::new(
            ChannelKind::SingleEndpoint,
            Some(local_addr),
            None,
            task,
        ))
    }
}

pub fn router(route: &str, connection: Arc<Connection>) -> Router {
    let mcp = Router::new()
        .route(route, post(mcp_endpoint))
        .with_state(connection);
    with_common_routes(
        mcp,
        ChannelKind::SingleEndpoint,
        DiscoveryResponse::single_endpoint(route),
    )
}

pub async fn mcp_endpoint(State(connection): State<Arc<Connection>>, body: Bytes) -> Response {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(_) => {
            return (
                StatusCode::OK,
                Json(json_rpc_error(None, PARSE_ERROR, "Parse error")),
            )
                .into_response()
        }
    };

    match connection.request(payload).await {
        Some(response) => (StatusCode::OK, Json(response)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::mcp::server::{McpServer, ServerInfo};

    fn app() -> Router {
        let handle: ServerHandle = Arc::new(McpServer::new(ServerInfo::from_package()));
        let connection =
            Connection::open(&handle, ChannelKind::SingleEndpoint, None).expect("attach");
        router("/mcp", Arc::new(connection))
    }

    fn post_json(uri: &str, body: &'static str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .expect("request build")
    }

    async fn body_json(response: Response) -> Value {
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        serde_json::from_slice(&body).expect("valid json response")
    }

    #[tokio::test]
    async fn health_is_public() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .method("GET")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        assert_eq!(body, "{\"status\":\"ok\"}");
    }

    #[tokio::test]
    async fn discovery_points_at_the_configured_route() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/.well-known/mcp")
                    .method("GET")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body_json = body_json(response).await;
        assert_eq!(body_json["transport"], "http");
        assert_eq!(body_json["mcp_endpoint"], "/mcp");
    }

    #[tokio::test]
    async fn mcp_unknown_method_returns_method_not_found() {
        let response = app()
            .oneshot(post_json(
                "/mcp",
                r#"{"jsonrpc":"2.0","id":1,"method":"unknown"}"#,
            ))
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        assert_eq!(
            body,
            "{\"error\":{\"code\":-32601,\"message\":\"Method not found\"},\"id\":1,\"jsonrpc\":\"2.0\"}"
        );
    }

    #[tokio::test]
    async fn mcp_initialize_returns_result() {
        let response = app()
            .oneshot(post_json(
                "/mcp",
                r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","clientInfo":{"name":"test-client","version":"1.0.0"},"capabilities":{}}}"#,
            ))
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body_json = body_json(response).await;

        assert_eq!(body_json["jsonrpc"], "2.0");
        assert_eq!(body_json["id"], 1);
        assert_eq!(body_json["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(
            body_json["result"]["serverInfo"]["name"],
            env!("CARGO_PKG_NAME")
        );
        assert!(body_json["result"]["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn mcp_tools_call_runs_demo_tool() {
        let response = app()
            .oneshot(post_json(
                "/mcp",
                r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"do_something","arguments":{"param1":"a","param2":"b"}}}"#,
            ))
            .await
            .expect("request execution");

        let body_json = body_json(response).await;
        assert_eq!(body_json["id"], 3);
        assert_eq!(body_json["result"]["content"][0]["text"], "Hello a and b");
    }

    #[tokio::test]
    async fn malformed_body_returns_parse_error() {
        let response = app()
            .oneshot(post_json("/mcp", "{not json"))
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body_json = body_json(response).await;
        assert_eq!(body_json["error"]["code"], PARSE_ERROR);
    }

    #[tokio::test]
    async fn notification_only_returns_no_content() {
        let response = app()
            .oneshot(post_json(
                "/mcp",
                r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            ))
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn other_routes_are_not_found() {
        let response = app()
            .oneshot(post_json("/", r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bind_serves_on_an_ephemeral_listener() {
        let handle: ServerHandle = Arc::new(McpServer::new(ServerInfo::from_package()));
        let connection =
            Connection::open(&handle, ChannelKind::SingleEndpoint, None).expect("attach");
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("listener");
        let shutdown = CancellationToken::new();

        let running = SingleEndpointAdapter::new(
            SocketAddr::from(([127, 0, 0, 1], 0)),
            "/mcp".to_string(),
        )
        .serve(listener, connection, shutdown.clone())
        .expect("serve");

        assert!(running.local_addr().is_some_and(|addr| addr.port() != 0));
        shutdown.cancel();
        running.wait().await.expect("graceful stop");
    }

    #[tokio::test]
    async fn port_in_use_is_a_bind_error() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.expect("listener");
        let addr = occupied.local_addr().expect("addr");
        let handle: ServerHandle = Arc::new(McpServer::new(ServerInfo::from_package()));

        let error = SingleEndpointAdapter::new(addr, "/mcp".to_string())
            .bind(&handle, CancellationToken::new())
            .await
            .expect_err("port is taken");

        assert!(matches!(
            error,
            TransportError::Bind(BindError::Listener { .. })
        ));
    }
}
