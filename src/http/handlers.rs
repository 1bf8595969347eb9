//! Axum HTTP handlers shared by the network transports
//!
//! Provides the health probe and the discovery document describing where the MCP
//! endpoints of the running transport live.

use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DiscoveryResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub transport: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcp_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sse_endpoint: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages_endpoint: Option<&'static str>,
}

impl DiscoveryResponse {
    pub fn single_endpoint(route: &str) -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            transport: "http",
            mcp_endpoint: Some(route.to_string()),
            sse_endpoint: None,
            messages_endpoint: None,
        }
    }

    pub fn streaming(sse_route: &'static str, messages_route: &'static str) -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            transport: "sse",
            mcp_endpoint: None,
            sse_endpoint: Some(sse_route),
            messages_endpoint: Some(messages_route),
        }
    }
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
