//! The central Model Context Protocol engine
//!
//! Provides [`McpServer`], the protocol-server handle every transport attaches to: JSON-RPC
//! decoding, method routing, capabilities negotiation (`initialize`), and tool integrations.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_mcp_sdk::schema::{
    CallToolRequest, Implementation, InitializeRequest, InitializeResult, JsonrpcMessage,
    JsonrpcRequest, ListToolsRequest, ListToolsResult, PingRequest, ProtocolVersion,
    ServerCapabilities, ServerCapabilitiesTools,
};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::domain::tools::{build_tools_list, handle_tools_call};
use crate::errors::{AppError, DeliveryError};
use crate::mcp::handle::{ChannelKind, ConnectionId, ProtocolServer, ServerError};
use crate::mcp::rpc::{
    app_error_to_json_rpc, is_json_rpc_error, json_rpc_error, json_rpc_result,
    request_id_to_value, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND,
};

pub const SUPPORTED_PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl ServerInfo {
    pub fn from_package() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct ConnectionTable {
    closed: bool,
    active: HashMap<ConnectionId, ChannelKind>,
}

#[derive(Debug)]
pub struct McpServer {
    info: ServerInfo,
    connections: Mutex<ConnectionTable>,
    next_connection: AtomicU64,
    delivery_failures: AtomicU64,
}

impl McpServer {
    pub fn new(info: ServerInfo) -> Self {
        Self {
            info,
            connections: Mutex::new(ConnectionTable::default()),
            next_connection: AtomicU64::new(1),
            delivery_failures: AtomicU64::new(0),
        }
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    pub fn active_connections(&self) -> usize {
        self.connections.lock().active.len()
    }

    pub fn is_closed(&self) -> bool {
        self.connections.lock().closed
    }

    pub fn delivery_failures(&self) -> u64 {
        self.delivery_failures.load(Ordering::Relaxed)
    }

    /// Handles a single message or a batch array, returning `None` when nothing needs a reply.
    pub async fn handle_payload(&self, payload: Value) -> Option<Value> {
        let Some(batch) = payload.as_array() else {
            return self.handle_json_rpc_value(payload).await;
        };

        if batch.is_empty() {
            return Some(Value::Array(vec![json_rpc_error(
                None,
                INVALID_REQUEST,
                "Invalid Request",
            )]));
        }

        let mut responses = Vec::new();
        for item in batch {
            if let Some(response) = self.handle_json_rpc_value(item.clone()).await {
                responses.push(response);
            }
        }

        if responses.is_empty() {
            None
        } else {
            Some(Value::Array(responses))
        }
    }

    pub async fn handle_json_rpc_value(&self, payload: Value) -> Option<Value> {
        if !payload.is_object() {
            return Some(json_rpc_error(None, INVALID_REQUEST, "Invalid Request"));
        }

        let request_id = payload.get("id").cloned();
        let parsed: JsonrpcMessage = match serde_json::from_value(payload) {
            Ok(message) => message,
            Err(_) => return Some(json_rpc_error(request_id, INVALID_REQUEST, "Invalid Request")),
        };

        match parsed {
            JsonrpcMessage::Request(request) => {
                if let Err(error_response) = validate_request_shape(&request) {
                    return Some(error_response);
                }

                let request_id = request_id_to_value(request.id);
                if request.method.trim().is_empty() {
                    return Some(json_rpc_error(
                        Some(request_id),
                        INVALID_REQUEST,
                        "Invalid Request",
                    ));
                }

                Some(
                    self.handle_json_rpc_request(
                        Some(request_id),
                        request.method,
                        request.params.map(Value::Object),
                    )
                    .await,
                )
            }
            JsonrpcMessage::Notification(notification) => {
                debug!(method = %notification.method, "notification received");
                None
            }
            JsonrpcMessage::ResultResponse(_) | JsonrpcMessage::ErrorResponse(_) => {
                Some(json_rpc_error(request_id, INVALID_REQUEST, "Invalid Request"))
            }
        }
    }

    pub async fn handle_json_rpc_request(
        &self,
        id: Option<Value>,
        method: String,
        params: Option<Value>,
    ) -> Value {
        let audit_params = redact_audit_params(params.as_ref());

        let response = match method.as_str() {
            "initialize" => self.initialize(id, params.as_ref()),
            "ping" => json_rpc_result(id, json!({})),
            "tools/list" => json_rpc_result(
                id,
                serde_json::to_value(ListToolsResult {
                    meta: None,
                    next_cursor: None,
                    tools: build_tools_list(),
                })
                .expect("tools list result serialization"),
            ),
            "tools/call" => handle_tools_call(id, params),
            _ => json_rpc_error(id, METHOD_NOT_FOUND, "Method not found"),
        };

        info!(
            method = %method,
            params = %audit_params,
            outcome = if is_json_rpc_error(&response) { "failure" } else { "success" },
            "mcp action audited"
        );

        response
    }

    fn initialize(&self, id: Option<Value>, params: Option<&Value>) -> Value {
        let protocol_version = match negotiate_protocol_version(params) {
            Ok(version) => version,
            Err(err) => return app_error_to_json_rpc(id, err),
        };

        let initialize_result = InitializeResult {
            server_info: Implementation {
                name: self.info.name.clone(),
                version: self.info.version.clone(),
                title: None,
                description: None,
                icons: vec![],
                website_url: None,
            },
            capabilities: ServerCapabilities {
                tools: Some(ServerCapabilitiesTools {
                    list_changed: Some(false),
                }),
                resources: None,
                prompts: None,
                ..Default::default()
            },
            protocol_version: protocol_version.into(),
            instructions: None,
            meta: None,
        };

        json_rpc_result(
            id,
            serde_json::to_value(initialize_result).expect("initialize result serialization"),
        )
    }
}

#[async_trait]
impl ProtocolServer for McpServer {
    fn connect(&self, channel: ChannelKind) -> Result<ConnectionId, ServerError> {
        let mut table = self.connections.lock();
        if table.closed {
            return Err(ServerError::Closed);
        }

        let duplex_live = table
            .active
            .values()
            .any(|kind| *kind == ChannelKind::Duplex);
        if duplex_live || (channel == ChannelKind::Duplex && !table.active.is_empty()) {
            return Err(ServerError::AlreadyConnected { channel });
        }

        let id = ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed));
        table.active.insert(id, channel);
        debug!(connection = %id, channel = %channel, "transport attached");
        Ok(id)
    }

    async fn handle_message(&self, connection: ConnectionId, payload: Value) -> Option<Value> {
        {
            let table = self.connections.lock();
            if table.closed || !table.active.contains_key(&connection) {
                debug!(
                    connection = %connection,
                    closed = table.closed,
                    "message from detached connection dropped"
                );
                return None;
            }
        }
        debug!(connection = %connection, "inbound message");
        self.handle_payload(payload).await
    }

    fn disconnect(&self, connection: ConnectionId) {
        if let Some(channel) = self.connections.lock().active.remove(&connection) {
            debug!(connection = %connection, channel = %channel, "transport detached");
        }
    }

    fn report_delivery_error(&self, connection: ConnectionId, error: &DeliveryError) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
        warn!(connection = %connection, error = %error, "reply could not be delivered");
    }

    async fn close(&self) -> Result<(), ServerError> {
        let mut table = self.connections.lock();
        if table.closed {
            debug!("server already closed");
            return Ok(());
        }

        table.closed = true;
        let dropped = table.active.len();
        table.active.clear();
        info!(open_connections = dropped, "mcp server closed");
        Ok(())
    }
}

pub fn validate_request_shape(request: &JsonrpcRequest) -> Result<(), Value> {
    let payload = serde_json::to_value(request).expect("jsonrpc request serialization");
    let request_id = Some(request_id_to_value(request.id.clone()));

    let valid = match request.method.as_str() {
        "tools/call" => serde_json::from_value::<CallToolRequest>(payload).is_ok(),
        "tools/list" => serde_json::from_value::<ListToolsRequest>(payload).is_ok(),
        "ping" => serde_json::from_value::<PingRequest>(payload).is_ok(),
        "initialize" => serde_json::from_value::<InitializeRequest>(payload).is_ok(),
        _ => true,
    };

    if valid {
        Ok(())
    } else {
        Err(json_rpc_error(request_id, INVALID_PARAMS, "Invalid params"))
    }
}

/// Newer clients offering a version this server does not speak are answered with the
/// version it does support; the client decides whether to continue.
pub fn negotiate_protocol_version(params: Option<&Value>) -> Result<ProtocolVersion, AppError> {
    let offered_version = params
        .and_then(Value::as_object)
        .and_then(|object| object.get("protocolVersion"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|version| !version.is_empty())
        .ok_or_else(|| {
            AppError::bad_request(
                "invalid_protocol_version",
                "initialize params.protocolVersion is required",
            )
        })?;

    if offered_version != SUPPORTED_PROTOCOL_VERSION {
        debug!(offered = %offered_version, "answering with supported protocol version");
    }

    Ok(ProtocolVersion::V2024_11_05)
}

pub fn redact_audit_params(params: Option<&Value>) -> Value {
    params.map(redact_audit_value).unwrap_or(Value::Null)
}

pub fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "authorization" | "bearer" | "api_key" | "apikey"
    ) || normalized.contains("token")
        || normalized.contains("secret")
        || normalized.contains("password")
        || normalized.contains("credential")
}
