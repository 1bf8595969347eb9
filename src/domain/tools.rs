//! Tools exposed via Model Context Protocol
//!
//! Ships a single demonstration tool, `do_something`, so a freshly started server
//! has something to list and call.

use rust_mcp_sdk::{
    macros,
    schema::{CallToolRequestParams, CallToolResult, ContentBlock, TextContent, Tool},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::mcp::rpc::{
    app_error_to_json_rpc, json_rpc_error, json_rpc_error_with_data, json_rpc_result,
    INVALID_PARAMS, METHOD_NOT_FOUND,
};

#[macros::mcp_tool(
    name = "do_something",
    description = "Greets the two given names"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct DoSomethingTool {
    pub param1: String,
    pub param2: String,
}

impl DoSomethingTool {
    pub fn run(&self) -> Result<String, AppError> {
        let first = self.param1.trim();
        let second = self.param2.trim();
        if first.is_empty() || second.is_empty() {
            return Err(AppError::bad_request(
                "empty_param",
                "param1 and param2 must not be empty",
            ));
        }
        Ok(format!("Hello {first} and {second}"))
    }
}

pub fn build_tools_list() -> Vec<Tool> {
    vec![DoSomethingTool::tool()]
}

pub fn handle_tools_call(id: Option<Value>, params: Option<Value>) -> Value {
    let Some(raw_params) = params else {
        return json_rpc_error(id, INVALID_PARAMS, "Invalid params");
    };

    let tool_call: CallToolRequestParams = match serde_json::from_value(raw_params) {
        Ok(value) => value,
        Err(_) => return json_rpc_error(id, INVALID_PARAMS, "Invalid params"),
    };

    match tool_call.name.as_str() {
        "do_something" => {
            let tool: DoSomethingTool =
                match serde_json::from_value(json!(tool_call.arguments.unwrap_or_default())) {
                    Ok(value) => value,
                    Err(_) => return json_rpc_error(id, INVALID_PARAMS, "Invalid params"),
                };

            match tool.run() {
                Ok(text) => json_rpc_result(
                    id,
                    serde_json::to_value(CallToolResult {
                        content: vec![ContentBlock::from(TextContent::new(text, None, None))],
                        is_error: None,
                        meta: None,
                        structured_content: None,
                    })
                    .expect("do_something tool result serialization"),
                ),
                Err(err) => app_error_to_json_rpc(id, err),
            }
        }
        _ => json_rpc_error_with_data(
            id,
            METHOD_NOT_FOUND,
            "Method not found",
            Some(json!({
                "code": "tool_not_found",
                "message": "unknown tool name",
                "details": {
                    "name": tool_call.name,
                },
            })),
        ),
    }
}
