use crate::app::App;
use crate::errors::{ErrorCode, McpError, ToolError, ToolErrorKind};
use crate::managers::list_nodes;
use crate::mcp::catalog::{list_tools, validate_tool_args};
use crate::mcp::protocol::{
    JsonRpcRequest, JsonRpcResponse, ToolCallParams, ToolCallResult, PROTOCOL_VERSION,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

const SERVER_NAME: &str = "kaitu-ops";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

fn map_tool_error(tool: &str, error: &ToolError) -> McpError {
    let mut lines = vec![
        "KaituOpsError".to_string(),
        format!("tool: {}", tool),
        format!("kind: {:?}", error.kind).to_lowercase(),
        format!("code: {}", error.code),
        format!("retryable: {}", error.retryable),
        format!("message: {}", error.message),
    ];
    if let Some(hint) = &error.hint {
        lines.push(format!("hint: {}", hint));
    }
    let message = lines.join("\n");

    match error.kind {
        ToolErrorKind::InvalidParams => McpError::new(ErrorCode::InvalidParams, message),
        ToolErrorKind::Timeout => McpError::new(ErrorCode::RequestTimeout, message),
        _ => McpError::new(ErrorCode::InternalError, message),
    }
}

/// Renders a handler's value as the text block returned to the client.
fn render_tool_text(tool: &str, value: &Value) -> Result<String, McpError> {
    let rendered = if tool == list_nodes::TOOL_NAME {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    rendered.map_err(|err| {
        McpError::new(
            ErrorCode::InternalError,
            format!("Failed to encode {} result: {}", tool, err),
        )
    })
}

pub struct McpServer {
    app: Arc<App>,
}

impl McpServer {
    pub fn new(app: Arc<App>) -> Self {
        Self { app }
    }

    fn handle_initialize(&self) -> Value {
        serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": {}},
            "serverInfo": {"name": SERVER_NAME, "version": SERVER_VERSION},
        })
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, McpError> {
        let params: ToolCallParams = serde_json::from_value(params)
            .map_err(|err| McpError::invalid_params(format!("Invalid tools/call params: {}", err)))?;
        if params.name.trim().is_empty() {
            return Err(McpError::invalid_params("Missing tool name"));
        }
        let name = params.name.as_str();
        let args = match params.arguments {
            Some(Value::Null) | None => Value::Object(Default::default()),
            Some(args) => args,
        };

        validate_tool_args(name, &args)?;
        let value = self
            .app
            .tool_executor
            .execute(name, args)
            .await
            .map_err(|err| map_tool_error(name, &err))?;

        let text = render_tool_text(name, &value)?;
        serde_json::to_value(ToolCallResult::text(text))
            .map_err(|err| McpError::new(ErrorCode::InternalError, err.to_string()))
    }

    /// Handles one line of input; `None` when no reply is due.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let parsed: Value = match serde_json::from_str(trimmed) {
            Ok(value) => value,
            Err(_) => {
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    ErrorCode::ParseError.as_i32(),
                    "Parse error".to_string(),
                ))
            }
        };
        let request: JsonRpcRequest = match serde_json::from_value(parsed) {
            Ok(req) => req,
            Err(_) => {
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    ErrorCode::InvalidRequest.as_i32(),
                    "Invalid request".to_string(),
                ))
            }
        };

        if request.method.starts_with("notifications/") {
            return None;
        }
        let id = request.id?;
        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(id, self.handle_initialize()),
            "ping" => JsonRpcResponse::success(id, serde_json::json!({})),
            "tools/list" => JsonRpcResponse::success(id, list_tools()),
            "tools/call" => match self.handle_tools_call(request.params).await {
                Ok(result) => JsonRpcResponse::success(id, result),
                Err(err) => JsonRpcResponse::failure(id, err.code.as_i32(), err.message),
            },
            _ => JsonRpcResponse::failure(
                id,
                ErrorCode::MethodNotFound.as_i32(),
                "Method not found".to_string(),
            ),
        };
        Some(response)
    }

    /// Serves newline-delimited JSON-RPC until `reader` hits EOF.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<(), ToolError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        let mut writer = BufWriter::new(writer);

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|err| ToolError::internal(err.to_string()))?
        {
            if let Some(response) = self.handle_line(&line).await {
                let payload = serde_json::to_string(&response).map_err(|err| {
                    ToolError::internal(format!("Failed to encode response: {}", err))
                })?;
                writer.write_all(payload.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        Ok(())
    }

    /// Counters reported when the client closes stdin.
    pub fn shutdown_summary(&self) -> Value {
        serde_json::json!({ "audit": self.app.audit_service.stats() })
    }

    pub async fn run_stdio(&self) -> Result<(), ToolError> {
        self.app.logger.info("serving on stdio", None);
        let result = self
            .serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await;
        self.app
            .logger
            .info("stdin closed", Some(&self.shutdown_summary()));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_errors_map_to_rpc_codes() {
        let err = map_tool_error("list_nodes", &ToolError::contract_violation("bad shape"));
        assert_eq!(err.code, ErrorCode::InternalError);
        assert!(err.message.contains("kind: contractviolation"), "{}", err.message);
        assert!(err.message.contains("message: bad shape"));

        let err = map_tool_error("exec_on_node", &ToolError::invalid_params("ip missing"));
        assert_eq!(err.code, ErrorCode::InvalidParams);
        let err = map_tool_error("list_nodes", &ToolError::timeout("slow"));
        assert_eq!(err.code, ErrorCode::RequestTimeout);
    }

    #[test]
    fn list_nodes_text_is_pretty() {
        let value = serde_json::json!([{"name": "jp-01"}]);
        assert!(render_tool_text("list_nodes", &value).expect("text").contains('\n'));
        assert_eq!(
            render_tool_text("ping_node", &serde_json::json!({"reachable": true})).expect("text"),
            r#"{"reachable":true}"#
        );
    }
}
