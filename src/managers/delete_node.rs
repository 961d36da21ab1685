use crate::constants::center::{NODES_PATH, SUCCESS_CODE};
use crate::errors::ToolError;
use crate::services::audit::{AuditRecord, AuditService};
use crate::services::center_client::{FleetApi, RequestOptions};
use crate::services::logger::Logger;
use crate::services::tool_executor::ToolHandler;
use crate::services::validation::Validation;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

pub const TOOL_NAME: &str = "delete_node";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct DeleteNodeManager {
    logger: Logger,
    validation: Validation,
    api: Arc<dyn FleetApi>,
    audit: Arc<AuditService>,
}

impl DeleteNodeManager {
    pub fn new(
        logger: Logger,
        validation: Validation,
        api: Arc<dyn FleetApi>,
        audit: Arc<AuditService>,
    ) -> Self {
        Self {
            logger: logger.child(TOOL_NAME),
            validation,
            api,
            audit,
        }
    }

    /// Removes the control-plane record for `ip`. Nothing on the node itself
    /// is touched. Backend refusals come back as `deleted: false`.
    pub async fn delete(&self, ip: &str) -> DeleteResponse {
        let path = format!("{}/{}", NODES_PATH, ip);
        let error = match self.api.request(&path, RequestOptions::delete()).await {
            Ok(body) => backend_error(&body),
            Err(err) => Some(err.message),
        };

        let mut record = AuditRecord::new(TOOL_NAME)
            .field("ip", ip)
            .field("deleted", error.is_none());
        if let Some(message) = &error {
            self.logger.info(
                "delete refused",
                Some(&serde_json::json!({ "ip": ip, "error": message })),
            );
            record = record.field("error", message);
        }
        self.audit.record(record).await;

        DeleteResponse {
            deleted: error.is_none(),
            ip: ip.to_string(),
            error,
        }
    }
}

/// `None` when the backend reports success.
fn backend_error(body: &Value) -> Option<String> {
    match body.get("code").and_then(Value::as_i64) {
        Some(SUCCESS_CODE) => None,
        code => Some(
            body.get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| match code {
                    Some(code) => format!("Center API returned code {}", code),
                    None => "Center API response has no code".to_string(),
                }),
        ),
    }
}

#[async_trait::async_trait]
impl ToolHandler for DeleteNodeManager {
    async fn handle(&self, args: Value) -> Result<Value, ToolError> {
        let ip = self
            .validation
            .ensure_node_address(args.get("ip").unwrap_or(&Value::Null), "ip")?;
        let response = self.delete(&ip).await;
        serde_json::to_value(response)
            .map_err(|err| ToolError::internal(format!("Failed to encode response: {}", err)))
    }
}
