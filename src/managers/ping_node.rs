use crate::errors::ToolError;
use crate::services::audit::{AuditRecord, AuditService};
use crate::services::logger::Logger;
use crate::services::remote_exec::RemoteExecutor;
use crate::services::tool_executor::ToolHandler;
use crate::services::validation::Validation;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

pub const TOOL_NAME: &str = "ping_node";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PingResponse {
    pub reachable: bool,
    #[serde(rename = "latencyMs", skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct PingNodeManager {
    logger: Logger,
    validation: Validation,
    executor: Arc<dyn RemoteExecutor>,
    audit: Arc<AuditService>,
}

impl PingNodeManager {
    pub fn new(
        logger: Logger,
        validation: Validation,
        executor: Arc<dyn RemoteExecutor>,
        audit: Arc<AuditService>,
    ) -> Self {
        Self {
            logger: logger.child(TOOL_NAME),
            validation,
            executor,
            audit,
        }
    }

    /// Connect-and-authenticate only. Failure latency goes to the audit log,
    /// not to the caller.
    pub async fn ping(&self, ip: &str) -> PingResponse {
        let started = Instant::now();
        match self.executor.probe(ip).await {
            Ok(latency_ms) => {
                self.audit
                    .record(
                        AuditRecord::new(TOOL_NAME)
                            .field("ip", ip)
                            .field("reachable", true)
                            .field("latencyMs", latency_ms),
                    )
                    .await;
                PingResponse {
                    reachable: true,
                    latency_ms: Some(latency_ms),
                    error: None,
                }
            }
            Err(err) => {
                let elapsed = started.elapsed().as_millis() as u64;
                let error = err.to_string();
                self.logger.debug(
                    "node unreachable",
                    Some(&serde_json::json!({ "ip": ip, "error": error })),
                );
                self.audit
                    .record(
                        AuditRecord::new(TOOL_NAME)
                            .field("ip", ip)
                            .field("reachable", false)
                            .field("latencyMs", elapsed)
                            .field("error", &error),
                    )
                    .await;
                PingResponse {
                    reachable: false,
                    latency_ms: None,
                    error: Some(error),
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl ToolHandler for PingNodeManager {
    async fn handle(&self, args: Value) -> Result<Value, ToolError> {
        let ip = self
            .validation
            .ensure_string(args.get("ip").unwrap_or(&Value::Null), "ip", true)?;
        let response = self.ping(&ip).await;
        serde_json::to_value(response)
            .map_err(|err| ToolError::internal(format!("Failed to encode response: {}", err)))
    }
}
