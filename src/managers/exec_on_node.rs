use crate::constants::exec::{DEFAULT_SCRIPT_SHELL, DEFAULT_TIMEOUT_SECS, TIMEOUT_EXIT_CODE};
use crate::constants::limits::{AUDIT_COMMAND_CHARS, MAX_STDERR_CHARS, MAX_STDOUT_CHARS};
use crate::errors::ToolError;
use crate::services::audit::{AuditRecord, AuditService};
use crate::services::logger::Logger;
use crate::services::remote_exec::{ExecOutput, RemoteExecutor};
use crate::services::tool_executor::ToolHandler;
use crate::services::validation::Validation;
use crate::utils::paths::expand_home_path;
use crate::utils::redact::redact_output;
use crate::utils::text::truncate_chars;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

pub const TOOL_NAME: &str = "exec_on_node";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    pub ip: String,
    pub command: String,
    pub timeout_ms: u64,
    pub script_path: Option<String>,
}

/// Redacted, bounded command output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecReport {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
    pub truncated: bool,
    pub stderr_truncated: bool,
}

impl ExecReport {
    fn from_output(output: ExecOutput) -> Self {
        let (stdout, truncated) = truncate_chars(&redact_output(&output.stdout), MAX_STDOUT_CHARS);
        let (stderr, stderr_truncated) =
            truncate_chars(&redact_output(&output.stderr), MAX_STDERR_CHARS);
        Self {
            stdout,
            stderr,
            exit_code: output.exit_code,
            truncated,
            stderr_truncated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecResponse {
    /// The command ran to completion; its own exit code may still be non-zero.
    Success(ExecReport),
    Timeout(ExecReport),
    SshError {
        error: String,
        #[serde(rename = "exitCode")]
        exit_code: i64,
    },
}

impl ExecResponse {
    pub fn status(&self) -> &'static str {
        match self {
            ExecResponse::Success(_) => "success",
            ExecResponse::Timeout(_) => "timeout",
            ExecResponse::SshError { .. } => "ssh_error",
        }
    }

    fn ssh_error(error: String) -> Self {
        ExecResponse::SshError {
            error,
            exit_code: TIMEOUT_EXIT_CODE,
        }
    }
}

pub struct ExecOnNodeManager {
    logger: Logger,
    validation: Validation,
    executor: Arc<dyn RemoteExecutor>,
    audit: Arc<AuditService>,
}

impl ExecOnNodeManager {
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

    pub fn parse_args(&self, args: &Value) -> Result<ExecRequest, ToolError> {
        let args = self.validation.ensure_object(args, "arguments")?;
        let ip = self.validation.ensure_string(
            args.get("ip").unwrap_or(&Value::Null),
            "ip",
            true,
        )?;
        let command = self.validation.ensure_text(args.get("command"), "command")?;
        let timeout_ms =
            self.validation
                .ensure_timeout_ms(args.get("timeout"), "timeout", DEFAULT_TIMEOUT_SECS)?;
        let script_path =
            self.validation
                .ensure_optional_string(args.get("scriptPath"), "scriptPath", true)?;
        if script_path.is_none() && command.trim().is_empty() {
            return Err(ToolError::invalid_params(
                "command must be a non-empty string unless scriptPath is given",
            ));
        }
        Ok(ExecRequest {
            ip,
            command,
            timeout_ms,
            script_path,
        })
    }

    /// Runs the request and always audits before returning.
    pub async fn execute(&self, request: &ExecRequest) -> ExecResponse {
        let remote_command = match &request.script_path {
            Some(_) if request.command.trim().is_empty() => DEFAULT_SCRIPT_SHELL.to_string(),
            _ => request.command.clone(),
        };
        let (audited_command, _) = truncate_chars(&remote_command, AUDIT_COMMAND_CHARS);

        let outcome = match &request.script_path {
            Some(path) => match tokio::fs::read_to_string(expand_home_path(path)).await {
                Ok(script) => {
                    self.executor
                        .exec_with_stdin(&request.ip, &remote_command, script, request.timeout_ms)
                        .await
                        .map_err(|err| err.to_string())
                }
                Err(err) => Err(format!("Failed to read script {}: {}", path, err)),
            },
            None => self
                .executor
                .exec(&request.ip, &remote_command, request.timeout_ms)
                .await
                .map_err(|err| err.to_string()),
        };

        let response = match outcome {
            Ok(output) if output.timed_out() => {
                ExecResponse::Timeout(ExecReport::from_output(output))
            }
            Ok(output) => ExecResponse::Success(ExecReport::from_output(output)),
            Err(error) => ExecResponse::ssh_error(error),
        };

        let mut record = AuditRecord::new(TOOL_NAME)
            .field("ip", &request.ip)
            .field("command", audited_command);
        if let Some(path) = &request.script_path {
            record = record.field("script", path);
        }
        record = record.field("status", response.status());
        record = match &response {
            ExecResponse::Success(report) | ExecResponse::Timeout(report) => record
                .field("exitCode", report.exit_code)
                .field("truncated", report.truncated)
                .field("stderrTruncated", report.stderr_truncated),
            ExecResponse::SshError { error, .. } => {
                self.logger.warn(
                    "remote execution failed",
                    Some(&serde_json::json!({ "ip": request.ip, "error": error })),
                );
                record.field("error", error)
            }
        };
        self.audit.record(record).await;

        response
    }
}

#[async_trait::async_trait]
impl ToolHandler for ExecOnNodeManager {
    async fn handle(&self, args: Value) -> Result<Value, ToolError> {
        let request = self.parse_args(&args)?;
        let response = self.execute(&request).await;
        serde_json::to_value(response)
            .map_err(|err| ToolError::internal(format!("Failed to encode response: {}", err)))
    }
}
