use crate::errors::ToolError;
use crate::managers::delete_node::{self, DeleteNodeManager};
use crate::managers::exec_on_node::{self, ExecOnNodeManager};
use crate::managers::list_nodes::{self, ListNodesManager};
use crate::managers::ping_node::{self, PingNodeManager};
use crate::mcp::catalog::tool_catalog;
use crate::services::audit::AuditService;
use crate::services::center_client::{CenterApiClient, FleetApi};
use crate::services::config::load_config;
use crate::services::logger::Logger;
use crate::services::remote_exec::{RemoteExecutor, Ssh2Executor};
use crate::services::tool_executor::{ToolExecutor, ToolHandler};
use crate::services::validation::Validation;
use crate::utils::paths::resolve_config_path;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

pub struct App {
    pub logger: Logger,
    pub tool_executor: Arc<ToolExecutor>,
    pub audit_service: Arc<AuditService>,
}

impl App {
    fn validate_tool_wiring(
        handlers: &HashMap<String, Arc<dyn ToolHandler>>,
    ) -> Result<(), ToolError> {
        let mut missing: Vec<String> = tool_catalog()
            .iter()
            .filter(|tool| !handlers.contains_key(&tool.name))
            .map(|tool| tool.name.clone())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        missing.sort();
        Err(ToolError::internal("Tool wiring is incomplete").with_hint(
            "This is a server wiring bug: every tool in tool_catalog.json must have a handler."
                .to_string(),
        )
        .with_details(serde_json::json!({ "missing_tools": missing })))
    }

    /// Loads configuration and wires the real SSH and Center adapters.
    pub fn initialize(config_path: Option<&Path>) -> Result<Self, ToolError> {
        let logger = Logger::new("kaitu-ops");
        let config_path = resolve_config_path(config_path);
        let config = load_config(&config_path)?;
        logger.debug(
            "config loaded",
            Some(&serde_json::json!({
                "path": config_path.display().to_string(),
                "center": config.center.url,
                "ssh_user": config.ssh.user,
                "ssh_port": config.ssh.port,
            })),
        );

        let executor: Arc<dyn RemoteExecutor> =
            Arc::new(Ssh2Executor::new(logger.clone(), config.ssh.clone()));
        let api: Arc<dyn FleetApi> = Arc::new(CenterApiClient::new(logger.clone(), &config.center)?);
        let audit_service = Arc::new(AuditService::new(logger.clone()));
        Self::from_parts(logger, executor, api, audit_service)
    }

    /// Builds the app around already-constructed adapters.
    pub fn from_parts(
        logger: Logger,
        executor: Arc<dyn RemoteExecutor>,
        api: Arc<dyn FleetApi>,
        audit_service: Arc<AuditService>,
    ) -> Result<Self, ToolError> {
        let validation = Validation::new();

        let mut handlers: HashMap<String, Arc<dyn ToolHandler>> = HashMap::new();
        handlers.insert(
            exec_on_node::TOOL_NAME.to_string(),
            Arc::new(ExecOnNodeManager::new(
                logger.clone(),
                validation.clone(),
                executor.clone(),
                audit_service.clone(),
            )),
        );
        handlers.insert(
            ping_node::TOOL_NAME.to_string(),
            Arc::new(PingNodeManager::new(
                logger.clone(),
                validation.clone(),
                executor,
                audit_service.clone(),
            )),
        );
        handlers.insert(
            list_nodes::TOOL_NAME.to_string(),
            Arc::new(ListNodesManager::new(
                logger.clone(),
                validation.clone(),
                api.clone(),
                audit_service.clone(),
            )),
        );
        handlers.insert(
            delete_node::TOOL_NAME.to_string(),
            Arc::new(DeleteNodeManager::new(
                logger.clone(),
                validation,
                api,
                audit_service.clone(),
            )),
        );

        Self::validate_tool_wiring(&handlers)?;
        let tool_executor = Arc::new(ToolExecutor::new(logger.clone(), handlers));

        Ok(Self {
            logger,
            tool_executor,
            audit_service,
        })
    }
}
