pub mod audit;
pub mod center_client;
pub mod config;
pub mod logger;
pub mod remote_exec;
pub mod tool_executor;
pub mod validation;
