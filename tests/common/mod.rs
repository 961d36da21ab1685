#![allow(dead_code)]

use async_trait::async_trait;
use kaitu_ops::app::App;
use kaitu_ops::errors::ToolError;
use kaitu_ops::services::audit::{AuditService, StdAuditFs};
use kaitu_ops::services::center_client::{FleetApi, RequestOptions};
use kaitu_ops::services::logger::{LogLevel, Logger};
use kaitu_ops::services::remote_exec::{ExecOutput, RemoteExecutor, SshFailure};
use once_cell::sync::Lazy;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

pub static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub fn restore_env(key: &str, previous: Option<String>) {
    match previous {
        Some(value) => std::env::set_var(key, value),
        None => std::env::remove_var(key),
    }
}

pub fn temp_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("kaitu-ops-{}-{}", label, uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

pub fn quiet_logger() -> Logger {
    Logger::new("test").with_level(LogLevel::Error)
}

pub struct FakeExecutor {
    pub probe: Result<u64, SshFailure>,
    pub exec: Result<ExecOutput, SshFailure>,
}

#[async_trait]
impl RemoteExecutor for FakeExecutor {
    async fn probe(&self, _host: &str) -> Result<u64, SshFailure> {
        self.probe.clone()
    }

    async fn exec(
        &self,
        _host: &str,
        _command: &str,
        _timeout_ms: u64,
    ) -> Result<ExecOutput, SshFailure> {
        self.exec.clone()
    }

    async fn exec_with_stdin(
        &self,
        _host: &str,
        _command: &str,
        _stdin: String,
        _timeout_ms: u64,
    ) -> Result<ExecOutput, SshFailure> {
        self.exec.clone()
    }
}

/// Routes by HTTP method: GET answers `list`, DELETE answers `delete`.
pub struct FakeFleet {
    pub list: Result<Value, ToolError>,
    pub delete: Result<Value, ToolError>,
}

#[async_trait]
impl FleetApi for FakeFleet {
    async fn request(&self, _path: &str, options: RequestOptions) -> Result<Value, ToolError> {
        if options.method == reqwest::Method::DELETE {
            self.delete.clone()
        } else {
            self.list.clone()
        }
    }
}

/// App over fakes, auditing into a fresh temp directory.
pub fn fake_app(executor: FakeExecutor, fleet: FakeFleet) -> (App, PathBuf) {
    let audit_dir = temp_dir("audit");
    let audit = Arc::new(AuditService::with_fs(
        quiet_logger(),
        audit_dir.clone(),
        Arc::new(StdAuditFs),
    ));
    let app = App::from_parts(quiet_logger(), Arc::new(executor), Arc::new(fleet), audit)
        .expect("wiring");
    (app, audit_dir.join("audit.log"))
}
