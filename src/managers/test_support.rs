use crate::errors::ToolError;
use crate::services::audit::{AuditFs, AuditService};
use crate::services::center_client::{FleetApi, RequestOptions};
use crate::services::logger::{LogLevel, Logger};
use crate::services::remote_exec::{ExecOutput, RemoteExecutor, SshFailure};
use async_trait::async_trait;
use serde_json::Value;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub fn quiet_logger() -> Logger {
    Logger::new("test").with_level(LogLevel::Error)
}

/// Unique scratch directory, removed on drop.
pub struct TempDir(PathBuf);

impl TempDir {
    pub fn new(label: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("kaitu-ops-{}-{}", label, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        Self(dir)
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.0.join(name)
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

/// Keeps appended audit lines in memory.
#[derive(Default)]
pub struct MemoryAuditFs {
    lines: Mutex<Vec<String>>,
}

impl MemoryAuditFs {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("lines").clone()
    }
}

impl AuditFs for MemoryAuditFs {
    fn create_dir_all(&self, _dir: &Path) -> io::Result<()> {
        Ok(())
    }

    fn file_size(&self, _path: &Path) -> io::Result<u64> {
        Err(io::Error::from(io::ErrorKind::NotFound))
    }

    fn truncate(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    fn append(&self, _path: &Path, line: &str) -> io::Result<()> {
        self.lines.lock().expect("lines").push(line.to_string());
        Ok(())
    }
}

pub fn memory_audit() -> (Arc<AuditService>, Arc<MemoryAuditFs>) {
    let fs = Arc::new(MemoryAuditFs::default());
    let service = AuditService::with_fs(quiet_logger(), PathBuf::from("/audit"), fs.clone());
    (Arc::new(service), fs)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCall {
    pub host: String,
    pub command: String,
    pub stdin: Option<String>,
    pub timeout_ms: u64,
}

/// Replays canned results and records what it was asked to run.
pub struct ScriptedExecutor {
    probe: Result<u64, SshFailure>,
    exec: Result<ExecOutput, SshFailure>,
    calls: Mutex<Vec<ExecCall>>,
}

impl ScriptedExecutor {
    pub fn exec_result(exec: Result<ExecOutput, SshFailure>) -> Self {
        Self {
            probe: Ok(0),
            exec,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn probe_result(probe: Result<u64, SshFailure>) -> Self {
        Self {
            probe,
            exec: Ok(ExecOutput::default()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<ExecCall> {
        self.calls.lock().expect("calls").clone()
    }

    fn record(&self, host: &str, command: &str, stdin: Option<String>, timeout_ms: u64) {
        self.calls.lock().expect("calls").push(ExecCall {
            host: host.to_string(),
            command: command.to_string(),
            stdin,
            timeout_ms,
        });
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn probe(&self, host: &str) -> Result<u64, SshFailure> {
        self.record(host, "", None, 0);
        self.probe.clone()
    }

    async fn exec(
        &self,
        host: &str,
        command: &str,
        timeout_ms: u64,
    ) -> Result<ExecOutput, SshFailure> {
        self.record(host, command, None, timeout_ms);
        self.exec.clone()
    }

    async fn exec_with_stdin(
        &self,
        host: &str,
        command: &str,
        stdin: String,
        timeout_ms: u64,
    ) -> Result<ExecOutput, SshFailure> {
        self.record(host, command, Some(stdin), timeout_ms);
        self.exec.clone()
    }
}

/// Answers every request with the same canned value.
pub struct ScriptedFleet {
    response: Result<Value, ToolError>,
    requests: Mutex<Vec<(String, String)>>,
}

impl ScriptedFleet {
    pub fn new(response: Result<Value, ToolError>) -> Self {
        Self {
            response,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// `(method, path)` pairs in call order.
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().expect("requests").clone()
    }
}

#[async_trait]
impl FleetApi for ScriptedFleet {
    async fn request(&self, path: &str, options: RequestOptions) -> Result<Value, ToolError> {
        self.requests
            .lock()
            .expect("requests")
            .push((options.method.to_string(), path.to_string()));
        self.response.clone()
    }
}
