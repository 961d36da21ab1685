pub mod network {
    pub const TIMEOUT_SSH_PING_MS: u64 = 5_000;
    pub const TIMEOUT_SSH_CONNECT_MS: u64 = 10_000;
    pub const TIMEOUT_API_REQUEST_MS: u64 = 30_000;
    pub const EXEC_POLL_INTERVAL_MS: u64 = 20;
}

pub mod exec {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
    pub const DEFAULT_SCRIPT_SHELL: &str = "bash -s";
    /// exitCode reported when the remote command did not finish in time.
    pub const TIMEOUT_EXIT_CODE: i64 = -1;
}

pub mod limits {
    pub const MAX_STDOUT_CHARS: usize = 10_000;
    pub const MAX_STDERR_CHARS: usize = 2_000;
    pub const AUDIT_COMMAND_CHARS: usize = 200;
}

pub mod audit {
    pub const DIR_NAME: &str = ".kaitu-ops";
    pub const FILE_NAME: &str = "audit.log";
    pub const MAX_LOG_BYTES: u64 = 500 * 1024;
}

pub mod center {
    pub const BATCH_MATRIX_PATH: &str = "/app/nodes/batch-matrix";
    pub const NODES_PATH: &str = "/app/nodes";
    pub const ACCESS_KEY_HEADER: &str = "X-Access-Key";
    pub const SUCCESS_CODE: i64 = 0;
}
