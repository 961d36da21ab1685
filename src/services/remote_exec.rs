use crate::constants::exec::TIMEOUT_EXIT_CODE;
use crate::constants::network::{
    EXEC_POLL_INTERVAL_MS, TIMEOUT_SSH_CONNECT_MS, TIMEOUT_SSH_PING_MS,
};
use crate::services::config::SshConfig;
use crate::services::logger::Logger;
use async_trait::async_trait;
use ssh2::Session;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use thiserror::Error;

/// libssh2 error code for a blocking call that hit the session timeout.
const LIBSSH2_ERROR_TIMEOUT: i32 = -9;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SshFailure {
    #[error("Authentication failed for {host}")]
    Auth { host: String },
    #[error("Connection refused to {host}:{port}")]
    Refused { host: String, port: u16 },
    #[error("Connection timed out after {ms}ms to {host}:{port}")]
    Timeout { host: String, port: u16, ms: u64 },
    #[error("SSH connection error: {0}")]
    Connection(String),
    #[error("Failed to execute command: {0}")]
    Exec(String),
}

/// Raw result of a finished (or abandoned) remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
}

impl ExecOutput {
    pub fn timed_out(&self) -> bool {
        self.exit_code == TIMEOUT_EXIT_CODE
    }
}

/// Remote command execution on a fleet node, addressed by IP.
///
/// Transport failures are `Err`; a command that ran and failed is an `Ok`
/// with a non-zero exit code. A command that outlives `timeout_ms` is an
/// `Ok` carrying the partial output and exit code -1.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Connects and authenticates, then disconnects. Returns elapsed ms.
    async fn probe(&self, host: &str) -> Result<u64, SshFailure>;

    async fn exec(
        &self,
        host: &str,
        command: &str,
        timeout_ms: u64,
    ) -> Result<ExecOutput, SshFailure>;

    /// Like [`RemoteExecutor::exec`] but writes `stdin` to the remote
    /// process and closes it before reading output to completion.
    async fn exec_with_stdin(
        &self,
        host: &str,
        command: &str,
        stdin: String,
        timeout_ms: u64,
    ) -> Result<ExecOutput, SshFailure>;
}

/// [`RemoteExecutor`] backed by libssh2. Each call opens its own session.
#[derive(Clone)]
pub struct Ssh2Executor {
    logger: Logger,
    config: SshConfig,
}

impl Ssh2Executor {
    pub fn new(logger: Logger, config: SshConfig) -> Self {
        Self {
            logger: logger.child("ssh"),
            config,
        }
    }

    async fn run(
        &self,
        host: &str,
        command: &str,
        stdin: Option<String>,
        timeout_ms: u64,
    ) -> Result<ExecOutput, SshFailure> {
        let config = self.config.clone();
        let host_owned = host.to_string();
        let command = command.to_string();
        self.logger.debug(
            "exec",
            Some(&serde_json::json!({
                "host": host,
                "timeout_ms": timeout_ms,
                "stdin": stdin.is_some(),
            })),
        );
        let result = tokio::task::spawn_blocking(move || {
            exec_blocking(&config, &host_owned, &command, stdin, timeout_ms)
        })
        .await
        .map_err(|err| SshFailure::Exec(format!("worker failed: {}", err)))?;
        if let Err(err) = &result {
            self.logger.warn(
                "exec failed",
                Some(&serde_json::json!({ "host": host, "error": err.to_string() })),
            );
        }
        result
    }
}

#[async_trait]
impl RemoteExecutor for Ssh2Executor {
    async fn probe(&self, host: &str) -> Result<u64, SshFailure> {
        let config = self.config.clone();
        let host_owned = host.to_string();
        let started = Instant::now();
        let work = tokio::task::spawn_blocking(move || {
            let session = connect_session(&config, &host_owned, TIMEOUT_SSH_PING_MS)?;
            let _ = session.disconnect(None, "probe", None);
            Ok::<(), SshFailure>(())
        });

        match tokio::time::timeout(Duration::from_millis(TIMEOUT_SSH_PING_MS), work).await {
            Ok(Ok(Ok(()))) => Ok(started.elapsed().as_millis() as u64),
            Ok(Ok(Err(err))) => Err(err),
            Ok(Err(err)) => Err(SshFailure::Connection(format!("worker failed: {}", err))),
            Err(_) => Err(SshFailure::Timeout {
                host: host.to_string(),
                port: self.config.port,
                ms: TIMEOUT_SSH_PING_MS,
            }),
        }
    }

    async fn exec(
        &self,
        host: &str,
        command: &str,
        timeout_ms: u64,
    ) -> Result<ExecOutput, SshFailure> {
        self.run(host, command, None, timeout_ms).await
    }

    async fn exec_with_stdin(
        &self,
        host: &str,
        command: &str,
        stdin: String,
        timeout_ms: u64,
    ) -> Result<ExecOutput, SshFailure> {
        self.run(host, command, Some(stdin), timeout_ms).await
    }
}

fn timeout_failure(config: &SshConfig, host: &str, ms: u64) -> SshFailure {
    SshFailure::Timeout {
        host: host.to_string(),
        port: config.port,
        ms,
    }
}

fn is_session_timeout(err: &ssh2::Error) -> bool {
    matches!(err.code(), ssh2::ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT))
}

fn connect_session(
    config: &SshConfig,
    host: &str,
    connect_timeout_ms: u64,
) -> Result<Session, SshFailure> {
    let addr = (host, config.port)
        .to_socket_addrs()
        .map_err(|err| SshFailure::Connection(format!("cannot resolve {}: {}", host, err)))?
        .next()
        .ok_or_else(|| SshFailure::Connection(format!("no address for {}", host)))?;

    let tcp = TcpStream::connect_timeout(&addr, Duration::from_millis(connect_timeout_ms))
        .map_err(|err| match err.kind() {
            ErrorKind::ConnectionRefused => SshFailure::Refused {
                host: host.to_string(),
                port: config.port,
            },
            ErrorKind::TimedOut | ErrorKind::WouldBlock => {
                timeout_failure(config, host, connect_timeout_ms)
            }
            _ => SshFailure::Connection(err.to_string()),
        })?;

    let mut session =
        Session::new().map_err(|err| SshFailure::Connection(err.message().to_string()))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(u32::try_from(connect_timeout_ms).unwrap_or(u32::MAX));
    session.handshake().map_err(|err| {
        if is_session_timeout(&err) {
            timeout_failure(config, host, connect_timeout_ms)
        } else {
            SshFailure::Connection(err.message().to_string())
        }
    })?;

    session
        .userauth_pubkey_file(&config.user, None, &config.private_key_path, None)
        .map_err(|err| {
            if is_session_timeout(&err) {
                timeout_failure(config, host, connect_timeout_ms)
            } else {
                SshFailure::Auth {
                    host: host.to_string(),
                }
            }
        })?;
    if !session.authenticated() {
        return Err(SshFailure::Auth {
            host: host.to_string(),
        });
    }
    session.set_timeout(0);
    Ok(session)
}

fn exec_blocking(
    config: &SshConfig,
    host: &str,
    command: &str,
    stdin: Option<String>,
    timeout_ms: u64,
) -> Result<ExecOutput, SshFailure> {
    let session = connect_session(config, host, TIMEOUT_SSH_CONNECT_MS)?;
    let mut channel = session
        .channel_session()
        .map_err(|err| SshFailure::Exec(err.message().to_string()))?;
    channel
        .exec(command)
        .map_err(|err| SshFailure::Exec(err.message().to_string()))?;
    session.set_blocking(false);

    let stdin_bytes = stdin.map(String::into_bytes).unwrap_or_default();
    let mut stdin_offset = 0usize;
    let mut stdin_done = stdin_bytes.is_empty();
    let mut eof_sent = false;

    let mut stdout: Vec<u8> = Vec::new();
    let mut stderr: Vec<u8> = Vec::new();
    let mut stderr_stream = channel.stderr();
    let started = Instant::now();
    let mut timed_out = false;

    loop {
        let mut progressed = false;
        let mut buf = [0u8; 8192];

        if !stdin_done {
            match channel.write(&stdin_bytes[stdin_offset..]) {
                Ok(n) if n > 0 => {
                    stdin_offset = std::cmp::min(stdin_offset + n, stdin_bytes.len());
                    progressed = true;
                    stdin_done = stdin_offset >= stdin_bytes.len();
                }
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::WouldBlock => {}
                Err(_) => stdin_done = true,
            }
        }
        if stdin_done && !eof_sent {
            match channel.send_eof() {
                Ok(()) => eof_sent = true,
                Err(err) => {
                    let io_err: std::io::Error = err.into();
                    if io_err.kind() != ErrorKind::WouldBlock {
                        eof_sent = true;
                    }
                }
            }
        }

        match channel.read(&mut buf) {
            Ok(n) if n > 0 => {
                stdout.extend_from_slice(&buf[..n]);
                progressed = true;
            }
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::WouldBlock => {}
            Err(err) => return Err(SshFailure::Exec(format!("stdout read failed: {}", err))),
        }
        match stderr_stream.read(&mut buf) {
            Ok(n) if n > 0 => {
                stderr.extend_from_slice(&buf[..n]);
                progressed = true;
            }
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::WouldBlock => {}
            Err(err) => return Err(SshFailure::Exec(format!("stderr read failed: {}", err))),
        }

        if channel.eof() {
            break;
        }
        if started.elapsed().as_millis() as u64 > timeout_ms {
            timed_out = true;
            break;
        }
        if !progressed {
            std::thread::sleep(Duration::from_millis(EXEC_POLL_INTERVAL_MS));
        }
    }

    if timed_out {
        let _ = channel.close();
        let _ = session.disconnect(None, "timeout", None);
        let mut stderr = String::from_utf8_lossy(&stderr).into_owned();
        if !stderr.is_empty() && !stderr.ends_with('\n') {
            stderr.push('\n');
        }
        stderr.push_str(&format!("Command timed out after {}ms", timeout_ms));
        return Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr,
            exit_code: TIMEOUT_EXIT_CODE,
        });
    }

    session.set_blocking(true);
    let _ = channel.read_to_end(&mut stdout);
    let _ = channel.stderr().read_to_end(&mut stderr);
    let _ = channel.wait_close();
    let exit_code = i64::from(channel.exit_status().unwrap_or(0));
    let _ = session.disconnect(None, "done", None);

    Ok(ExecOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code,
    })
}
