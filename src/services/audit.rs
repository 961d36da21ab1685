use crate::constants::audit::{FILE_NAME, MAX_LOG_BYTES};
use crate::services::logger::Logger;
use crate::utils::paths::resolve_audit_dir;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A field value in an audit line. Strings are quoted, the rest are not.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl fmt::Display for AuditValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Embedded quotes and newlines are written as-is; readers split on
            // the line, so a multi-line value spills into the next line.
            AuditValue::Str(text) => write!(f, "\"{}\"", text),
            AuditValue::Int(value) => write!(f, "{}", value),
            AuditValue::Bool(value) => write!(f, "{}", value),
        }
    }
}

impl From<&str> for AuditValue {
    fn from(value: &str) -> Self {
        AuditValue::Str(value.to_string())
    }
}

impl From<String> for AuditValue {
    fn from(value: String) -> Self {
        AuditValue::Str(value)
    }
}

impl From<&String> for AuditValue {
    fn from(value: &String) -> Self {
        AuditValue::Str(value.clone())
    }
}

impl From<i64> for AuditValue {
    fn from(value: i64) -> Self {
        AuditValue::Int(value)
    }
}

impl From<u64> for AuditValue {
    fn from(value: u64) -> Self {
        AuditValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<usize> for AuditValue {
    fn from(value: usize) -> Self {
        AuditValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<bool> for AuditValue {
    fn from(value: bool) -> Self {
        AuditValue::Bool(value)
    }
}

/// One audit line under construction: tool name plus ordered fields.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub tool: String,
    pub fields: Vec<(String, AuditValue)>,
}

impl AuditRecord {
    pub fn new(tool: &str) -> Self {
        Self {
            tool: tool.to_string(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, key: &str, value: impl Into<AuditValue>) -> Self {
        self.fields.push((key.to_string(), value.into()));
        self
    }

    /// `[timestamp] [tool] key=value ...` with a trailing newline.
    pub fn render(&self, timestamp: &str) -> String {
        let mut line = format!("[{}] [{}]", timestamp, self.tool);
        for (key, value) in &self.fields {
            line.push(' ');
            line.push_str(key);
            line.push('=');
            line.push_str(&value.to_string());
        }
        line.push('\n');
        line
    }
}

/// Filesystem operations the audit writer needs.
pub trait AuditFs: Send + Sync {
    fn create_dir_all(&self, dir: &Path) -> io::Result<()>;
    /// Current size in bytes; an error (e.g. the file does not exist yet)
    /// means rotation is skipped.
    fn file_size(&self, path: &Path) -> io::Result<u64>;
    fn truncate(&self, path: &Path) -> io::Result<()>;
    fn append(&self, path: &Path, line: &str) -> io::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StdAuditFs;

impl AuditFs for StdAuditFs {
    fn create_dir_all(&self, dir: &Path) -> io::Result<()> {
        std::fs::create_dir_all(dir)
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        std::fs::metadata(path).map(|meta| meta.len())
    }

    fn truncate(&self, path: &Path) -> io::Result<()> {
        std::fs::OpenOptions::new()
            .write(true)
            .open(path)
            .and_then(|file| file.set_len(0))
    }

    fn append(&self, path: &Path, line: &str) -> io::Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        file.write_all(line.as_bytes())
    }
}

#[derive(Debug, Default)]
struct AuditCounters {
    written: AtomicU64,
    failed: AtomicU64,
    rotations: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct AuditStats {
    pub written: u64,
    pub failed: u64,
    pub rotations: u64,
}

/// Append-only audit trail, rotated by truncation at 500 KiB.
///
/// Writes are best effort: [`AuditService::record`] never fails and never
/// panics. Concurrent callers are not serialized, so two writers racing at
/// the rotation threshold may both truncate, or one may truncate while the
/// other appends. Each line is self-contained, which makes that acceptable;
/// if ordering ever matters, put a queue in front of `write_line` rather
/// than locking the file.
#[derive(Clone)]
pub struct AuditService {
    logger: Logger,
    dir: PathBuf,
    file_path: PathBuf,
    fs: Arc<dyn AuditFs>,
    counters: Arc<AuditCounters>,
}

impl AuditService {
    pub fn new(logger: Logger) -> Self {
        Self::with_fs(logger, resolve_audit_dir(), Arc::new(StdAuditFs))
    }

    pub fn with_fs(logger: Logger, dir: PathBuf, fs: Arc<dyn AuditFs>) -> Self {
        let file_path = dir.join(FILE_NAME);
        Self {
            logger: logger.child("audit"),
            dir,
            file_path,
            fs,
            counters: Arc::new(AuditCounters::default()),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Records one tool outcome. Resolves once the write has been attempted.
    pub async fn record(&self, record: AuditRecord) {
        let timestamp =
            chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let line = record.render(&timestamp);
        let fs = self.fs.clone();
        let dir = self.dir.clone();
        let file_path = self.file_path.clone();

        let outcome =
            tokio::task::spawn_blocking(move || write_line(fs.as_ref(), &dir, &file_path, &line))
                .await;

        match outcome {
            Ok(Ok(rotated)) => {
                self.counters.written.fetch_add(1, Ordering::Relaxed);
                if rotated {
                    self.counters.rotations.fetch_add(1, Ordering::Relaxed);
                }
            }
            Ok(Err(err)) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                self.logger.debug(
                    "audit write dropped",
                    Some(&serde_json::json!({"tool": record.tool, "error": err.to_string()})),
                );
            }
            Err(_) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn stats(&self) -> AuditStats {
        AuditStats {
            written: self.counters.written.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            rotations: self.counters.rotations.load(Ordering::Relaxed),
        }
    }
}

/// Returns whether the file was truncated before the append.
fn write_line(fs: &dyn AuditFs, dir: &Path, file_path: &Path, line: &str) -> io::Result<bool> {
    fs.create_dir_all(dir)?;
    let mut rotated = false;
    if let Ok(size) = fs.file_size(file_path) {
        if size > MAX_LOG_BYTES && fs.truncate(file_path).is_ok() {
            rotated = true;
        }
    }
    fs.append(file_path, line)?;
    Ok(rotated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::managers::test_support::TempDir;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeFs {
        size: Option<u64>,
        fail_mkdir: bool,
        fail_append: bool,
        fail_truncate: bool,
        calls: Mutex<Vec<String>>,
        appended: Mutex<Vec<String>>,
    }

    impl FakeFs {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn denied(op: &str) -> io::Error {
            io::Error::new(io::ErrorKind::PermissionDenied, format!("{} denied", op))
        }
    }

    impl AuditFs for FakeFs {
        fn create_dir_all(&self, _dir: &Path) -> io::Result<()> {
            self.calls.lock().unwrap().push("mkdir".to_string());
            if self.fail_mkdir {
                return Err(Self::denied("mkdir"));
            }
            Ok(())
        }

        fn file_size(&self, _path: &Path) -> io::Result<u64> {
            self.calls.lock().unwrap().push("stat".to_string());
            self.size
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "ENOENT"))
        }

        fn truncate(&self, _path: &Path) -> io::Result<()> {
            self.calls.lock().unwrap().push("truncate".to_string());
            if self.fail_truncate {
                return Err(Self::denied("truncate"));
            }
            Ok(())
        }

        fn append(&self, _path: &Path, line: &str) -> io::Result<()> {
            self.calls.lock().unwrap().push("append".to_string());
            if self.fail_append {
                return Err(Self::denied("append"));
            }
            self.appended.lock().unwrap().push(line.to_string());
            Ok(())
        }
    }

    fn service(fs: Arc<FakeFs>) -> AuditService {
        AuditService::with_fs(
            Logger::new("test"),
            PathBuf::from("/virtual/.kaitu-ops"),
            fs,
        )
    }

    #[test]
    fn render_quotes_strings_only() {
        let line = AuditRecord::new("ping_node")
            .field("ip", "1.2.3.4")
            .field("latencyMs", 45u64)
            .field("reachable", true)
            .render("2026-01-01T00:00:00.000Z");
        assert_eq!(
            line,
            "[2026-01-01T00:00:00.000Z] [ping_node] ip=\"1.2.3.4\" latencyMs=45 reachable=true\n"
        );
    }

    #[test]
    fn render_keeps_embedded_quotes_unescaped() {
        let line = AuditRecord::new("exec_on_node")
            .field("command", "echo \"hi\"")
            .render("ts");
        assert_eq!(line, "[ts] [exec_on_node] command=\"echo \"hi\"\"\n");
    }

    #[test]
    fn render_without_fields() {
        assert_eq!(AuditRecord::new("list_nodes").render("ts"), "[ts] [list_nodes]\n");
    }

    #[tokio::test]
    async fn creates_dir_and_appends_when_file_missing() {
        let fs = Arc::new(FakeFs::default());
        let audit = service(fs.clone());
        audit
            .record(AuditRecord::new("exec_on_node").field("ip", "1.2.3.4").field("status", "success"))
            .await;

        assert_eq!(fs.calls(), vec!["mkdir", "stat", "append"]);
        let appended = fs.appended.lock().unwrap().clone();
        assert_eq!(appended.len(), 1);
        let line = &appended[0];
        assert!(line.starts_with('['));
        assert!(line.contains("] [exec_on_node] ip=\"1.2.3.4\" status=\"success\""));
        assert!(line.ends_with('\n'));
        assert_eq!(audit.stats().written, 1);
    }

    #[tokio::test]
    async fn truncates_before_append_when_over_limit() {
        let fs = Arc::new(FakeFs {
            size: Some(600 * 1024),
            ..FakeFs::default()
        });
        let audit = service(fs.clone());
        audit.record(AuditRecord::new("t").field("key", "val")).await;

        assert_eq!(fs.calls(), vec!["mkdir", "stat", "truncate", "append"]);
        assert_eq!(audit.stats().rotations, 1);
    }

    #[tokio::test]
    async fn does_not_truncate_under_limit() {
        let fs = Arc::new(FakeFs {
            size: Some(100 * 1024),
            ..FakeFs::default()
        });
        let audit = service(fs.clone());
        audit.record(AuditRecord::new("t").field("key", "val")).await;

        assert!(!fs.calls().contains(&"truncate".to_string()));
        assert_eq!(audit.stats().rotations, 0);
    }

    #[tokio::test]
    async fn failing_mkdir_is_swallowed() {
        let fs = Arc::new(FakeFs {
            fail_mkdir: true,
            ..FakeFs::default()
        });
        let audit = service(fs.clone());
        audit.record(AuditRecord::new("t")).await;

        assert_eq!(fs.calls(), vec!["mkdir"]);
        assert_eq!(audit.stats().failed, 1);
    }

    #[tokio::test]
    async fn failing_truncate_and_append_are_swallowed() {
        let fs = Arc::new(FakeFs {
            size: Some(MAX_LOG_BYTES + 1),
            fail_truncate: true,
            fail_append: true,
            ..FakeFs::default()
        });
        let audit = service(fs.clone());
        audit.record(AuditRecord::new("t").field("n", 1u64)).await;

        assert_eq!(fs.calls(), vec!["mkdir", "stat", "truncate", "append"]);
        let stats = audit.stats();
        assert_eq!((stats.written, stats.failed), (0, 1));
    }

    #[tokio::test]
    async fn std_fs_writes_lines_to_disk() {
        let scratch = TempDir::new("audit");
        let dir = scratch.join("nested");
        let audit = AuditService::with_fs(Logger::new("test"), dir, Arc::new(StdAuditFs));

        audit.record(AuditRecord::new("list_nodes").field("count", 2usize)).await;
        audit.record(AuditRecord::new("delete_node").field("deleted", false)).await;

        let text = std::fs::read_to_string(audit.file_path()).expect("audit file");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[list_nodes] count=2"));
        assert!(lines[1].ends_with("[delete_node] deleted=false"));
    }
}
