mod common;
use common::{quiet_logger, restore_env, temp_dir, ENV_LOCK};

use kaitu_ops::app::App;
use kaitu_ops::services::audit::{AuditRecord, AuditService};
use kaitu_ops::services::config::load_config;
use kaitu_ops::utils::paths::resolve_config_path;

const CONFIG_KEYS: [&str; 6] = [
    "KAITU_CENTER_URL",
    "KAITU_ACCESS_KEY",
    "KAITU_SSH_KEY",
    "KAITU_SSH_USER",
    "KAITU_SSH_PORT",
    "KAITU_OPS_CONFIG",
];

fn snapshot() -> Vec<(&'static str, Option<String>)> {
    CONFIG_KEYS
        .iter()
        .map(|key| (*key, std::env::var(key).ok()))
        .collect()
}

fn restore(saved: Vec<(&'static str, Option<String>)>) {
    for (key, value) in saved {
        restore_env(key, value);
    }
}

#[tokio::test]
async fn process_env_overrides_config_file() {
    let _guard = ENV_LOCK.lock().await;
    let saved = snapshot();
    for key in CONFIG_KEYS {
        std::env::remove_var(key);
    }

    let dir = temp_dir("config");
    let path = dir.join("config.toml");
    std::fs::write(
        &path,
        r#"
[center]
url = "https://api.example.com"
access_key = "file-key"

[ssh]
private_key_path = "/keys/id_ed25519"
user = "root"
port = 22
"#,
    )
    .expect("write config");

    std::env::set_var("KAITU_ACCESS_KEY", "env-key");
    std::env::set_var("KAITU_SSH_PORT", "2200");
    let config = load_config(&path).expect("config");
    assert_eq!(config.center.url, "https://api.example.com");
    assert_eq!(config.center.access_key, "env-key");
    assert_eq!(config.ssh.port, 2200);

    restore(saved);
}

#[tokio::test]
async fn config_path_env_is_used_when_no_flag() {
    let _guard = ENV_LOCK.lock().await;
    let saved = snapshot();

    std::env::set_var("KAITU_OPS_CONFIG", "/etc/kaitu-ops/config.toml");
    assert_eq!(
        resolve_config_path(None),
        std::path::PathBuf::from("/etc/kaitu-ops/config.toml")
    );
    assert_eq!(
        resolve_config_path(Some(std::path::Path::new("/tmp/explicit.toml"))),
        std::path::PathBuf::from("/tmp/explicit.toml")
    );

    restore(saved);
}

#[tokio::test]
async fn startup_fails_with_missing_fields_listed() {
    let _guard = ENV_LOCK.lock().await;
    let saved = snapshot();
    for key in CONFIG_KEYS {
        std::env::remove_var(key);
    }

    let dir = temp_dir("empty-config");
    let err = match App::initialize(Some(&dir.join("absent.toml"))) {
        Ok(_) => panic!("initialize must fail without config"),
        Err(err) => err,
    };
    assert!(err.message.contains("center.url (KAITU_CENTER_URL)"), "{}", err.message);
    assert!(err.message.contains("center.access_key"), "{}", err.message);

    restore(saved);
}

#[tokio::test]
async fn audit_dir_env_override_is_honored() {
    let _guard = ENV_LOCK.lock().await;
    let previous = std::env::var("KAITU_OPS_AUDIT_DIR").ok();

    let dir = temp_dir("audit-env").join("nested");
    std::env::set_var("KAITU_OPS_AUDIT_DIR", &dir);
    let audit = AuditService::new(quiet_logger());
    assert_eq!(audit.file_path(), dir.join("audit.log").as_path());

    audit
        .record(AuditRecord::new("ping_node").field("ip", "1.2.3.4").field("reachable", true))
        .await;
    let log = std::fs::read_to_string(dir.join("audit.log")).expect("audit log");
    assert!(log.ends_with("[ping_node] ip=\"1.2.3.4\" reachable=true\n"), "{}", log);
    assert_eq!(audit.stats().written, 1);

    restore_env("KAITU_OPS_AUDIT_DIR", previous);
}
