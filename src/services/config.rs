use crate::errors::ToolError;
use crate::utils::paths::{default_private_key_candidates, expand_home_path};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CenterConfig {
    pub url: String,
    pub access_key: String,
}

/// Host-independent SSH settings shared by every node connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshConfig {
    pub private_key_path: PathBuf,
    pub user: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpsConfig {
    pub center: CenterConfig,
    pub ssh: SshConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    center: FileCenter,
    ssh: FileSsh,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileCenter {
    url: Option<String>,
    access_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileSsh {
    private_key_path: Option<String>,
    user: Option<String>,
    port: Option<u16>,
}

/// Environment lookup, injectable so tests need not touch the process env.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;
}

impl<F> EnvSource for F
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        self(key)
    }
}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn load_config(path: &Path) -> Result<OpsConfig, ToolError> {
    load_config_with(path, &process_env)
}

/// Environment beats the TOML file; the key path falls back to the usual
/// `~/.ssh` keys. All missing fields are reported together.
pub fn load_config_with(path: &Path, env: &dyn EnvSource) -> Result<OpsConfig, ToolError> {
    let file = read_file_config(path)?;

    let url = env.get("KAITU_CENTER_URL").or(file.center.url);
    let access_key = env.get("KAITU_ACCESS_KEY").or(file.center.access_key);
    let key_path = env
        .get("KAITU_SSH_KEY")
        .or(file.ssh.private_key_path)
        .map(expand_home_path)
        .or_else(|| {
            default_private_key_candidates()
                .into_iter()
                .find(|candidate| candidate.is_file())
        });
    let user = env.get("KAITU_SSH_USER").or(file.ssh.user);
    let port = match env.get("KAITU_SSH_PORT") {
        Some(raw) => Some(raw.parse::<u16>().map_err(|_| {
            ToolError::invalid_params(format!("KAITU_SSH_PORT must be a port number, got {}", raw))
        })?),
        None => file.ssh.port,
    };

    let mut missing = Vec::new();
    if url.is_none() {
        missing.push("center.url (KAITU_CENTER_URL)");
    }
    if access_key.is_none() {
        missing.push("center.access_key (KAITU_ACCESS_KEY)");
    }
    if key_path.is_none() {
        missing.push("ssh.private_key_path (KAITU_SSH_KEY)");
    }
    if user.is_none() {
        missing.push("ssh.user (KAITU_SSH_USER)");
    }
    if port.is_none() {
        missing.push("ssh.port (KAITU_SSH_PORT)");
    }

    match (url, access_key, key_path, user, port) {
        (Some(url), Some(access_key), Some(private_key_path), Some(user), Some(port))
            if missing.is_empty() =>
        {
            Ok(OpsConfig {
                center: CenterConfig { url, access_key },
                ssh: SshConfig {
                    private_key_path,
                    user,
                    port,
                },
            })
        }
        _ => Err(ToolError::invalid_params(format!(
            "Config is missing required fields: {}",
            missing.join(", ")
        ))
        .with_hint(format!(
            "Set them in {} or via environment variables.",
            path.display()
        ))),
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ToolError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(FileConfig::default())
        }
        Err(err) => {
            return Err(ToolError::internal(format!(
                "Failed to read config {}: {}",
                path.display(),
                err
            )))
        }
    };
    toml::from_str(&raw).map_err(|err| {
        ToolError::invalid_params(format!("Invalid config {}: {}", path.display(), err))
    })
}
