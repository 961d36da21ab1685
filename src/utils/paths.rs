use crate::constants::audit::DIR_NAME;
use std::env;
use std::path::{Path, PathBuf};

fn normalize_env_path(value: Option<String>) -> Option<PathBuf> {
    let raw = value?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(expand_home_path(trimmed))
}

pub fn resolve_home_dir() -> Option<PathBuf> {
    env::var("HOME")
        .ok()
        .filter(|home| !home.trim().is_empty())
        .map(PathBuf::from)
}

/// `~/.kaitu-ops`, or `KAITU_OPS_AUDIT_DIR` when set.
pub fn resolve_ops_dir() -> PathBuf {
    resolve_home_dir()
        .unwrap_or_else(|| env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
        .join(DIR_NAME)
}

pub fn resolve_audit_dir() -> PathBuf {
    normalize_env_path(env::var("KAITU_OPS_AUDIT_DIR").ok()).unwrap_or_else(resolve_ops_dir)
}

pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return expand_home_path(path);
    }
    normalize_env_path(env::var("KAITU_OPS_CONFIG").ok())
        .unwrap_or_else(|| resolve_ops_dir().join("config.toml"))
}

/// Candidate private keys tried when neither env nor config names one.
pub fn default_private_key_candidates() -> Vec<PathBuf> {
    let Some(home) = resolve_home_dir() else {
        return Vec::new();
    };
    let ssh_dir = home.join(".ssh");
    vec![ssh_dir.join("id_ed25519"), ssh_dir.join("id_rsa")]
}

pub fn expand_home_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let Some(text) = path.to_str() else {
        return path.to_path_buf();
    };
    let Some(home) = resolve_home_dir() else {
        return path.to_path_buf();
    };
    if text == "~" {
        return home;
    }
    match text.strip_prefix("~/") {
        Some(rest) => home.join(rest),
        None => path.to_path_buf(),
    }
}
