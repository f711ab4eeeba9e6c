//! Tool configuration
//!
//! Layered: optional `hosting-utilities.toml` in the working directory, then
//! `HOSTING_*` environment variables (e.g. `HOSTING_SSH_BINARY`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;

/// Config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "hosting-utilities.toml";

/// Where site credentials come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecretBackend {
    /// 1Password CLI (`op`)
    Op,
    /// `<environments_dir>/.<site>.env` files
    EnvFile,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Tool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Credential source
    #[serde(default = "default_secret_backend")]
    pub secret_backend: SecretBackend,

    /// 1Password CLI executable
    #[serde(default = "default_op_binary")]
    pub op_binary: String,

    /// 1Password vault holding the site item
    #[serde(default)]
    pub op_vault_name: Option<String>,

    /// 1Password item holding the site fields
    #[serde(default)]
    pub op_item_name: Option<String>,

    /// Directory of per-site `.env` files (env-file backend)
    #[serde(default = "default_environments_dir")]
    pub environments_dir: PathBuf,

    /// SSH client executable
    #[serde(default = "default_ssh_binary")]
    pub ssh_binary: String,

    /// Seconds to wait for the password prompt (0 = no limit)
    #[serde(default = "default_prompt_timeout_secs")]
    pub prompt_timeout_secs: u64,

    /// Seconds the transfer may go silent after the password is sent
    /// (0 = no limit)
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Milliseconds a finished transfer may take to exit before it is killed
    #[serde(default = "default_exit_grace_ms")]
    pub exit_grace_ms: u64,

    /// Log format: "text" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

fn default_secret_backend() -> SecretBackend {
    SecretBackend::Op
}

fn default_op_binary() -> String {
    "op".to_string()
}

fn default_environments_dir() -> PathBuf {
    PathBuf::from("environments")
}

fn default_ssh_binary() -> String {
    "ssh".to_string()
}

fn default_prompt_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    300
}

fn default_exit_grace_ms() -> u64 {
    5000
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl Config {
    /// Load configuration from the default file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    /// Load configuration from `path` (if present) and environment variables
    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.to_path_buf()).required(false))
            .add_source(config::Environment::with_prefix("HOSTING").try_parsing(true))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn prompt_timeout(&self) -> Duration {
        Duration::from_secs(self.prompt_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn exit_grace(&self) -> Duration {
        Duration::from_millis(self.exit_grace_ms)
    }

    /// Per-site env file for the env-file backend
    pub fn site_env_file(&self, site_name: &str) -> PathBuf {
        self.environments_dir.join(format!(".{}.env", site_name))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            secret_backend: default_secret_backend(),
            op_binary: default_op_binary(),
            op_vault_name: None,
            op_item_name: None,
            environments_dir: default_environments_dir(),
            ssh_binary: default_ssh_binary(),
            prompt_timeout_secs: default_prompt_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            exit_grace_ms: default_exit_grace_ms(),
            log_format: default_log_format(),
        }
    }
}
