//! Env-file secret provider
//!
//! Reads `KEY=VALUE` pairs from a per-site dotenv file. Field labels map to
//! the conventional variable names below; a variable missing from the file
//! falls back to the process environment.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::credentials::{
    SecretFields, FIELD_LOCAL_DEST_DIR, FIELD_PASSWORD, FIELD_PORT, FIELD_REMOTE_BACKUP_DIR,
    FIELD_SERVER, FIELD_USER,
};
use crate::error::{Error, Result};
use crate::infra::secrets::SecretProvider;

/// Variable name holding each field label
pub fn env_name(label: &str) -> Option<&'static str> {
    match label {
        FIELD_USER => Some("REMOTE_USER"),
        FIELD_SERVER => Some("REMOTE_HOST"),
        FIELD_PORT => Some("REMOTE_SSH_PORT"),
        FIELD_PASSWORD => Some("REMOTE_PASSWORD"),
        FIELD_REMOTE_BACKUP_DIR => Some("REMOTE_WP_CONTENT"),
        FIELD_LOCAL_DEST_DIR => Some("LOCAL_DEST_DIR"),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct EnvFileProvider {
    path: PathBuf,
}

impl EnvFileProvider {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_file(&self) -> Result<HashMap<String, String>> {
        if !self.path.is_file() {
            debug!("No env file at {}", self.path.display());
            return Ok(HashMap::new());
        }

        let iter = dotenvy::from_path_iter(&self.path).map_err(|e| {
            Error::SecretProvider(format!("cannot read {}: {}", self.path.display(), e))
        })?;

        iter.map(|entry| {
            entry.map_err(|e| {
                Error::SecretProvider(format!("cannot parse {}: {}", self.path.display(), e))
            })
        })
        .collect()
    }
}

#[async_trait]
impl SecretProvider for EnvFileProvider {
    async fn fetch(&self, fields: &[String]) -> Result<SecretFields> {
        let file_vars = self.read_file()?;

        let mut resolved = SecretFields::new();
        for label in fields {
            let Some(name) = env_name(label) else {
                continue;
            };
            let value = file_vars
                .get(name)
                .cloned()
                .or_else(|| std::env::var(name).ok());
            if let Some(value) = value {
                resolved.insert(label.clone(), value);
            }
        }

        if resolved.is_empty() {
            return Err(Error::SecretProvider(format!(
                "no site variables found in {} or the environment",
                self.path.display()
            )));
        }
        Ok(resolved)
    }
}
