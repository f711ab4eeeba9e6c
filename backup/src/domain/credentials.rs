//! Site credentials as fetched from a secret provider

use std::collections::HashMap;
use std::fmt;

use secrecy::{ExposeSecret, SecretString};

use crate::error::{Error, Result};

/// Field labels as stored in the vault item
pub const FIELD_USER: &str = "user";
pub const FIELD_SERVER: &str = "server";
pub const FIELD_PORT: &str = "port";
pub const FIELD_PASSWORD: &str = "password";
pub const FIELD_REMOTE_BACKUP_DIR: &str = "remote_backup_dir";
pub const FIELD_LOCAL_DEST_DIR: &str = "local_dest_dir";

/// Every field a backup asks for
pub const BACKUP_FIELDS: [&str; 6] = [
    FIELD_USER,
    FIELD_SERVER,
    FIELD_PORT,
    FIELD_PASSWORD,
    FIELD_REMOTE_BACKUP_DIR,
    FIELD_LOCAL_DEST_DIR,
];

/// Fields without which a backup cannot start
pub const REQUIRED_FIELDS: [&str; 5] = [
    FIELD_USER,
    FIELD_SERVER,
    FIELD_PORT,
    FIELD_REMOTE_BACKUP_DIR,
    FIELD_LOCAL_DEST_DIR,
];

/// Field label -> value mapping returned by a secret provider
#[derive(Default)]
pub struct SecretFields {
    values: HashMap<String, SecretString>,
}

impl SecretFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>, value: impl Into<String>) {
        self.values
            .insert(label.into(), SecretString::from(value.into()));
    }

    pub fn get(&self, label: &str) -> Option<&SecretString> {
        self.values.get(label)
    }

    /// Non-empty value of `label`
    pub fn require(&self, label: &str) -> Result<&SecretString> {
        self.get(label)
            .filter(|value| !value.expose_secret().is_empty())
            .ok_or_else(|| Error::MissingSecretField(label.to_string()))
    }

    /// Fail listing every absent or empty label
    pub fn require_all(&self, labels: &[&str]) -> Result<()> {
        let missing: Vec<&str> = labels
            .iter()
            .copied()
            .filter(|label| self.require(label).is_err())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::MissingSecretField(missing.join(", ")))
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for SecretFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut labels: Vec<&String> = self.values.keys().collect();
        labels.sort();
        f.debug_struct("SecretFields").field("labels", &labels).finish()
    }
}

/// Connection details for one site
pub struct SiteCredentials {
    pub user: String,
    pub host: String,
    pub port: u16,
    /// Absent or empty means key-based (non-interactive) SSH
    pub password: Option<SecretString>,
    pub remote_dir: String,
    pub local_dest_dir: String,
}

impl SiteCredentials {
    pub fn from_fields(fields: &SecretFields) -> Result<Self> {
        fields.require_all(&REQUIRED_FIELDS)?;

        let port_text = fields.require(FIELD_PORT)?.expose_secret().trim();
        let port = port_text.parse::<u16>().ok().filter(|port| *port != 0).ok_or_else(|| {
            Error::InvalidParameter(format!("port must be 1-65535, got '{}'", port_text))
        })?;

        let password = fields
            .get(FIELD_PASSWORD)
            .filter(|value| !value.expose_secret().is_empty())
            .map(|value| SecretString::from(value.expose_secret().to_string()));

        Ok(Self {
            user: fields.require(FIELD_USER)?.expose_secret().trim().to_string(),
            host: fields.require(FIELD_SERVER)?.expose_secret().trim().to_string(),
            port,
            password,
            remote_dir: fields
                .require(FIELD_REMOTE_BACKUP_DIR)?
                .expose_secret()
                .to_string(),
            local_dest_dir: fields
                .require(FIELD_LOCAL_DEST_DIR)?
                .expose_secret()
                .to_string(),
        })
    }

    /// `user@host`
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

impl fmt::Debug for SiteCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiteCredentials")
            .field("user", &self.user)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("remote_dir", &self.remote_dir)
            .field("local_dest_dir", &self.local_dest_dir)
            .finish()
    }
}
