//! 1Password CLI secret provider
//!
//! Shells out to `op`, which picks up its own credentials
//! (`OP_SERVICE_ACCOUNT_TOKEN`, or `OP_CONNECT_HOST`/`OP_CONNECT_TOKEN`).

use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::domain::credentials::SecretFields;
use crate::error::{Error, Result};
use crate::infra::secrets::SecretProvider;

#[derive(Debug, Deserialize)]
struct OpItem {
    #[serde(default)]
    fields: Vec<OpField>,
}

#[derive(Debug, Deserialize)]
struct OpField {
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

/// Reads item fields through the `op` command line client
#[derive(Debug, Clone)]
pub struct OpCliProvider {
    binary: String,
    vault: String,
    item: String,
}

impl OpCliProvider {
    pub fn new(binary: String, vault: String, item: String) -> Self {
        Self {
            binary,
            vault,
            item,
        }
    }

    /// Fail with [`Error::Unauthenticated`] unless `op` has a usable session
    pub async fn authenticate(&self) -> Result<()> {
        let output = self.op(&["whoami"]).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Error::Unauthenticated(stderr_text(&output.stderr)))
        }
    }

    async fn op(&self, args: &[&str]) -> Result<std::process::Output> {
        debug!("Running {} {}", self.binary, args.join(" "));
        Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::SecretProvider(format!("failed to run {}: {}", self.binary, e)))
    }
}

#[async_trait]
impl SecretProvider for OpCliProvider {
    async fn fetch(&self, fields: &[String]) -> Result<SecretFields> {
        let output = self
            .op(&[
                "item",
                "get",
                self.item.as_str(),
                "--vault",
                self.vault.as_str(),
                "--format",
                "json",
            ])
            .await?;

        if !output.status.success() {
            let message = stderr_text(&output.stderr);
            if message.contains("not signed in") || message.contains("authenticate") {
                return Err(Error::Unauthenticated(message));
            }
            return Err(Error::SecretProvider(message));
        }

        let json = String::from_utf8_lossy(&output.stdout);
        fields_from_item_json(&json, fields)
    }
}

/// Pick `wanted` labels out of `op item get --format json` output
fn fields_from_item_json(json: &str, wanted: &[String]) -> Result<SecretFields> {
    let item: OpItem = serde_json::from_str(json)?;

    let mut fields = SecretFields::new();
    for field in item.fields {
        if let (Some(label), Some(value)) = (field.label, field.value) {
            if wanted.iter().any(|w| *w == label) {
                fields.insert(label, value);
            }
        }
    }

    if fields.is_empty() {
        return Err(Error::SecretProvider(
            "item contains none of the requested fields".to_string(),
        ));
    }
    Ok(fields)
}

fn stderr_text(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr).trim().to_string();
    if text.is_empty() {
        "op exited with an error".to_string()
    } else {
        text
    }
}
