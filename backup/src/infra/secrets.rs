//! Secret provider interface

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::{Config, SecretBackend};
use crate::domain::credentials::SecretFields;
use crate::error::{Error, Result};
use crate::infra::env_file::EnvFileProvider;
use crate::infra::op_cli::OpCliProvider;

/// Resolves named credential fields into values
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Fetch the requested field labels. Labels the store does not have are
    /// simply absent from the result; callers decide what is required.
    async fn fetch(&self, fields: &[String]) -> Result<SecretFields>;
}

/// Vault coordinates given on the command line
#[derive(Debug, Clone, Default)]
pub struct VaultSelection {
    pub vault_name: Option<String>,
    pub item_name: Option<String>,
}

/// Build the configured provider once, checking it can authenticate
pub async fn build_provider(
    config: &Config,
    site_name: &str,
    selection: &VaultSelection,
) -> Result<Arc<dyn SecretProvider>> {
    match config.secret_backend {
        SecretBackend::Op => {
            let vault = selection
                .vault_name
                .clone()
                .or_else(|| config.op_vault_name.clone())
                .ok_or_else(|| {
                    Error::InvalidConfig(
                        "a 1Password vault name is required (--op-vault-name or OP_VAULT_NAME)"
                            .to_string(),
                    )
                })?;
            let item = selection
                .item_name
                .clone()
                .or_else(|| config.op_item_name.clone())
                .ok_or_else(|| {
                    Error::InvalidConfig(
                        "a 1Password item name is required (--op-item-name or OP_ITEM_NAME)"
                            .to_string(),
                    )
                })?;

            let provider = OpCliProvider::new(config.op_binary.clone(), vault, item);
            provider.authenticate().await?;
            info!("Using 1Password CLI secret provider");
            Ok(Arc::new(provider))
        }
        SecretBackend::EnvFile => {
            let path = config.site_env_file(site_name);
            info!("Using env file secret provider: {}", path.display());
            Ok(Arc::new(EnvFileProvider::new(path)))
        }
    }
}
