//! Command line interface

use clap::{Args, Parser, Subcommand};

use crate::infra::secrets::VaultSelection;

/// Site hosting maintenance tools
#[derive(Debug, Parser)]
#[command(name = "hosting-utilities", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Back up a site's remote content directory to local storage
    BackupSite(BackupSiteArgs),
}

#[derive(Debug, Args)]
pub struct BackupSiteArgs {
    /// Site name; also the per-site subdirectory of the destination
    #[arg(long)]
    pub site_name: String,

    /// 1Password item holding the site's fields
    #[arg(long, env = "OP_ITEM_NAME")]
    pub op_item_name: Option<String>,

    /// 1Password vault holding the item
    #[arg(long, env = "OP_VAULT_NAME")]
    pub op_vault_name: Option<String>,

    /// Seconds to wait for the SSH password prompt (0 = no limit)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

impl BackupSiteArgs {
    pub fn vault_selection(&self) -> VaultSelection {
        VaultSelection {
            vault_name: self.op_vault_name.clone(),
            item_name: self.op_item_name.clone(),
        }
    }
}
