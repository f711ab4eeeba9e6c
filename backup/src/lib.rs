//! Hosting utilities
//!
//! Pulls a compressed copy of a remote site directory over SSH into a
//! date-stamped local archive, using credentials held in a secret store.

pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod service;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use infra::secrets::{build_provider, SecretProvider, VaultSelection};
pub use service::backup::{BackupOptions, BackupService};
