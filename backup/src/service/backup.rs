//! Backup service
//!
//! Resolves credentials, streams a compressed archive of the remote site
//! directory into a `.part` file, verifies it and publishes it under its
//! final date-stamped name.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use secrecy::{ExposeSecret, SecretString};
use session_runner::{run_redirected, ExitOutcome, InteractiveRunner, Prompt};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::domain::credentials::{SiteCredentials, BACKUP_FIELDS};
use crate::domain::plan::{expand_env_vars, BackupPlan};
use crate::error::{Error, Result};
use crate::infra::archive::{verify_gzip, PartialArtifact};
use crate::infra::secrets::SecretProvider;

/// Options for running a backup
#[derive(Debug, Clone)]
pub struct BackupOptions {
    /// SSH client executable
    pub ssh_binary: String,
    /// Wait for the password prompt (zero = no limit)
    pub prompt_timeout: Duration,
    /// Longest silence once the password is sent (zero = no limit)
    pub idle_timeout: Duration,
    /// Time a finished transfer may take to exit
    pub exit_grace: Duration,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for BackupOptions {
    fn from(config: &Config) -> Self {
        Self {
            ssh_binary: config.ssh_binary.clone(),
            prompt_timeout: config.prompt_timeout(),
            idle_timeout: config.idle_timeout(),
            exit_grace: config.exit_grace(),
        }
    }
}

/// Backup service for pulling site content to local storage
pub struct BackupService {
    provider: Arc<dyn SecretProvider>,
    options: BackupOptions,
    runner: InteractiveRunner,
}

impl BackupService {
    /// Create a new backup service
    pub fn new(provider: Arc<dyn SecretProvider>, options: BackupOptions) -> Self {
        let runner = InteractiveRunner::new()
            .with_exit_grace(options.exit_grace)
            .with_idle_timeout(options.idle_timeout);
        Self {
            provider,
            options,
            runner,
        }
    }

    /// Back up `site_name`, stamped with today's local date.
    /// Returns the published archive path.
    pub async fn run_backup(&self, site_name: &str) -> Result<PathBuf> {
        self.run_backup_on(site_name, Local::now().date_naive()).await
    }

    /// Back up `site_name`, stamped with `date`
    pub async fn run_backup_on(&self, site_name: &str, date: NaiveDate) -> Result<PathBuf> {
        let wanted: Vec<String> = BACKUP_FIELDS.iter().map(|f| f.to_string()).collect();
        let fields = self.provider.fetch(&wanted).await?;
        debug!(?fields, "Fetched site credentials");
        let credentials = SiteCredentials::from_fields(&fields)?;

        let destination_root = PathBuf::from(expand_env_vars(&credentials.local_dest_dir));
        validate_destination(&destination_root)?;

        let plan = BackupPlan::new(
            site_name,
            &destination_root,
            &credentials,
            &self.options.ssh_binary,
            date,
        )?;
        fs::create_dir_all(&plan.site_dir)?;

        info!(
            "Backing up static site content from {}:{} to {}",
            credentials.destination(),
            credentials.remote_dir,
            plan.final_path.display()
        );
        info!("Running SSH command: {}", plan.ssh_command);

        let (artifact, file) = PartialArtifact::create(plan.partial_path.clone())?;
        let outcome = self
            .transfer(&plan, credentials.password.as_ref(), file)
            .await?;

        if !outcome.success() {
            error!(site = site_name, "SSH/tar command failed: {}", outcome);
            return Err(Error::RemoteCommandFailed {
                code: outcome.code(),
                reason: outcome.to_string(),
            });
        }

        let size = verify_gzip(artifact.path())?;
        debug!(bytes = size, "gzip integrity check passed");

        artifact.publish(&plan.final_path)?;
        info!("Done: {}", plan.final_path.display());

        Ok(plan.final_path)
    }

    /// Stream the remote archive into `file`, answering the password prompt
    /// when a password is configured
    async fn transfer(
        &self,
        plan: &BackupPlan,
        password: Option<&SecretString>,
        file: File,
    ) -> Result<ExitOutcome> {
        let Some(password) = password else {
            let outcome = run_redirected(&plan.ssh_command, file.try_clone()?, Duration::ZERO).await;
            if outcome.success() {
                file.sync_all()?;
            }
            return Ok(outcome);
        };

        let prompt = password_prompt_matcher(&plan.password_prompt)?;
        let mut writer = BufWriter::new(file);
        let outcome = self
            .runner
            .run(
                &plan.ssh_command,
                &prompt,
                password.expose_secret().as_bytes(),
                Some(&mut writer),
                self.options.prompt_timeout,
            )
            .await;

        let file = writer.into_inner().map_err(|e| e.into_error())?;
        if outcome.success() {
            file.sync_all()?;
        }
        Ok(outcome)
    }
}

/// The prompt text plus the spaces OpenSSH prints after it
fn password_prompt_matcher(prompt: &str) -> Result<Prompt> {
    Prompt::pattern(&format!("{} *", regex::escape(prompt)))
        .map_err(|e| Error::Internal(format!("invalid prompt pattern: {}", e)))
}

fn validate_destination(root: &Path) -> Result<()> {
    if !root.exists() {
        return Err(Error::DestinationNotFound(root.display().to_string()));
    }
    if !root.is_dir() {
        return Err(Error::NotADirectory(root.display().to_string()));
    }
    Ok(())
}
