//! Integration test helpers
//!
//! A scratch workbench with a destination root, an `environments/` directory
//! and shell stand-ins for `ssh`.

use std::fs;
use std::io::{Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Once;

use flate2::write::GzEncoder;
use flate2::Compression;
use hosting_utilities::config::{Config, SecretBackend};
use tempfile::TempDir;

/// Content packed into every served archive
pub const PAYLOAD: &[u8] = b"wp-content/uploads/2024/03/photo.jpg\nwp-content/themes/site/style.css\n";

/// Password the prompting stand-in accepts
pub const PASSWORD: &str = "correct horse battery staple";

static TRACING: Once = Once::new();

/// Route test logs through the test harness writer
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Scratch directory for one test
pub struct Workbench {
    pub dir: TempDir,
    pub dest: PathBuf,
    pub environments: PathBuf,
    pub archive: PathBuf,
}

impl Workbench {
    pub fn new() -> anyhow::Result<Self> {
        init_tracing();
        let dir = tempfile::tempdir()?;
        let dest = dir.path().join("backups");
        let environments = dir.path().join("environments");
        fs::create_dir(&dest)?;
        fs::create_dir(&environments)?;

        let archive = dir.path().join("served.tar.gz");
        fs::write(&archive, gzip(PAYLOAD)?)?;

        Ok(Self {
            dir,
            dest,
            environments,
            archive,
        })
    }

    /// Write an executable `sh` script; `$ARCHIVE` names the served archive
    pub fn script(&self, name: &str, body: &str) -> anyhow::Result<PathBuf> {
        let path = self.dir.path().join(name);
        fs::write(
            &path,
            format!(
                "#!/bin/sh\nARCHIVE='{}'\n{}\n",
                self.archive.display(),
                body
            ),
        )?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
        Ok(path)
    }

    /// Stand-in that asks for [`PASSWORD`] like OpenSSH, including asking
    /// again after a wrong one, and then streams the archive
    pub fn prompting_ssh(&self) -> anyhow::Result<PathBuf> {
        self.script(
            "ssh-password",
            &format!(
                r#"for attempt in 1 2 3; do
  printf "%s's password: " "$3"
  read pw
  if [ "$pw" = "{}" ]; then
    cat "$ARCHIVE"
    exit 0
  fi
  printf 'Permission denied, please try again.\r\n'
done
exit 255"#,
                PASSWORD
            ),
        )
    }

    /// Stand-in for key-based auth that streams the archive straight away
    pub fn key_ssh(&self) -> anyhow::Result<PathBuf> {
        self.script("ssh-key", r#"cat "$ARCHIVE""#)
    }

    /// Write `environments/.<site>.env`
    pub fn site_env(&self, site: &str, password: &str) -> anyhow::Result<PathBuf> {
        let path = self.environments.join(format!(".{}.env", site));
        fs::write(
            &path,
            format!(
                "# {} hosting\nREMOTE_USER=deploy\nREMOTE_HOST=www.example.org\nREMOTE_SSH_PORT=2222\n\
                 REMOTE_PASSWORD=\"{}\"\nREMOTE_WP_CONTENT=/var/www/{}/wp-content\nLOCAL_DEST_DIR={}\n",
                site,
                password,
                site,
                self.dest.display()
            ),
        )?;
        Ok(path)
    }

    /// Env-file backed configuration using `ssh` as the client
    pub fn config(&self, ssh: &Path) -> Config {
        Config {
            secret_backend: SecretBackend::EnvFile,
            environments_dir: self.environments.clone(),
            ssh_binary: ssh.display().to_string(),
            prompt_timeout_secs: 10,
            idle_timeout_secs: 10,
            exit_grace_ms: 2000,
            ..Config::default()
        }
    }
}

pub fn gzip(data: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

pub fn gunzip(path: &Path) -> anyhow::Result<Vec<u8>> {
    let mut out = Vec::new();
    flate2::read::GzDecoder::new(fs::File::open(path)?).read_to_end(&mut out)?;
    Ok(out)
}

/// File names directly under `dir`, sorted
pub fn list_dir(dir: &Path) -> anyhow::Result<Vec<String>> {
    let mut names = fs::read_dir(dir)?
        .map(|entry| Ok(entry?.file_name().to_string_lossy().into_owned()))
        .collect::<anyhow::Result<Vec<_>>>()?;
    names.sort();
    Ok(names)
}
