//! Backup plan: every path and command line of one run, computed up front

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use session_runner::CommandLine;

use crate::domain::credentials::SiteCredentials;
use crate::error::{Error, Result};

/// Final artifact extension
pub const ARCHIVE_EXTENSION: &str = "tar.gz";
/// Extension of the artifact while it is being written
pub const PARTIAL_EXTENSION: &str = "tar.gz.part";

/// Resolved paths and commands for backing up one site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPlan {
    pub site_dir: PathBuf,
    pub partial_path: PathBuf,
    pub final_path: PathBuf,
    pub remote_command: String,
    pub ssh_command: CommandLine,
    pub password_prompt: String,
}

impl BackupPlan {
    pub fn new(
        site_name: &str,
        destination_root: &Path,
        credentials: &SiteCredentials,
        ssh_binary: &str,
        date: NaiveDate,
    ) -> Result<Self> {
        validate_site_name(site_name)?;

        let site_dir = destination_root.join(site_name);
        let stamp = date_stamp(date);
        let remote_command = remote_archive_command(&credentials.remote_dir)?;

        let ssh_command = CommandLine::new(ssh_binary)
            .arg("-p")
            .arg(credentials.port.to_string())
            .arg(credentials.destination())
            .arg(remote_command.clone());

        Ok(Self {
            partial_path: site_dir.join(format!("{}.{}", stamp, PARTIAL_EXTENSION)),
            final_path: site_dir.join(format!("{}.{}", stamp, ARCHIVE_EXTENSION)),
            site_dir,
            remote_command,
            ssh_command,
            password_prompt: password_prompt(&credentials.user, &credentials.host),
        })
    }
}

/// `MM-DD-YY`
pub fn date_stamp(date: NaiveDate) -> String {
    date.format("%m-%d-%y").to_string()
}

/// Prompt OpenSSH prints when asking for a password
pub fn password_prompt(user: &str, host: &str) -> String {
    format!("{}@{}'s password:", user, host)
}

/// Shell command that streams `remote_dir` as a gzip-compressed tar to stdout
pub fn remote_archive_command(remote_dir: &str) -> Result<String> {
    let (parent, name) = split_posix_path(remote_dir).ok_or_else(|| {
        Error::InvalidParameter(format!("cannot archive remote directory '{}'", remote_dir))
    })?;

    Ok(format!(
        "tar -C {} -cz {}",
        double_quote(&parent),
        double_quote(&name)
    ))
}

/// Site names become a single path component
fn validate_site_name(site_name: &str) -> Result<()> {
    if site_name.is_empty()
        || site_name == "."
        || site_name == ".."
        || site_name.contains('/')
        || site_name.contains('\\')
    {
        return Err(Error::InvalidParameter(format!(
            "invalid site name '{}'",
            site_name
        )));
    }
    Ok(())
}

/// `dirname`/`basename` of a POSIX path. None for empty paths and `/`.
fn split_posix_path(path: &str) -> Option<(String, String)> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }

    match trimmed.rfind('/') {
        None => Some((".".to_string(), trimmed.to_string())),
        Some(index) => {
            let parent = trimmed[..index].trim_end_matches('/');
            let parent = if parent.is_empty() { "/" } else { parent };
            Some((parent.to_string(), trimmed[index + 1..].to_string()))
        }
    }
}

/// Quote for a POSIX shell double-quoted context
fn double_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Expand `$VAR` and `${VAR}` from the process environment. Unknown
/// variables are left as written.
pub fn expand_env_vars(input: &str) -> String {
    expand_with(input, |name| std::env::var(name).ok())
}

fn expand_with<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        match (name.is_empty(), lookup(name)) {
            (false, Some(value)) => out.push_str(&value),
            _ => out.push_str(&rest[pos..pos + 1 + consumed]),
        }
        rest = &after[consumed..];
    }

    out.push_str(rest);
    out
}
