//! Archive files on local disk: in-progress artifacts and integrity checks

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Decode the whole gzip stream at `path`, verifying CRC and length.
/// Returns the decompressed size.
pub fn verify_gzip(path: &Path) -> Result<u64> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Err(Error::IntegrityCheckFailed(format!(
            "{} is empty",
            path.display()
        )));
    }

    let mut decoder = MultiGzDecoder::new(BufReader::new(file));
    io::copy(&mut decoder, &mut io::sink())
        .map_err(|e| Error::IntegrityCheckFailed(format!("{}: {}", path.display(), e)))
}

/// An artifact being written under its temporary name. Removed on drop
/// unless [`PartialArtifact::publish`] succeeded.
#[derive(Debug)]
pub struct PartialArtifact {
    path: PathBuf,
    published: bool,
}

impl PartialArtifact {
    /// Create (or truncate) the file at `path`
    pub fn create(path: PathBuf) -> Result<(Self, File)> {
        let file = File::create(&path)?;
        Ok((
            Self {
                path,
                published: false,
            },
            file,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move the artifact to `final_path` with a single rename
    pub fn publish(mut self, final_path: &Path) -> Result<()> {
        fs::rename(&self.path, final_path)?;
        self.published = true;
        Ok(())
    }
}

impl Drop for PartialArtifact {
    fn drop(&mut self) {
        if self.published {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed incomplete artifact {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Could not remove incomplete artifact {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}
