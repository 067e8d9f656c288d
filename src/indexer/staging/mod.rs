
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use tracing::{debug, warn};

use super::safe_name;
use crate::{Result, ReviewError};

/// Locks older than this belong to a crashed rebuild
pub const STALE_LOCK_AGE: Duration = Duration::from_secs(60 * 60);

/// Exclusive right to rebuild one index, released on drop
#[derive(Debug)]
pub struct StagingLock {
    path: PathBuf,
}

fn is_stale(path: &Path) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > STALE_LOCK_AGE)
}

impl StagingLock {
    /// Fails with [`ReviewError::IndexBusy`] while another rebuild holds the lock
    #[inline]
    pub fn acquire(staging_dir: &Path, index_name: &str) -> Result<Self> {
        std::fs::create_dir_all(staging_dir)?;
        let path = staging_dir.join(format!("{}.lock", safe_name(index_name)));

        for reclaimed in [false, true] {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    writeln!(
                        file,
                        "pid={} started={}",
                        std::process::id(),
                        Utc::now().to_rfc3339()
                    )?;
                    debug!("Acquired staging lock {}", path.display());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if reclaimed || !is_stale(&path) {
                        return Err(ReviewError::IndexBusy(index_name.to_string()));
                    }
                    warn!("Reclaiming stale staging lock {}", path.display());
                    std::fs::remove_file(&path)?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ReviewError::IndexBusy(index_name.to_string()))
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to release staging lock {}: {}", self.path.display(), e);
        }
    }
}
