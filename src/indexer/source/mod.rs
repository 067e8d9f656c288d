#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};

use git2::{ErrorClass, ErrorCode};
use ignore::WalkBuilder;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{IndexingWarning, safe_name};
use crate::retry::{Failure, RetryPolicy};
use crate::{Result, ReviewError};

const REMOTE_PREFIXES: [&str; 6] = ["http://", "https://", "ssh://", "git://", "git@", "file://"];

/// Where a repository snapshot comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositorySource {
    Local(PathBuf),
    Remote(String),
}

impl RepositorySource {
    #[inline]
    pub fn parse(source: &str) -> Self {
        let trimmed = source.trim();
        if REMOTE_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
            Self::Remote(trimmed.to_string())
        } else {
            Self::Local(PathBuf::from(trimmed))
        }
    }
}

/// A readable working tree, removed on drop when it was cloned for us
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    cleanup: Option<PathBuf>,
}

impl Workspace {
    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn is_checkout(&self) -> bool {
        self.cleanup.is_some()
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Some(dir) = self.cleanup.take() {
            debug!("Removing checkout {}", dir.display());
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                warn!("Failed to remove checkout {}: {}", dir.display(), e);
            }
        }
    }
}

fn classify_git(error: &git2::Error) -> Failure<String> {
    let message = error.message().to_string();
    if matches!(error.code(), ErrorCode::Auth | ErrorCode::Certificate) {
        return Failure::Permanent(message);
    }
    match error.class() {
        ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssl | ErrorClass::Ssh | ErrorClass::Os => {
            Failure::Transient(message)
        }
        _ => Failure::Permanent(message),
    }
}

async fn clone_remote(
    url: &str,
    index_name: &str,
    checkouts_dir: &Path,
    policy: &RetryPolicy,
) -> Result<Workspace> {
    let checkout = checkouts_dir.join(format!("{}-{}", safe_name(index_name), Uuid::new_v4().simple()));
    std::fs::create_dir_all(&checkout)?;
    let mut workspace = Workspace {
        root: checkout.clone(),
        cleanup: Some(checkout.clone()),
    };

    info!("Cloning {} into {}", url, checkout.display());
    let mut attempt = 0_u32;
    let cloned = policy
        .run("repository clone", || {
            // abandoned attempts may still be writing, so each one gets its own directory
            attempt += 1;
            let dest = checkout.join(attempt.to_string());
            let url = url.to_string();
            async move {
                tokio::task::spawn_blocking(move || {
                    git2::build::RepoBuilder::new()
                        .clone(&url, &dest)
                        .map(|_| dest)
                        .map_err(|e| classify_git(&e))
                })
                .await
                .map_err(|e| Failure::Permanent(format!("clone task failed: {e}")))?
            }
        })
        .await
        .map_err(|failure| ReviewError::RepositoryUnreachable(format!("{url}: {failure}")))?;

    workspace.root = cloned;
    Ok(workspace)
}

/// Make the repository readable on local disk, cloning remote sources
#[inline]
pub async fn prepare(
    source: &str,
    index_name: &str,
    checkouts_dir: &Path,
    policy: &RetryPolicy,
) -> Result<Workspace> {
    match RepositorySource::parse(source) {
        RepositorySource::Remote(url) => clone_remote(&url, index_name, checkouts_dir, policy).await,
        RepositorySource::Local(path) => {
            let root = path.canonicalize().map_err(|e| {
                ReviewError::RepositoryUnreachable(format!("{}: {e}", path.display()))
            })?;
            if !root.is_dir() {
                return Err(ReviewError::RepositoryUnreachable(format!(
                    "{} is not a directory",
                    root.display()
                )));
            }
            Ok(Workspace {
                root,
                cleanup: None,
            })
        }
    }
}

/// Files selected for indexing, in path order
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub files: Vec<PathBuf>,
    /// Matching files left out, such as oversized ones
    pub skipped: Vec<IndexingWarning>,
}

impl Discovery {
    /// Matching files, whether indexed or skipped
    #[inline]
    pub fn discovered(&self) -> usize {
        self.files.len() + self.skipped.len()
    }
}

/// `/`-separated path of `path` under `root`
#[inline]
pub fn relative_label(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Walk `root` honoring `.gitignore`, keeping files with one of `extensions`
#[inline]
pub fn discover_files(
    root: &Path,
    extensions: &[String],
    ignore_dirs: &[String],
    max_file_bytes: u64,
) -> Discovery {
    let ignore_dirs: Vec<String> = ignore_dirs.to_vec();
    let walker = WalkBuilder::new(root)
        .require_git(false)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir && ignore_dirs.iter().any(|d| entry.file_name() == d.as_str()))
        })
        .build();

    let mut discovery = Discovery::default();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }

        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .is_some_and(|ext| extensions.contains(&ext));
        if !matches {
            continue;
        }

        match entry.metadata() {
            Ok(metadata) if metadata.len() > max_file_bytes => {
                discovery.skipped.push(IndexingWarning {
                    path: relative_label(root, path),
                    reason: format!(
                        "file is {} bytes, above the {} byte limit",
                        metadata.len(),
                        max_file_bytes
                    ),
                });
            }
            Ok(_) => discovery.files.push(path.to_path_buf()),
            Err(e) => discovery.skipped.push(IndexingWarning {
                path: relative_label(root, path),
                reason: e.to_string(),
            }),
        }
    }

    discovery.files.sort();
    discovery.skipped.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(
        "Discovered {} files under {} ({} skipped)",
        discovery.files.len(),
        root.display(),
        discovery.skipped.len()
    );
    discovery
}
