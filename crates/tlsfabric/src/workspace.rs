//! Working directory management: clean slate per run, staged commits.
//!
//! Certificate artifacts are written into a fresh staging directory next to
//! the target certs directory. Only a fully successful run swaps it into
//! place; a failed run drops the staging directory and leaves the previous
//! artifacts untouched.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use tlsfabric_core::{FabricError, Result};

/// Remove every entry directly under `dir`, keeping `dir` itself.
///
/// Idempotent on an empty directory. The first failure aborts; entries
/// removed before it stay removed.
pub async fn clean(dir: &Path) -> Result<()> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| FabricError::io(dir, e))?;

    let mut removed = 0usize;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| FabricError::io(dir, e))?
    {
        let path = entry.path();
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| FabricError::io(&path, e))?;

        let result = if file_type.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        result.map_err(|e| FabricError::io(&path, e))?;
        removed += 1;
    }

    debug!(dir = %dir.display(), removed, "cleaned working directory");
    Ok(())
}

/// Create `dir` (and parents) if missing, then clean it.
pub async fn prepare(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| FabricError::io(dir, e))?;
    clean(dir).await
}

/// A staging directory that becomes `target` on [`StagedCerts::commit`].
///
/// Dropped without committing, the staging directory is deleted.
#[derive(Debug)]
pub struct StagedCerts {
    staging: TempDir,
    target: PathBuf,
}

impl StagedCerts {
    /// Create a fresh staging directory beside `target`.
    ///
    /// Staging on the same filesystem keeps the final rename atomic.
    pub async fn new(target: &Path) -> Result<Self> {
        let parent = target
            .parent()
            .ok_or_else(|| FabricError::Config(format!("{} has no parent", target.display())))?;
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| FabricError::io(parent, e))?;

        let prefix = format!(".{}.staging-", file_name(target));
        let staging = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(parent)
            .map_err(|e| FabricError::io(parent, e))?;

        debug!(staging = %staging.path().display(), target = %target.display(), "staging certs");
        Ok(Self {
            staging,
            target: target.to_path_buf(),
        })
    }

    /// Where stages write their artifacts.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.staging.path()
    }

    /// Swap the staged artifacts into `target`.
    ///
    /// The previous target is renamed aside first and removed only after the
    /// staged directory is in place; if that rename fails it is restored.
    pub async fn commit(self) -> Result<PathBuf> {
        let staged = self.staging.keep();
        let target = self.target;

        let previous = if tokio::fs::try_exists(&target)
            .await
            .map_err(|e| FabricError::io(&target, e))?
        {
            let aside = target.with_file_name(format!(".{}.previous", file_name(&target)));
            if tokio::fs::try_exists(&aside).await.unwrap_or(false) {
                tokio::fs::remove_dir_all(&aside)
                    .await
                    .map_err(|e| FabricError::io(&aside, e))?;
            }
            tokio::fs::rename(&target, &aside)
                .await
                .map_err(|e| FabricError::io(&target, e))?;
            Some(aside)
        } else {
            None
        };

        if let Err(e) = tokio::fs::rename(&staged, &target).await {
            if let Some(aside) = &previous {
                if let Err(restore) = tokio::fs::rename(aside, &target).await {
                    warn!(error = %restore, path = %aside.display(), "failed to restore previous certs");
                }
            }
            // Staging was detached from its guard; remove it by hand.
            let _ = tokio::fs::remove_dir_all(&staged).await;
            return Err(FabricError::io(&target, e));
        }

        if let Some(aside) = previous {
            if let Err(e) = tokio::fs::remove_dir_all(&aside).await {
                warn!(error = %e, path = %aside.display(), "failed to remove previous certs");
            }
        }

        info!(target = %target.display(), "committed staged certs");
        Ok(target)
    }
}

/// Fail with `MissingOutput` unless `path` exists.
pub(crate) async fn ensure_output(path: &Path, diagnostics: &str) -> Result<()> {
    match tokio::fs::try_exists(path).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(FabricError::MissingOutput {
            path: path.to_path_buf(),
            diagnostics: diagnostics.to_string(),
        }),
        Err(e) => Err(FabricError::io(path, e)),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| "certs".to_string(), |n| n.to_string_lossy().into_owned())
}
