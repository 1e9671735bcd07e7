//! Timestamped copies of legacy files taken before any mutation.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{MigrationError, Result};

/// One copied file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackedUpFile {
    pub original: PathBuf,
    pub copy: PathBuf,
}

/// A completed backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    pub dir: PathBuf,
    pub files: Vec<BackedUpFile>,
}

impl Backup {
    /// Copy `files` into a fresh `legacy-<timestamp>` directory under `root`
    /// and check each copy byte for byte.
    pub fn create(root: &Path, files: &[PathBuf], at: DateTime<Utc>) -> Result<Self> {
        let dir = unique_dir(root, &format!("legacy-{}", at.format("%Y%m%dT%H%M%SZ")));
        std::fs::create_dir_all(&dir)
            .map_err(|e| MigrationError::Backup(format!("{}: {}", dir.display(), e)))?;

        let mut copied = Vec::with_capacity(files.len());
        for original in files {
            let name = original.file_name().ok_or_else(|| {
                MigrationError::Backup(format!("not a file: {}", original.display()))
            })?;
            let copy = dir.join(name);
            std::fs::copy(original, &copy)
                .map_err(|e| MigrationError::Backup(format!("{}: {}", original.display(), e)))?;

            if std::fs::read(original)? != std::fs::read(&copy)? {
                return Err(MigrationError::Backup(format!(
                    "copy of {} does not match the original",
                    original.display()
                )));
            }
            debug!("Backed up {}", original.display());
            copied.push(BackedUpFile {
                original: original.clone(),
                copy,
            });
        }

        info!("Backed up {} legacy files to {}", copied.len(), dir.display());
        Ok(Self { dir, files: copied })
    }

    /// Put back every original that is missing or no longer matches its copy.
    /// Returns how many files were restored.
    pub fn restore_changed(&self) -> Result<usize> {
        let mut restored = 0;
        for file in &self.files {
            let saved = std::fs::read(&file.copy)?;
            let current = std::fs::read(&file.original).ok();
            if current.as_deref() != Some(saved.as_slice()) {
                warn!("Restoring {} from backup", file.original.display());
                std::fs::write(&file.original, &saved)?;
                restored += 1;
            }
        }
        Ok(restored)
    }
}

fn unique_dir(root: &Path, base: &str) -> PathBuf {
    let first = root.join(base);
    if !first.exists() {
        return first;
    }
    (2..)
        .map(|n| root.join(format!("{}-{}", base, n)))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}
