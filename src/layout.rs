//! On-disk layout of a recording and archival of finished sessions.
//!
//! ```text
//! data/
//!   cam0/<ts>.png   cam0.csv
//!   cam1/<ts>.png   cam1.csv
//!   imu/data.csv
//! ```

use crate::error::{CollectorError, Result};
use crate::stream::StreamRole;
use chrono::NaiveDateTime;
use std::fs;
use std::path::{Path, PathBuf};

/// Paths of one recording directory.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Image directory for a video role.
    pub fn image_dir(&self, role: StreamRole) -> Option<PathBuf> {
        role.camera_name().map(|name| self.root.join(name))
    }

    /// Index log for a video role (`data/cam0.csv`).
    pub fn index_log(&self, role: StreamRole) -> Option<PathBuf> {
        role.camera_name()
            .map(|name| self.root.join(format!("{}.csv", name)))
    }

    pub fn imu_dir(&self) -> PathBuf {
        self.root.join("imu")
    }

    pub fn imu_log(&self) -> PathBuf {
        self.imu_dir().join("data.csv")
    }

    /// Create every directory of the layout. Existing directories are kept.
    pub fn bootstrap(&self) -> Result<()> {
        let dirs = [
            self.image_dir(StreamRole::LeftInfrared),
            self.image_dir(StreamRole::RightInfrared),
            Some(self.imu_dir()),
        ];
        for dir in dirs.into_iter().flatten() {
            fs::create_dir_all(&dir).map_err(|source| CollectorError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Where [`archive`](Self::archive) moves the root when stopped at `stopped_at`.
    pub fn archive_path(&self, stopped_at: NaiveDateTime) -> PathBuf {
        let base = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "data".to_string());
        self.root.with_file_name(archive_name(&base, stopped_at))
    }

    /// Rename the root to `<root>_<YYYYMMDD_HHMMSS>`. Writers must be closed first.
    pub fn archive(&self, stopped_at: NaiveDateTime) -> Result<PathBuf> {
        let target = self.archive_path(stopped_at);
        fs::rename(&self.root, &target).map_err(|source| CollectorError::Archive {
            from: self.root.clone(),
            to: target.clone(),
            source,
        })?;
        tracing::info!(
            "Archived {} to {}",
            self.root.display(),
            target.display()
        );
        Ok(target)
    }

    /// Archive a stopped session and recreate an empty layout.
    ///
    /// A failed rename is logged and leaves the root in place; the run
    /// still counts as a clean stop. Returns the archive path on success.
    pub fn finish(&self, stopped_at: NaiveDateTime) -> Option<PathBuf> {
        match self.archive(stopped_at) {
            Ok(archived) => {
                if let Err(e) = self.bootstrap() {
                    tracing::warn!("Failed to recreate {}: {}", self.root.display(), e);
                }
                Some(archived)
            }
            Err(e) => {
                tracing::error!("Failed to rename data folder: {}", e);
                None
            }
        }
    }
}

/// `<base>_<YYYYMMDD_HHMMSS>`.
pub fn archive_name(base: &str, stopped_at: NaiveDateTime) -> String {
    format!("{}_{}", base, stopped_at.format("%Y%m%d_%H%M%S"))
}
