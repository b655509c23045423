//! Value file, archive naming and operator relabeling.
//!
//! Every processed source image ends up in the archive directory under a
//! name carrying its reading and capture time, e.g.
//! `latest_45.5_20240115_143052.jpg`. A quality label appends a suffix
//! once: `latest_45.5_20240115_143052_GOOD.jpg`.

use chrono::{DateTime, Local};
use image::RgbImage;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::reader::annotate::privacy_blur;
use crate::types::{ArchiveRecord, QualityLabel, Reading};
use crate::watcher::move_file;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write blurred archive image: {0}")]
    Image(#[from] image::ImageError),
    #[error("no archived reading to label")]
    NoCurrentRecord,
    #[error("{0} has already been labeled")]
    AlreadyLabeled(PathBuf),
    #[error("archived file {0} is missing")]
    Missing(PathBuf),
}

impl ArchiveError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Overwrite the value file with the reading's textual form.
pub fn write_value_file(path: &Path, reading: Reading) -> std::io::Result<()> {
    std::fs::write(path, reading.to_string())
}

/// Places processed source images in the archive directory.
#[derive(Debug, Clone)]
pub struct Archiver {
    dir: PathBuf,
    stem: String,
    extension: String,
    /// Privacy-blur kernel; `None` archives the source bytes untouched
    blur_kernel: Option<u32>,
}

impl Archiver {
    /// `canonical_name` supplies the stem and extension of archive names.
    pub fn new(dir: impl Into<PathBuf>, canonical_name: &str, blur_kernel: Option<u32>) -> Self {
        let canonical = Path::new(canonical_name);
        let stem = canonical
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "latest".to_string());
        let extension = canonical
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "jpg".to_string());
        Self {
            dir: dir.into(),
            stem,
            extension,
            blur_kernel,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Archive path for a reading taken at `timestamp`.
    pub fn archive_path(&self, reading: Reading, timestamp: DateTime<Local>) -> PathBuf {
        self.dir.join(format!(
            "{}_{}_{}.{}",
            self.stem,
            reading,
            timestamp.format("%Y%m%d_%H%M%S"),
            self.extension
        ))
    }

    /// Move `source` into the archive, or with privacy blur enabled write a
    /// blurred copy of `frame` and delete `source`.
    pub fn archive(
        &self,
        source: &Path,
        frame: &RgbImage,
        reading: Reading,
        timestamp: DateTime<Local>,
    ) -> Result<ArchiveRecord, ArchiveError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| ArchiveError::io(&self.dir, e))?;
        let path = self.archive_path(reading, timestamp);

        match self.blur_kernel {
            Some(kernel) => {
                privacy_blur(frame, kernel).save(&path)?;
                std::fs::remove_file(source).map_err(|e| ArchiveError::io(source, e))?;
                debug!(path = %path.display(), "Archived blurred frame");
            }
            None => {
                move_file(source, &path).map_err(|e| ArchiveError::io(source, e))?;
            }
        }

        Ok(ArchiveRecord {
            path,
            reading,
            timestamp,
            label: None,
        })
    }
}

/// Append a quality suffix to an archived file, once.
pub fn relabel(record: &mut ArchiveRecord, label: QualityLabel) -> Result<PathBuf, ArchiveError> {
    if record.label.is_some() {
        return Err(ArchiveError::AlreadyLabeled(record.path.clone()));
    }
    if !record.path.exists() {
        return Err(ArchiveError::Missing(record.path.clone()));
    }

    let stem = record
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match record.path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, label.suffix(), ext.to_string_lossy()),
        None => format!("{}_{}", stem, label.suffix()),
    };
    let renamed = record.path.with_file_name(file_name);

    std::fs::rename(&record.path, &renamed).map_err(|e| ArchiveError::io(&record.path, e))?;
    info!(from = %record.path.display(), to = %renamed.display(), "Archive relabeled");

    record.path = renamed.clone();
    record.label = Some(label);
    Ok(renamed)
}
