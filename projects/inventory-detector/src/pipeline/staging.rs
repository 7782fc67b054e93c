// Transient staging of normalized uploads for path-based inference.
//
// Every request gets its own `upload-<uuid>.jpg`; the returned guard removes
// that file on every exit path.

use crate::pipeline::error::PipelineError;
use crate::pipeline::types::NormalizedImage;
use anyhow::{Context, Result};
use image::ImageFormat;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use walkdir::WalkDir;

const STAGED_PREFIX: &str = "upload-";
const STAGED_EXTENSION: &str = "jpg";

/// Directory holding in-flight staged uploads.
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create staging directory {:?}", dir))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `image` to a fresh unique path and return a guard owning it.
    pub fn stage(&self, image: &NormalizedImage) -> Result<StagedFile, PipelineError> {
        let id = Uuid::new_v4();
        let path = self
            .dir
            .join(format!("{}{}.{}", STAGED_PREFIX, id, STAGED_EXTENSION));

        // The guard exists before the write so a partial file is still removed.
        let staged = StagedFile {
            id,
            path,
            released: false,
        };
        image
            .image
            .save_with_format(&staged.path, ImageFormat::Jpeg)
            .map_err(|e| staging_error(&staged.path, e))?;
        tracing::debug!("Staged upload at {:?}", staged.path);
        Ok(staged)
    }

    /// Staged files currently present in the staging directory.
    pub fn pending(&self) -> Vec<PathBuf> {
        WalkDir::new(&self.dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| is_staged_name(e.path()))
            .map(|e| e.path().to_path_buf())
            .collect()
    }

    /// Remove staged files left behind by a previous process. Returns how many were removed.
    pub fn sweep(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.pending() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove stale staged file {:?}", path))?;
            removed += 1;
        }
        Ok(removed)
    }
}

/// Staging failures are storage failures, including encoder limits the upload hits.
fn staging_error(path: &Path, err: image::ImageError) -> PipelineError {
    let kind = match &err {
        image::ImageError::IoError(e) => e.kind(),
        _ => io::ErrorKind::Other,
    };
    PipelineError::Io(io::Error::new(
        kind,
        format!("failed to write {:?}: {}", path, err),
    ))
}

fn is_staged_name(path: &Path) -> bool {
    let name_ok = path
        .file_name()
        .and_then(|s| s.to_str())
        .map(|s| s.starts_with(STAGED_PREFIX))
        .unwrap_or(false);
    let ext_ok = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s == STAGED_EXTENSION)
        .unwrap_or(false);
    name_ok && ext_ok
}

/// Scoped ownership of one staged upload. Dropping it deletes the file.
#[derive(Debug)]
pub struct StagedFile {
    id: Uuid,
    path: PathBuf,
    released: bool,
}

impl StagedFile {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the staged file now, reporting any failure.
    pub fn release(mut self) -> io::Result<()> {
        self.released = true;
        remove_if_present(&self.path).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("failed to remove staged upload {:?}: {}", self.path, e),
            )
        })
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = remove_if_present(&self.path) {
            tracing::warn!("Failed to remove staged file {:?}: {}", self.path, e);
        }
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn sample() -> NormalizedImage {
        NormalizedImage {
            image: RgbImage::from_pixel(6, 4, Rgb([200, 100, 50])),
        }
    }

    #[test]
    fn staged_names_are_unique() {
        let dir = tempfile::TempDir::new().unwrap();
        let area = StagingArea::new(dir.path()).unwrap();

        let a = area.stage(&sample()).unwrap();
        let b = area.stage(&sample()).unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().exists() && b.path().exists());
        assert_eq!(area.pending().len(), 2);
    }

    #[test]
    fn drop_removes_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let area = StagingArea::new(dir.path()).unwrap();

        let staged = area.stage(&sample()).unwrap();
        let path = staged.path().to_path_buf();
        drop(staged);
        assert!(!path.exists());
        assert!(area.pending().is_empty());
    }

    #[test]
    fn release_tolerates_already_removed_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let area = StagingArea::new(dir.path()).unwrap();

        let staged = area.stage(&sample()).unwrap();
        fs::remove_file(staged.path()).unwrap();
        assert!(staged.release().is_ok());
    }

    #[test]
    fn encoder_limits_are_storage_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let area = StagingArea::new(dir.path()).unwrap();

        // JPEG caps each dimension at 65535 pixels
        let too_wide = NormalizedImage {
            image: RgbImage::new(65_536, 1),
        };
        let err = area.stage(&too_wide).unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)), "got {:?}", err);
        assert!(area.pending().is_empty());
    }

    #[test]
    fn missing_staging_dir_is_an_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let area = StagingArea::new(dir.path().join("staging")).unwrap();
        fs::remove_dir(area.dir()).unwrap();

        match area.stage(&sample()) {
            Err(PipelineError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("expected an io error, got {:?}", other),
        }
    }

    #[test]
    fn release_reports_undeletable_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let area = StagingArea::new(dir.path()).unwrap();

        let staged = area.stage(&sample()).unwrap();
        let path = staged.path().to_path_buf();
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();
        fs::write(path.join("occupant"), b"x").unwrap();

        assert!(staged.release().is_err());
    }

    #[test]
    fn sweep_only_touches_staged_names() {
        let dir = tempfile::TempDir::new().unwrap();
        let area = StagingArea::new(dir.path()).unwrap();

        fs::write(dir.path().join("upload-stale.jpg"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"keep").unwrap();
        fs::write(dir.path().join("upload-other.png"), b"keep").unwrap();

        assert_eq!(area.sweep().unwrap(), 1);
        assert!(dir.path().join("notes.txt").exists());
        assert!(dir.path().join("upload-other.png").exists());
        assert!(area.pending().is_empty());
    }
}
