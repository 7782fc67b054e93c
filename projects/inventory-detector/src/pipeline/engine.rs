use crate::pipeline::types::DetectionResult;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Where an engine puts its annotated copy: `save_dir/<basename of source>`.
///
/// Engines with a different layout must override [`InferenceEngine::artifact_path`]
/// and bump this tag.
pub const ARTIFACT_NAMING_CONVENTION: &str = "save_dir/<source basename>@v1";

/// Path-based object detector that also writes an annotated copy of its input.
///
/// Implementations are loaded once and shared across requests, so they must be
/// safe to call from several threads at once.
pub trait InferenceEngine: Send + Sync {
    /// Detect objects in the image at `source`, keeping boxes scoring at least `confidence`.
    fn predict(&self, source: &Path, confidence: f32) -> Result<DetectionResult>;

    /// Location of the annotated copy produced for `result`.
    fn artifact_path(&self, result: &DetectionResult) -> PathBuf {
        default_artifact_path(result)
    }
}

pub fn default_artifact_path(result: &DetectionResult) -> PathBuf {
    match result.source_path.file_name() {
        Some(name) => result.save_dir.join(name),
        None => result.save_dir.clone(),
    }
}
