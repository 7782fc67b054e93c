// Detection request orchestrator
//
// Runs one upload through normalize -> stage -> infer -> locate artifact ->
// present -> count, and releases the staged file on every exit path.

use crate::pipeline::engine::InferenceEngine;
use crate::pipeline::error::PipelineError;
use crate::pipeline::normalize::normalize;
use crate::pipeline::staging::StagingArea;
use crate::pipeline::surface::{ImageSource, PresentationSurface};
use crate::pipeline::types::{Detection, DetectionReport, UploadedImage};
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

pub const UPLOADED_CAPTION: &str = "Uploaded Image";
pub const DETECTED_CAPTION: &str = "Detected Objects";
pub const WORKING_MESSAGE: &str = "Detecting objects...";

/// Pipeline shared by every request. Cheap to clone.
#[derive(Clone)]
pub struct DetectionPipeline {
    engine: Arc<dyn InferenceEngine>,
    staging: StagingArea,
    confidence: f32,
}

impl DetectionPipeline {
    pub fn new(engine: Arc<dyn InferenceEngine>, staging: StagingArea, confidence: f32) -> Self {
        Self {
            engine,
            staging,
            confidence,
        }
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// Process one upload, rendering progress and results onto `surface`.
    ///
    /// `None` is the idle state and leaves the surface untouched. Every error is
    /// shown on the surface before being returned.
    pub fn handle_upload(
        &self,
        upload: Option<UploadedImage>,
        surface: &mut dyn PresentationSurface,
    ) -> Result<Option<DetectionReport>, PipelineError> {
        let Some(upload) = upload else {
            return Ok(None);
        };

        match self.run(upload, surface) {
            Ok(report) => Ok(Some(report)),
            Err(e) => {
                tracing::warn!("Upload failed ({}): {}", e.kind(), e);
                surface.show_error(&e.to_string());
                Err(e)
            }
        }
    }

    fn run(
        &self,
        upload: UploadedImage,
        surface: &mut dyn PresentationSurface,
    ) -> Result<DetectionReport, PipelineError> {
        surface.show_image(
            ImageSource::Bytes {
                mime: upload.display_mime(),
                data: upload.bytes.clone(),
            },
            UPLOADED_CAPTION,
        );

        let normalized = normalize(&upload)?;
        drop(upload);

        let staged = self.staging.stage(&normalized)?;
        drop(normalized);
        let request_id = staged.id();

        let outcome = self.detect_staged(staged.path(), surface);

        // Explicit release on every path past staging so a failure reaches the user
        let cleanup_failed = match staged.release() {
            Ok(()) => false,
            Err(e) => {
                tracing::warn!("Failed to remove staged upload {}: {}", request_id, e);
                let err = PipelineError::Io(e);
                surface.show_error(&format!("{}. Please try again.", err));
                true
            }
        };

        let detected = outcome?;
        tracing::info!(
            "Request {}: {} object(s) in {:.1}ms",
            request_id,
            detected.count,
            detected.inference_ms
        );

        Ok(DetectionReport {
            request_id,
            created_at: Utc::now(),
            count: detected.count,
            class_counts: detected.class_counts,
            detections: detected.detections,
            artifact_path: Some(detected.artifact),
            confidence: self.confidence,
            inference_ms: detected.inference_ms,
            cleanup_failed,
        })
    }

    /// Infer on the staged file, then present the artifact and count.
    fn detect_staged(
        &self,
        staged_path: &Path,
        surface: &mut dyn PresentationSurface,
    ) -> Result<Detected, PipelineError> {
        surface.show_text(WORKING_MESSAGE);

        let start = Instant::now();
        let result = self
            .engine
            .predict(staged_path, self.confidence)
            .map_err(|e| PipelineError::Inference(format!("{:#}", e)))?;
        let inference_ms = start.elapsed().as_secs_f64() * 1000.0;

        let artifact = self.engine.artifact_path(&result);
        let artifact_found = artifact.is_file();
        if artifact_found {
            surface.show_image(ImageSource::Path(artifact.clone()), DETECTED_CAPTION);
        }

        let count = result.count();
        let class_counts = result.class_counts();
        surface.show_text(&format!("{} object(s) detected", count));
        if count > 0 {
            let breakdown = class_counts
                .iter()
                .map(|(name, n)| format!("{}: {}", name, n))
                .collect::<Vec<_>>()
                .join(", ");
            surface.show_text(&breakdown);
        }

        if !artifact_found {
            return Err(PipelineError::MissingArtifact { path: artifact });
        }

        Ok(Detected {
            count,
            class_counts,
            detections: result.detections,
            artifact,
            inference_ms,
        })
    }
}

struct Detected {
    count: usize,
    class_counts: BTreeMap<String, usize>,
    detections: Vec<Detection>,
    artifact: PathBuf,
    inference_ms: f64,
}
