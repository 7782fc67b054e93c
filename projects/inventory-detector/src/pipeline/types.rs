use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Upload extensions the dashboard accepts.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Pixel-space bounding box (top-left corner plus size)
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

/// A single classified box reported by the inference engine
#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    pub bbox: BBox,
    pub confidence: f32,
    pub class_id: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

impl Detection {
    pub fn label(&self) -> String {
        self.class_name
            .clone()
            .unwrap_or_else(|| format!("class {}", self.class_id))
    }
}

/// Raw upload as received from the client.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedImage {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            file_name: None,
            content_type: None,
            bytes,
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Lower-cased extension of the declared file name, if any.
    pub fn extension(&self) -> Option<String> {
        self.file_name
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
    }

    /// MIME type used to echo the raw upload back to the user.
    pub fn display_mime(&self) -> String {
        if let Some(ct) = self.content_type.as_deref().filter(|ct| ct.starts_with("image/")) {
            return ct.to_string();
        }
        self.file_name
            .as_deref()
            .and_then(|name| mime_guess::from_path(name).first())
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string())
    }
}

/// Upload decoded and coerced to 8-bit RGB.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub image: RgbImage,
}

impl NormalizedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Output of one `predict` call.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
    /// Directory the engine wrote its annotated copy into
    pub save_dir: PathBuf,
    /// Path the engine was asked to read
    pub source_path: PathBuf,
}

impl DetectionResult {
    pub fn count(&self) -> usize {
        self.detections.len()
    }

    /// Number of detections per class label, ordered by label.
    pub fn class_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for det in &self.detections {
            *counts.entry(det.label()).or_insert(0) += 1;
        }
        counts
    }
}

/// Outcome of a single pipeline run, returned to callers and serialized by the API.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub request_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub count: usize,
    pub class_counts: BTreeMap<String, usize>,
    pub detections: Vec<Detection>,
    #[serde(skip)]
    pub artifact_path: Option<PathBuf>,
    pub confidence: f32,
    pub inference_ms: f64,
    /// The staged upload could not be removed; the user was told to retry.
    pub cleanup_failed: bool,
}
