use crate::pipeline::error::PipelineError;
use crate::pipeline::types::{DetectionReport, UploadedImage, ACCEPTED_EXTENSIONS};
use crate::web::panels::{Panel, PanelSurface};
use crate::web::server::AppState;
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

/// Multipart field carrying the image.
pub const UPLOAD_FIELD: &str = "image";

#[derive(Serialize)]
pub struct ErrorInfo {
    pub kind: &'static str,
    pub message: String,
}

impl From<&PipelineError> for ErrorInfo {
    fn from(err: &PipelineError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Serialize)]
pub struct DetectResponse {
    pub panels: Vec<Panel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<DetectionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Serialize)]
pub struct ConfigInfo {
    pub confidence: f32,
    pub accepted_extensions: Vec<String>,
    pub max_upload_bytes: usize,
}

#[derive(Serialize)]
pub struct HealthInfo {
    pub status: &'static str,
    pub pending_staged: usize,
}

pub async fn detect_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<DetectResponse>, (StatusCode, String)> {
    let upload = read_upload(multipart).await?;

    let pipeline = state.pipeline.clone();
    let artifact_root = state.artifact_root.clone();

    // Inference blocks; keep it off the async workers
    let response = tokio::task::spawn_blocking(move || {
        let mut surface = PanelSurface::new(artifact_root);
        let outcome = pipeline.handle_upload(upload, &mut surface);
        let (report, error) = match outcome {
            Ok(report) => (report, None),
            Err(e) => (None, Some(ErrorInfo::from(&e))),
        };
        DetectResponse {
            panels: surface.into_panels(),
            report,
            error,
        }
    })
    .await
    .map_err(|e| {
        tracing::error!("Detection task panicked: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Detection task failed".to_string(),
        )
    })?;

    Ok(Json(response))
}

/// Pull the image field out of the form. An empty or absent field is no upload.
async fn read_upload(
    mut multipart: Multipart,
) -> Result<Option<UploadedImage>, (StatusCode, String)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let file_name = field
            .file_name()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());
        let content_type = field.content_type().map(|s| s.to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

        if bytes.is_empty() && file_name.is_none() {
            return Ok(None);
        }

        let mut upload = UploadedImage::new(bytes.to_vec());
        upload.file_name = file_name;
        upload.content_type = content_type;
        return Ok(Some(upload));
    }

    Ok(None)
}

pub async fn config_handler(State(state): State<Arc<AppState>>) -> Json<ConfigInfo> {
    Json(ConfigInfo {
        confidence: state.pipeline.confidence(),
        accepted_extensions: ACCEPTED_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        max_upload_bytes: state.max_upload_bytes,
    })
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthInfo> {
    Json(HealthInfo {
        status: "ok",
        pending_staged: state.pipeline.staging().pending().len(),
    })
}
