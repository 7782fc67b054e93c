use std::path::PathBuf;
use thiserror::Error;

/// Failures the pipeline reports inline to the user.
///
/// None of these terminate the process and none are retried automatically.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The upload is not a decodable image, or has an unsupported extension.
    #[error("Could not read the uploaded image: {0}")]
    Decode(String),

    /// Writing or removing the staged upload failed (unwritable or full storage).
    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),

    /// The inference engine returned an error.
    #[error("Detection failed: {0}")]
    Inference(String),

    /// The engine finished but its annotated copy is not where expected.
    #[error("Detection failed: annotated image not found at {}", .path.display())]
    MissingArtifact { path: PathBuf },
}

impl PipelineError {
    /// Stable identifier used by the HTTP layer.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Decode(_) => "decode",
            PipelineError::Io(_) => "io",
            PipelineError::Inference(_) => "inference",
            PipelineError::MissingArtifact { .. } => "missing_artifact",
        }
    }
}
