use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1", env = "INVENTORY_DETECTOR_HOST")]
    pub host: IpAddr,

    /// Port to bind to
    #[arg(long, default_value_t = 12206, env = "INVENTORY_DETECTOR_PORT")]
    pub port: u16,

    /// Path to the RT-DETR model file
    #[arg(long, env = "INVENTORY_DETECTOR_MODEL")]
    pub model: String,

    /// Root directory the engine writes annotated images into
    #[arg(long, default_value = "runs/detect", env = "INVENTORY_DETECTOR_OUTPUT_ROOT")]
    pub output_root: PathBuf,

    /// Directory for transient staged uploads
    #[arg(long, env = "INVENTORY_DETECTOR_STAGING_DIR")]
    pub staging_dir: Option<PathBuf>,

    /// Minimum confidence for a detection to be kept
    #[arg(
        long,
        default_value_t = 0.3,
        value_parser = parse_confidence,
        env = "INVENTORY_DETECTOR_CONFIDENCE"
    )]
    pub confidence: f32,

    /// TrueType/OpenType font for box labels; outlines only when unset
    #[arg(long, env = "INVENTORY_DETECTOR_LABEL_FONT")]
    pub label_font: Option<PathBuf>,

    /// Largest accepted upload, in MiB
    #[arg(long, default_value_t = 200, env = "INVENTORY_DETECTOR_MAX_UPLOAD_MB")]
    pub max_upload_mb: usize,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("inventory-detector"))
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

fn parse_confidence(s: &str) -> Result<f32, String> {
    let value: f32 = s
        .parse()
        .map_err(|_| format!("`{}` is not a number", s))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("confidence must be within [0, 1], got {}", value))
    }
}
