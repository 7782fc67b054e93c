use anyhow::{Context, Result};
use inventory_detector::cli::Args;
use inventory_detector::pipeline::annotate::Annotator;
use inventory_detector::pipeline::detection::ObjectDetector;
use inventory_detector::pipeline::orchestrator::DetectionPipeline;
use inventory_detector::pipeline::staging::StagingArea;
use inventory_detector::web::server::{run_server, AppState};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let args = Args::parse_args();

    let staging = StagingArea::new(args.staging_dir())?;
    let swept = staging.sweep()?;
    if swept > 0 {
        info!("Removed {} stale staged upload(s)", swept);
    }

    info!("Loading model from {}", args.model);
    let annotator = match &args.label_font {
        Some(path) => Annotator::with_font_file(path)?,
        None => Annotator::new(),
    };
    let detector = ObjectDetector::new(&args.model, &args.output_root)
        .with_context(|| format!("Failed to load model: {}", args.model))?
        .with_annotator(annotator);

    let pipeline = DetectionPipeline::new(Arc::new(detector), staging, args.confidence);
    let state = AppState::new(pipeline, &args);

    run_server(args.host, args.port, state).await?;

    Ok(())
}
