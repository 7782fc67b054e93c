use crate::cli::Args;
use crate::pipeline::orchestrator::DetectionPipeline;
use crate::web::api::{config_handler, detect_handler, health_handler};
use crate::web::assets::{index_handler, static_handler};
use crate::web::panels::ARTIFACT_ROUTE;
use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::{IpAddr, SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// State shared by all HTTP handlers.
pub struct AppState {
    pub pipeline: DetectionPipeline,
    pub artifact_root: PathBuf,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(pipeline: DetectionPipeline, args: &Args) -> Arc<Self> {
        Arc::new(Self {
            pipeline,
            artifact_root: args.output_root.clone(),
            max_upload_bytes: args.max_upload_bytes(),
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let artifacts = ServeDir::new(&state.artifact_root);
    let body_limit = state.max_upload_bytes;

    Router::new()
        .route("/", get(index_handler))
        .route(
            "/api/detect",
            post(detect_handler).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/api/config", get(config_handler))
        .route("/api/health", get(health_handler))
        .nest_service(ARTIFACT_ROUTE, artifacts)
        .route("/*path", get(static_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(host: IpAddr, port: u16, state: Arc<AppState>) -> Result<()> {
    let mut current_port = port;
    let listener = loop {
        let addr = SocketAddr::new(host, current_port);
        match TcpListener::bind(addr) {
            Ok(listener) => {
                // Tokio requires a non-blocking socket
                listener.set_nonblocking(true)?;
                info!("Successfully bound to {}", addr);
                break listener;
            }
            Err(e) => {
                warn!("Failed to bind to {}: {}. Trying next port...", addr, e);
                current_port = current_port.wrapping_add(1);
                if current_port == 0 {
                    return Err(anyhow::anyhow!("No available ports found"));
                }
            }
        }
    };

    let app = router(state);

    let tokio_listener = tokio::net::TcpListener::from_std(listener)?;
    info!(
        "Inventory Detector server started on http://{:?}",
        tokio_listener.local_addr()?
    );

    axum::serve(tokio_listener, app).await?;

    Ok(())
}
