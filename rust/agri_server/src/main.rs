use std::sync::Arc;

use agri_server::inference::{OnnxCropRecommender, OnnxDiseaseDetector};
use agri_server::{build_router, AppState, ModelPaths};
use anyhow::{Context, Result};
use common::http::{DOCS_PATH, HEALTH_PATH, SERVICE_NAME};
use common::AppConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "config/agri.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("agri_server=info,tower_http=info")),
        )
        .init();

    info!("======================================================================");
    info!("{} - Starting", SERVICE_NAME);
    info!("======================================================================");

    let config_path =
        std::env::var("AGRI_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    info!("Config: {}", config_path);

    let config = AppConfig::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    let crop = OnnxCropRecommender::load(&config.crop_model)
        .context("Failed to load crop recommendation model")?;
    let disease = OnnxDiseaseDetector::load(&config.disease_model)
        .context("Failed to load disease detection model")?;

    let upload_dir = config.server.upload_dir();
    std::fs::create_dir_all(&upload_dir)
        .with_context(|| format!("Failed to create upload directory {}", upload_dir.display()))?;
    info!("Upload directory: {}", upload_dir.display());

    let state = Arc::new(
        AppState::new(Arc::new(crop), Arc::new(disease), upload_dir).with_model_paths(
            ModelPaths {
                crop: Some(config.crop_model.path.clone()),
                disease: Some(config.disease_model.path.clone()),
            },
        ),
    );

    let app = build_router(state, config.server.max_upload_bytes);

    let address = config.server.bind_address();
    info!("Server ready on http://{}", address);
    info!("API documentation: http://{}{}", address, DOCS_PATH);
    info!("Health check: http://{}{}", address, HEALTH_PATH);
    info!("======================================================================");

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
