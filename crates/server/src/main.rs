use server::config;
use server::routes;

use std::sync::Arc;

use critical_moments::{AnalysisConfig, AnalysisService, StockfishOracle};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env();
    let analysis_config = AnalysisConfig::from_env();
    analysis_config.log_summary();
    analysis_config.validate()?;

    let oracle = Arc::new(StockfishOracle::from_config(&analysis_config));
    // Jobs still start without an engine; each position just yields nothing
    if let Err(e) = oracle.preflight().await {
        tracing::warn!(error = %e, "Stockfish preflight failed");
    }
    let service = AnalysisService::new(&analysis_config, oracle);

    // CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::router(service, analysis_config)
        .layer(CompressionLayer::new())
        .layer(cors);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
