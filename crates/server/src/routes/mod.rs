pub mod analysis;
pub mod health;

use axum::{
    routing::{get, post},
    Extension, Router,
};
use critical_moments::{AnalysisConfig, AnalysisService};

/// All routes with their shared state; transport layers are added by the binary.
pub fn router(service: AnalysisService, analysis_config: AnalysisConfig) -> Router {
    Router::new()
        // Health
        .route("/health", get(health::health_check))
        // Analysis jobs
        .route("/api/analysis", post(analysis::submit_analysis))
        .route("/api/analysis/{analysis_id}/progress", get(analysis::get_progress))
        .route("/api/analysis/{analysis_id}/results", get(analysis::get_results))
        // Shared state
        .layer(Extension(service))
        .layer(Extension(analysis_config))
}
