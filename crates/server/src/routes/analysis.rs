use axum::{extract::Path, Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use critical_moments::{AnalysisConfig, AnalysisService, JobId, JobResults, JobSnapshot};

use crate::error::AppError;

const ALLOWED_EXTENSIONS: &[&str] = &["pgn"];

#[derive(Deserialize)]
pub struct SubmitRequest {
    pub pgn: String,
    pub filename: Option<String>,
}

/// POST /api/analysis
pub async fn submit_analysis(
    Extension(service): Extension<AnalysisService>,
    Extension(config): Extension<AnalysisConfig>,
    Json(body): Json<SubmitRequest>,
) -> Result<Json<JsonValue>, AppError> {
    if let Some(name) = body.filename.as_deref() {
        if !allowed_file(name) {
            return Err(AppError::BadRequest("Only .pgn files are accepted".into()));
        }
    }
    if body.pgn.trim().is_empty() {
        return Err(AppError::BadRequest("PGN content is empty".into()));
    }

    let analysis_id = service.submit(body.pgn, body.filename.clone());

    Ok(Json(json!({
        "analysis_id": analysis_id,
        "filename": body.filename,
        "workers": config.worker_count,
        "eval_difference_threshold": config.eval_gap_threshold_cp,
    })))
}

/// GET /api/analysis/{analysis_id}/progress
pub async fn get_progress(
    Extension(service): Extension<AnalysisService>,
    Path(analysis_id): Path<String>,
) -> Result<Json<JobSnapshot>, AppError> {
    service
        .poll(&JobId(analysis_id))
        .map(Json)
        .ok_or_else(not_found)
}

/// GET /api/analysis/{analysis_id}/results
pub async fn get_results(
    Extension(service): Extension<AnalysisService>,
    Path(analysis_id): Path<String>,
) -> Result<Json<JsonValue>, AppError> {
    let id = JobId(analysis_id);
    let results = service.fetch_results(&id).ok_or_else(not_found)?;
    let filename = service.poll(&id).and_then(|s| s.filename);

    let body = match results {
        JobResults::Completed(games) => json!({
            "status": "completed",
            "filename": filename,
            "results": games,
        }),
        JobResults::Failed(message) => json!({
            "status": "error",
            "error": message,
        }),
        JobResults::StillProcessing => json!({ "status": "still_processing" }),
    };
    Ok(Json(body))
}

fn not_found() -> AppError {
    AppError::NotFound("Analysis not found".into())
}

/// Accept only names with an allowed extension, case-insensitive.
fn allowed_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ALLOWED_EXTENSIONS.iter().any(|a| ext.eq_ignore_ascii_case(a)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_file() {
        assert!(allowed_file("games.pgn"));
        assert!(allowed_file("Club.Games.PGN"));
        assert!(!allowed_file("games.txt"));
        assert!(!allowed_file("pgn"));
        assert!(!allowed_file(""));
    }
}
