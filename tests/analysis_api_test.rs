/// HTTP tests for the analysis routes, driven through the router in-process.
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use critical_moments::fakes::ScriptedOracle;
use critical_moments::stockfish::EngineScore;
use critical_moments::{AnalysisConfig, AnalysisService};

const PGN: &str = r#"[White "Alice"]
[Black "Bob"]
[Result "1-0"]

1. e4 e5 2. Nf3 1-0
"#;

fn app(delay: Duration) -> Router {
    let config = AnalysisConfig {
        worker_count: 4,
        probe_time_budget: Duration::from_millis(5),
        candidate_time_budget: Duration::from_millis(5),
        oracle_call_timeout: Duration::from_secs(5),
        ..AnalysisConfig::default()
    };
    let oracle = ScriptedOracle::new()
        .with_lines(
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
            vec![("e2e4", EngineScore::Cp(170)), ("d2d4", EngineScore::Cp(20))],
        )
        .with_fallback(vec![("0000", EngineScore::Cp(15)), ("0000", EngineScore::Cp(5))])
        .with_delay(delay);
    let service = AnalysisService::new(&config, Arc::new(oracle));
    server::routes::router(service, config)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn submit(body: Value) -> Request<Body> {
    Request::post("/api/analysis")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn wait_for_results(app: &Router, id: &str) -> Value {
    for _ in 0..500 {
        let (status, body) = send(app, get(&format!("/api/analysis/{id}/results"))).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] != "still_processing" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("analysis {id} did not finish");
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(&app(Duration::ZERO), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_unknown_analysis_is_404() {
    let app = app(Duration::ZERO);
    for uri in ["/api/analysis/nope/progress", "/api/analysis/nope/results"] {
        let (status, body) = send(&app, get(uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "detail": "Analysis not found" }));
    }
}

#[tokio::test]
async fn test_submit_rejects_bad_input() {
    let app = app(Duration::ZERO);

    let (status, body) = send(&app, submit(json!({ "pgn": PGN, "filename": "games.txt" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Only .pgn files are accepted");

    let (status, body) = send(&app, submit(json!({ "pgn": "  \n", "filename": "games.pgn" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "PGN content is empty");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_submit_poll_and_fetch() {
    let app = app(Duration::ZERO);

    let (status, body) = send(&app, submit(json!({ "pgn": PGN, "filename": "Club.PGN" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["filename"], "Club.PGN");
    assert_eq!(body["workers"], 4);
    assert_eq!(body["eval_difference_threshold"], 100);
    let id = body["analysis_id"].as_str().unwrap().to_string();

    let results = wait_for_results(&app, &id).await;
    assert_eq!(results["status"], "completed");
    assert_eq!(results["filename"], "Club.PGN");
    let game = &results["results"][0];
    assert_eq!(game["game_number"], 1);
    assert_eq!(game["white"], "Alice");
    assert_eq!(game["result"], "1-0");
    let moment = &game["critical_moments"][0];
    assert_eq!(moment["ply"], 1);
    assert_eq!(moment["turn"], "white");
    assert_eq!(moment["best_move"], "e4");
    assert_eq!(moment["best_move_eval"], "+170");
    assert_eq!(moment["second_best_move"], "d4");

    let (status, progress) = send(&app, get(&format!("/api/analysis/{id}/progress"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["status"], "completed");
    assert_eq!(progress["progress"], 100);
    assert_eq!(progress["total_moves"], 3);
    assert_eq!(progress["current_move"], 3);
    assert_eq!(progress["job_id"], id.as_str());
    assert!(progress["error"].is_null());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_results_while_processing() {
    let app = app(Duration::from_millis(300));

    let (_, body) = send(&app, submit(json!({ "pgn": PGN }))).await;
    let id = body["analysis_id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, get(&format!("/api/analysis/{id}/results"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "still_processing" }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalid_corpus_reports_error() {
    let app = app(Duration::ZERO);

    let (status, body) = send(&app, submit(json!({ "pgn": "{ only a comment }" }))).await;
    assert_eq!(status, StatusCode::OK);
    let id = body["analysis_id"].as_str().unwrap().to_string();

    let results = wait_for_results(&app, &id).await;
    assert_eq!(
        results,
        json!({ "status": "error", "error": "PGN corpus is invalid or empty" })
    );
}
