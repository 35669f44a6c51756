//! Critical-moment analyzer CLI
//!
//! Analyzes every game of one PGN file with a local Stockfish pool and
//! prints the games with their critical moments as JSON.
//!
//! Usage: critical-moments <file.pgn> [--workers N]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::info;

use critical_moments::{AnalysisConfig, AnalysisService, JobResults, StockfishOracle};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Parse --workers N from CLI args
fn parse_workers(args: &[String]) -> Option<usize> {
    args.iter()
        .position(|a| a == "--workers")
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
        .filter(|&n: &usize| n >= 1)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().collect();
    let Some(pgn_path) = args.get(1).filter(|a| !a.starts_with("--")) else {
        let prog = args.first().map_or("critical-moments", String::as_str);
        eprintln!("Usage: {prog} <file.pgn> [--workers N]");
        std::process::exit(1);
    };

    let mut config = AnalysisConfig::from_env();
    if let Some(workers) = parse_workers(&args) {
        config.worker_count = workers;
    }
    config.log_summary();
    config.validate()?;

    let corpus = tokio::fs::read_to_string(pgn_path)
        .await
        .with_context(|| format!("Failed to read {pgn_path}"))?;
    let filename = Path::new(pgn_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());

    let oracle = Arc::new(StockfishOracle::from_config(&config));
    oracle
        .preflight()
        .await
        .context("Stockfish is not usable; check STOCKFISH_PATH")?;
    let service = AnalysisService::new(&config, oracle);
    let job_id = service.submit(corpus, filename);

    let mut last_progress = None;
    loop {
        let Some(snapshot) = service.poll(&job_id) else {
            bail!("Job {job_id} disappeared");
        };
        if last_progress != Some(snapshot.progress) {
            info!(
                status = ?snapshot.status,
                progress = snapshot.progress,
                done = snapshot.current_move,
                total = snapshot.total_moves,
                "Progress"
            );
            last_progress = Some(snapshot.progress);
        }
        if snapshot.status.is_terminal() {
            break;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    match service.fetch_results(&job_id) {
        Some(JobResults::Completed(games)) => {
            println!("{}", serde_json::to_string_pretty(&games)?);
            Ok(())
        }
        Some(JobResults::Failed(message)) => bail!(message),
        Some(JobResults::StillProcessing) | None => bail!("Job {job_id} ended without results"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_workers() {
        let args: Vec<String> = ["prog", "games.pgn", "--workers", "6"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(parse_workers(&args), Some(6));

        let args: Vec<String> = ["prog", "games.pgn", "--workers", "0"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(parse_workers(&args), None);
    }
}
