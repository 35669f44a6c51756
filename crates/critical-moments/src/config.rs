//! Analysis configuration from environment variables

use std::env;
use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use crate::detector::DetectionRules;
use crate::error::AnalysisError;

/// Minimum evaluation pool size regardless of host parallelism.
pub const MIN_WORKERS: usize = 4;

/// Bounds for `mate_score_clamp`: above any realistic centipawn score, far
/// below `i32` limits.
pub const MIN_MATE_SCORE_CLAMP: i32 = 1_001;
pub const MAX_MATE_SCORE_CLAMP: i32 = 100_000;

#[derive(Clone, Debug)]
pub struct AnalysisConfig {
    /// Path to Stockfish binary
    pub stockfish_path: String,

    /// Concurrent evaluation workers per job
    pub worker_count: usize,

    /// Minimum gap between best and second-best move, in centipawns
    pub eval_gap_threshold_cp: i32,

    /// Search time for the single-line probe
    pub probe_time_budget: Duration,

    /// Search time for the multi-line candidate search
    pub candidate_time_budget: Duration,

    /// Number of ranked lines requested from the engine
    pub candidate_count: u32,

    /// Magnitude a forced mate is clamped to
    pub mate_score_clamp: i32,

    /// Hash table size per engine session, in MB
    pub engine_hash_mb: u32,

    /// Upper bound on one whole engine session (spawn, probe, candidates)
    pub oracle_call_timeout: Duration,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            stockfish_path: "/usr/local/bin/stockfish".to_string(),
            worker_count: default_worker_count(),
            eval_gap_threshold_cp: 100,
            probe_time_budget: Duration::from_millis(300),
            candidate_time_budget: Duration::from_millis(500),
            candidate_count: 3,
            mate_score_clamp: 10_000,
            engine_hash_mb: 64,
            oracle_call_timeout: Duration::from_secs(10),
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let stockfish_path = env::var("STOCKFISH_PATH").unwrap_or(defaults.stockfish_path);

        let worker_count = env_parse::<usize>("ANALYSIS_WORKERS")
            .filter(|&n| n >= 1)
            .unwrap_or(defaults.worker_count);

        let eval_gap_threshold_cp =
            env_parse("EVAL_GAP_THRESHOLD_CP").unwrap_or(defaults.eval_gap_threshold_cp);

        let probe_time_budget = env_parse("PROBE_TIME_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.probe_time_budget);

        let candidate_time_budget = env_parse("CANDIDATE_TIME_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.candidate_time_budget);

        // Two lines are the least the detector can compare
        let candidate_count = env_parse::<u32>("CANDIDATE_LINES")
            .map(|n| n.max(2))
            .unwrap_or(defaults.candidate_count);

        let mate_score_clamp = env_parse("MATE_SCORE_CLAMP").unwrap_or(defaults.mate_score_clamp);

        let engine_hash_mb = env_parse("ENGINE_HASH_MB").unwrap_or(defaults.engine_hash_mb);

        let oracle_call_timeout = env_parse("ORACLE_CALL_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.oracle_call_timeout);

        Self {
            stockfish_path,
            worker_count,
            eval_gap_threshold_cp,
            probe_time_budget,
            candidate_time_budget,
            candidate_count,
            mate_score_clamp,
            engine_hash_mb,
            oracle_call_timeout,
        }
    }

    pub fn detection_rules(&self) -> DetectionRules {
        DetectionRules {
            gap_threshold_cp: self.eval_gap_threshold_cp,
            mate_score_clamp: self.mate_score_clamp,
        }
    }

    /// Reject settings the pool or detector cannot run with.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.worker_count == 0 {
            return Err(AnalysisError::Config("worker_count must be at least 1".into()));
        }
        if self.candidate_count < 2 {
            return Err(AnalysisError::Config("candidate_count must be at least 2".into()));
        }
        if self.eval_gap_threshold_cp < 0 {
            return Err(AnalysisError::Config(
                "eval_gap_threshold_cp must not be negative".into(),
            ));
        }
        if !(MIN_MATE_SCORE_CLAMP..=MAX_MATE_SCORE_CLAMP).contains(&self.mate_score_clamp) {
            return Err(AnalysisError::Config(format!(
                "mate_score_clamp must be within {MIN_MATE_SCORE_CLAMP}..={MAX_MATE_SCORE_CLAMP}"
            )));
        }
        if self.oracle_call_timeout.is_zero() {
            return Err(AnalysisError::Config("oracle_call_timeout must be positive".into()));
        }
        Ok(())
    }

    /// Log the effective settings and flag a missing engine binary.
    pub fn log_summary(&self) {
        info!(
            stockfish_path = %self.stockfish_path,
            workers = self.worker_count,
            threshold_cp = self.eval_gap_threshold_cp,
            probe_ms = self.probe_time_budget.as_millis() as u64,
            candidate_ms = self.candidate_time_budget.as_millis() as u64,
            "Analysis config loaded"
        );
        if !Path::new(&self.stockfish_path).exists() {
            warn!(
                stockfish_path = %self.stockfish_path,
                "Stockfish binary not found; set STOCKFISH_PATH"
            );
        }
    }
}

fn default_worker_count() -> usize {
    num_cpus::get().max(MIN_WORKERS)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
