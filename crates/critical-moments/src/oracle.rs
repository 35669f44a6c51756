//! Position oracle: the engine seam and the per-position client around it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chess_core::PositionTask;
use tracing::{debug, warn};

use crate::config::AnalysisConfig;
use crate::detector::{CandidateLine, Score};
use crate::error::{AnalysisError, OracleError};
use crate::stockfish::{PvLine, StockfishEngine};

/// Source of engine sessions.
///
/// A session is used by exactly one outstanding call and must not share
/// mutable state with any other session.
#[async_trait]
pub trait PositionOracle: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn OracleSession>, OracleError>;
}

#[async_trait]
pub trait OracleSession: Send {
    /// Ranked lines for `fen`, best first, at most `line_count` of them.
    async fn evaluate(
        &mut self,
        fen: &str,
        line_count: u32,
        time_budget: Duration,
    ) -> Result<Vec<PvLine>, OracleError>;

    /// Release the session. Dropping without closing must also release it.
    async fn close(&mut self);
}

/// Upper bound on a preflight when no config is at hand.
const DEFAULT_PREFLIGHT_TIMEOUT: Duration = Duration::from_secs(10);

/// Launches a fresh Stockfish process per session.
#[derive(Debug, Clone)]
pub struct StockfishOracle {
    path: String,
    hash_mb: u32,
    preflight_timeout: Duration,
}

impl StockfishOracle {
    pub fn new(path: impl Into<String>, hash_mb: u32) -> Self {
        Self {
            path: path.into(),
            hash_mb,
            preflight_timeout: DEFAULT_PREFLIGHT_TIMEOUT,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.stockfish_path.clone(), config.engine_hash_mb)
            .with_preflight_timeout(config.oracle_call_timeout)
    }

    pub fn with_preflight_timeout(mut self, timeout: Duration) -> Self {
        self.preflight_timeout = timeout;
        self
    }

    /// Start and stop one engine to confirm the binary speaks UCI.
    ///
    /// Bounded by the preflight timeout; an engine that never answers the
    /// handshake is killed when the session is dropped.
    pub async fn preflight(&self) -> Result<(), AnalysisError> {
        let handshake = async {
            let mut session = self.open_session().await?;
            session.close().await;
            Ok::<(), OracleError>(())
        };
        tokio::time::timeout(self.preflight_timeout, handshake)
            .await
            .map_err(|_| OracleError::Timeout(self.preflight_timeout))??;
        Ok(())
    }
}

#[async_trait]
impl PositionOracle for StockfishOracle {
    async fn open_session(&self) -> Result<Box<dyn OracleSession>, OracleError> {
        let engine = StockfishEngine::new(&self.path, self.hash_mb).await?;
        Ok(Box::new(engine))
    }
}

#[async_trait]
impl OracleSession for StockfishEngine {
    async fn evaluate(
        &mut self,
        fen: &str,
        line_count: u32,
        time_budget: Duration,
    ) -> Result<Vec<PvLine>, OracleError> {
        self.evaluate_multipv(fen, line_count, time_budget).await
    }

    async fn close(&mut self) {
        self.quit().await;
    }
}

/// Search budgets for one position.
#[derive(Debug, Clone, Copy)]
pub struct OracleSettings {
    pub probe_time_budget: Duration,
    pub candidate_time_budget: Duration,
    pub candidate_count: u32,
    pub call_timeout: Duration,
}

impl From<&AnalysisConfig> for OracleSettings {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            probe_time_budget: config.probe_time_budget,
            candidate_time_budget: config.candidate_time_budget,
            candidate_count: config.candidate_count,
            call_timeout: config.oracle_call_timeout,
        }
    }
}

/// Evaluates one position per call in its own session.
#[derive(Clone)]
pub struct OracleClient {
    oracle: Arc<dyn PositionOracle>,
    settings: OracleSettings,
}

impl OracleClient {
    pub fn new(oracle: Arc<dyn PositionOracle>, settings: OracleSettings) -> Self {
        Self { oracle, settings }
    }

    /// Ranked White-oriented candidate lines for the task's position.
    ///
    /// `None` when the probe finds nothing or the call fails; failures are
    /// logged here and never propagate.
    pub async fn evaluate(&self, task: &PositionTask) -> Option<Vec<CandidateLine>> {
        let fen = task.fen();
        let outcome = tokio::time::timeout(self.settings.call_timeout, self.run_session(&fen)).await;

        let lines = match outcome {
            Ok(Ok(lines)) => lines?,
            Ok(Err(e)) => {
                warn!(game = task.game_number, ply = task.ply, error = %e, "Position evaluation failed");
                return None;
            }
            Err(_) => {
                let e = OracleError::Timeout(self.settings.call_timeout);
                warn!(game = task.game_number, ply = task.ply, error = %e, "Position evaluation failed");
                return None;
            }
        };

        Some(
            lines
                .into_iter()
                .filter_map(|line| {
                    let uci = line.pv.into_iter().next()?;
                    Some(CandidateLine {
                        uci,
                        score: line.score.map(|s| Score::from_engine(s, task.turn)),
                    })
                })
                .collect(),
        )
    }

    /// Probe, then search candidates; the session is closed on every path.
    async fn run_session(&self, fen: &str) -> Result<Option<Vec<PvLine>>, OracleError> {
        let mut session = self.oracle.open_session().await?;
        let result = self.probe_and_search(session.as_mut(), fen).await;
        session.close().await;
        result
    }

    async fn probe_and_search(
        &self,
        session: &mut dyn OracleSession,
        fen: &str,
    ) -> Result<Option<Vec<PvLine>>, OracleError> {
        let probe = session
            .evaluate(fen, 1, self.settings.probe_time_budget)
            .await?;
        if probe.is_empty() {
            debug!(fen, "Probe returned nothing, skipping position");
            return Ok(None);
        }

        let lines = session
            .evaluate(
                fen,
                self.settings.candidate_count,
                self.settings.candidate_time_budget,
            )
            .await?;
        Ok(Some(lines))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedOracle;
    use crate::stockfish::EngineScore;
    use chess_core::{enumerate_positions, load_corpus};

    fn settings() -> OracleSettings {
        OracleSettings {
            probe_time_budget: Duration::from_millis(10),
            candidate_time_budget: Duration::from_millis(10),
            candidate_count: 3,
            call_timeout: Duration::from_secs(2),
        }
    }

    fn task(pgn: &str, idx: usize) -> PositionTask {
        enumerate_positions(&load_corpus(pgn).unwrap()).swap_remove(idx)
    }

    #[tokio::test]
    async fn test_lines_are_white_oriented() {
        let black_to_move = task("1. e4 e5 *", 1);
        let oracle = ScriptedOracle::new().with_lines(
            &black_to_move.fen(),
            vec![("e7e5", EngineScore::Cp(40)), ("c7c5", EngineScore::Mate(2))],
        );
        let client = OracleClient::new(Arc::new(oracle.clone()), settings());

        let lines = client.evaluate(&black_to_move).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].uci, "e7e5");
        assert_eq!(lines[0].score, Some(Score::Cp(-40)));
        assert_eq!(lines[1].score, Some(Score::Mate(-2)));
        assert_eq!(oracle.sessions_opened(), 1);
        assert_eq!(oracle.sessions_closed(), 1);
    }

    #[tokio::test]
    async fn test_empty_probe_skips_position() {
        let t = task("1. e4 *", 0);
        let oracle = ScriptedOracle::new();
        let client = OracleClient::new(Arc::new(oracle.clone()), settings());

        assert!(client.evaluate(&t).await.is_none());
        assert_eq!(oracle.sessions_closed(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_contained_and_session_released() {
        let t = task("1. e4 *", 0);
        let oracle = ScriptedOracle::new().failing_on(&t.fen());
        let client = OracleClient::new(Arc::new(oracle.clone()), settings());

        assert!(client.evaluate(&t).await.is_none());
        assert_eq!(oracle.sessions_opened(), 1);
        assert_eq!(oracle.sessions_closed(), 1);
    }

    #[tokio::test]
    async fn test_preflight_reports_missing_binary() {
        let oracle = StockfishOracle::new("/nonexistent/stockfish", 16);
        let err = oracle.preflight().await.unwrap_err();
        assert!(matches!(err, AnalysisError::Oracle(OracleError::Unavailable(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_preflight_gives_up_on_silent_engine() {
        // Echoes the handshake back but never says uciok
        let oracle = StockfishOracle::new("/bin/cat", 16)
            .with_preflight_timeout(Duration::from_millis(200));

        let outcome = tokio::time::timeout(Duration::from_secs(5), oracle.preflight()).await;
        let err = outcome.expect("preflight must respect its own timeout").unwrap_err();
        assert!(matches!(err, AnalysisError::Oracle(OracleError::Timeout(_))));
    }

    #[test]
    fn test_preflight_timeout_follows_config() {
        let config = AnalysisConfig {
            oracle_call_timeout: Duration::from_millis(1_500),
            ..AnalysisConfig::default()
        };
        let oracle = StockfishOracle::from_config(&config);
        assert_eq!(oracle.preflight_timeout, Duration::from_millis(1_500));
    }

    #[tokio::test]
    async fn test_timeout_yields_none() {
        let t = task("1. e4 *", 0);
        let oracle = ScriptedOracle::new()
            .with_lines(&t.fen(), vec![("e2e4", EngineScore::Cp(20))])
            .with_delay(Duration::from_millis(500));
        let client = OracleClient::new(
            Arc::new(oracle.clone()),
            OracleSettings {
                call_timeout: Duration::from_millis(50),
                ..settings()
            },
        );

        assert!(client.evaluate(&t).await.is_none());
        // Dropped mid-call: released through Drop rather than close()
        assert_eq!(oracle.sessions_live(), 0);
    }
}
