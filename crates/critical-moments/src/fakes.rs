//! In-memory oracle fake (testing only)
//!
//! `ScriptedOracle` answers from a fixed FEN → lines table and records how
//! sessions were used, so pool and job behavior can be checked without a
//! Stockfish binary.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::OracleError;
use crate::oracle::{OracleSession, PositionOracle};
use crate::stockfish::{EngineScore, PvLine};

#[derive(Clone, Default)]
struct Script {
    lines: HashMap<String, Vec<PvLine>>,
    fallback: Vec<PvLine>,
    failing: HashSet<String>,
    delay: Option<Duration>,
}

#[derive(Default)]
struct Counters {
    opened: AtomicUsize,
    closed: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
    probes: Mutex<HashMap<String, usize>>,
}

#[derive(Clone, Default)]
pub struct ScriptedOracle {
    script: Arc<Script>,
    counters: Arc<Counters>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy-on-write: clones made earlier keep the script they saw.
    fn script_mut(&mut self) -> &mut Script {
        Arc::make_mut(&mut self.script)
    }

    /// Ranked `(uci, score)` lines for one FEN, scores from the side to move.
    pub fn with_lines(mut self, fen: &str, lines: Vec<(&str, EngineScore)>) -> Self {
        self.script_mut()
            .lines
            .insert(fen.to_string(), to_pv_lines(lines));
        self
    }

    /// Lines returned for every FEN without its own entry.
    pub fn with_fallback(mut self, lines: Vec<(&str, EngineScore)>) -> Self {
        self.script_mut().fallback = to_pv_lines(lines);
        self
    }

    pub fn failing_on(mut self, fen: &str) -> Self {
        self.script_mut().failing.insert(fen.to_string());
        self
    }

    /// Sleep before every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.script_mut().delay = Some(delay);
        self
    }

    pub fn sessions_opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    /// Sessions not yet dropped.
    pub fn sessions_live(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    /// Highest number of sessions alive at the same time.
    pub fn max_concurrent_sessions(&self) -> usize {
        self.counters.max_live.load(Ordering::SeqCst)
    }

    /// Probe calls made per FEN.
    pub fn probe_counts(&self) -> HashMap<String, usize> {
        self.counters
            .probes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn to_pv_lines(lines: Vec<(&str, EngineScore)>) -> Vec<PvLine> {
    lines
        .into_iter()
        .map(|(uci, score)| PvLine {
            pv: vec![uci.to_string()],
            score: Some(score),
        })
        .collect()
}

#[async_trait]
impl PositionOracle for ScriptedOracle {
    async fn open_session(&self) -> Result<Box<dyn OracleSession>, OracleError> {
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        let live = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_live.fetch_max(live, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            script: self.script.clone(),
            counters: self.counters.clone(),
        }))
    }
}

struct ScriptedSession {
    script: Arc<Script>,
    counters: Arc<Counters>,
}

#[async_trait]
impl OracleSession for ScriptedSession {
    async fn evaluate(
        &mut self,
        fen: &str,
        line_count: u32,
        _time_budget: Duration,
    ) -> Result<Vec<PvLine>, OracleError> {
        if line_count == 1 {
            *self
                .counters
                .probes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(fen.to_string())
                .or_default() += 1;
        }
        if let Some(delay) = self.script.delay {
            tokio::time::sleep(delay).await;
        }
        if self.script.failing.contains(fen) {
            return Err(OracleError::MalformedResponse(format!("scripted failure for {fen}")));
        }

        let lines = self
            .script
            .lines
            .get(fen)
            .unwrap_or(&self.script.fallback);
        Ok(lines.iter().take(line_count as usize).cloned().collect())
    }

    async fn close(&mut self) {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
    }
}
