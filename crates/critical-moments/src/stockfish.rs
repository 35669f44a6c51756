//! Stockfish engine wrapper using UCI protocol (async I/O)

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use tracing::{debug, warn};

use crate::error::OracleError;

/// Engine score as reported, from the side to move's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineScore {
    Cp(i32),
    /// Mate in N moves (positive = side to move mates, negative = gets mated)
    Mate(i32),
}

/// A single PV line from multi-PV analysis
#[derive(Debug, Clone, Default)]
pub struct PvLine {
    /// Principal variation moves (UCI)
    pub pv: Vec<String>,
    pub score: Option<EngineScore>,
}

/// Stockfish engine instance. One per oracle call; never shared.
pub struct StockfishEngine {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl StockfishEngine {
    /// Spawn a new Stockfish process and initialize UCI
    pub async fn new(path: &str, hash_mb: u32) -> Result<Self, OracleError> {
        let mut process = Command::new(path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| OracleError::Unavailable(format!("Failed to spawn Stockfish: {e}")))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| OracleError::Unavailable("Stockfish stdin not captured".into()))?;
        let stdout = process
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| OracleError::Unavailable("Stockfish stdout not captured".into()))?;

        let mut engine = Self {
            process,
            stdin,
            stdout,
        };

        // Initialize UCI
        engine.send("uci").await?;
        engine.wait_for("uciok").await?;

        // One thread per session; parallelism comes from running many sessions
        engine.set_option("Threads", "1").await;
        engine.set_option("Hash", &hash_mb.to_string()).await;
        engine.set_option("Skill Level", "20").await;
        engine.set_option("UCI_LimitStrength", "false").await;
        engine.send("isready").await?;
        engine.wait_for("readyok").await?;

        Ok(engine)
    }

    /// Send a command to Stockfish
    async fn send(&mut self, cmd: &str) -> Result<(), OracleError> {
        debug!(cmd, "SF <");
        self.stdin
            .write_all(format!("{cmd}\n").as_bytes())
            .await
            .map_err(|e| OracleError::Unavailable(format!("Failed to write to Stockfish: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| OracleError::Unavailable(format!("Failed to flush stdin: {e}")))?;
        Ok(())
    }

    /// Options are best effort; a dead pipe surfaces at the next `isready`.
    async fn set_option(&mut self, name: &str, value: &str) {
        if let Err(e) = self
            .send(&format!("setoption name {name} value {value}"))
            .await
        {
            warn!(option = name, error = %e, "Failed to set engine option");
        }
    }

    /// Read one line; a closed pipe means the engine died.
    async fn read_line(&mut self, line: &mut String) -> Result<(), OracleError> {
        line.clear();
        let n = self
            .stdout
            .read_line(line)
            .await
            .map_err(|e| OracleError::Unavailable(format!("Failed to read from Stockfish: {e}")))?;
        if n == 0 {
            return Err(OracleError::Unavailable(
                "Stockfish closed its output".into(),
            ));
        }
        Ok(())
    }

    /// Wait for a specific response line
    async fn wait_for(&mut self, expected: &str) -> Result<(), OracleError> {
        let mut line = String::new();
        loop {
            self.read_line(&mut line).await?;
            let trimmed = line.trim();
            debug!(line = trimmed, "SF >");
            if trimmed == expected {
                return Ok(());
            }
        }
    }

    /// Search a position for `movetime` and return up to `multipv` ranked
    /// lines, best first. Lines the engine never reported are omitted.
    pub async fn evaluate_multipv(
        &mut self,
        fen: &str,
        multipv: u32,
        movetime: Duration,
    ) -> Result<Vec<PvLine>, OracleError> {
        self.send(&format!("setoption name MultiPV value {multipv}"))
            .await?;
        self.send(&format!("position fen {fen}")).await?;
        self.send(&format!("go movetime {}", movetime.as_millis().max(1)))
            .await?;

        let mut lines: Vec<PvLine> = vec![PvLine::default(); multipv as usize];
        let mut line = String::new();

        loop {
            self.read_line(&mut line).await?;
            let trimmed = line.trim();

            if trimmed.starts_with("info") && trimmed.contains(" pv ") {
                // Parse multipv index (1-based)
                let pv_idx = parse_multipv_index(trimmed).unwrap_or(1);
                if pv_idx == 0 {
                    return Err(OracleError::MalformedResponse(format!(
                        "multipv index 0 in '{trimmed}'"
                    )));
                }
                if let Some(entry) = lines.get_mut(pv_idx as usize - 1) {
                    entry.score = parse_score(trimmed);
                    entry.pv = parse_pv(trimmed);
                }
            } else if trimmed.starts_with("bestmove") {
                break;
            }
        }

        Ok(lines.into_iter().filter(|l| !l.pv.is_empty()).collect())
    }

    /// Send quit command and wait for process to exit
    pub async fn quit(&mut self) {
        if let Err(e) = self.send("quit").await {
            warn!(error = %e, "Stockfish did not accept quit");
        }
        let _ = self.process.wait().await;
    }
}

impl Drop for StockfishEngine {
    fn drop(&mut self) {
        // Best-effort synchronous kill in drop
        let _ = self.process.start_kill();
    }
}

/// Parse the score from an info line; mate takes precedence over cp.
fn parse_score(line: &str) -> Option<EngineScore> {
    if let Some(mate) = parse_token_after(line, "mate") {
        return Some(EngineScore::Mate(mate));
    }
    parse_token_after(line, "cp").map(EngineScore::Cp)
}

fn parse_token_after<T: std::str::FromStr>(line: &str, key: &str) -> Option<T> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    for (i, part) in parts.iter().enumerate() {
        if *part == key && i + 1 < parts.len() {
            return parts[i + 1].parse().ok();
        }
    }
    None
}

/// Parse multipv index from info line
fn parse_multipv_index(line: &str) -> Option<u32> {
    parse_token_after(line, "multipv")
}

/// Parse PV moves from info line
fn parse_pv(line: &str) -> Vec<String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let mut in_pv = false;
    let mut moves = Vec::new();

    for part in parts {
        if part == "pv" {
            in_pv = true;
            continue;
        }
        if in_pv {
            // PV ends at next keyword or end of line
            if part.starts_with("bmc") || part == "string" {
                break;
            }
            moves.push(part.to_string());
        }
    }

    moves
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cp() {
        let line = "info depth 20 seldepth 25 multipv 1 score cp 35 nodes 100000 pv e2e4";
        assert_eq!(parse_score(line), Some(EngineScore::Cp(35)));
    }

    #[test]
    fn test_parse_mate() {
        let line = "info depth 20 score mate -3 nodes 100000 pv e2e4";
        assert_eq!(parse_score(line), Some(EngineScore::Mate(-3)));
    }

    #[test]
    fn test_parse_score_missing() {
        let line = "info depth 1 seldepth 1 nodes 20 pv e2e4";
        assert_eq!(parse_score(line), None);
    }

    #[test]
    fn test_parse_multipv_index() {
        let line = "info depth 12 multipv 2 score cp -14 pv d7d5 c2c4";
        assert_eq!(parse_multipv_index(line), Some(2));
    }

    #[test]
    fn test_parse_pv() {
        let line = "info depth 20 score cp 35 pv e2e4 e7e5 g1f3";
        let pv = parse_pv(line);
        assert_eq!(pv, vec!["e2e4", "e7e5", "g1f3"]);
    }
}
