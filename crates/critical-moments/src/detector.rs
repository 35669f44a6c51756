//! Critical-moment rule: pure functions only
//! (No Engine/Pool/Job dependencies)

use std::fmt;

use chess_core::{CriticalMoment, PositionTask, Side};
use shakmaty::san::San;
use shakmaty::uci::UciMove;
use shakmaty::Chess;

use crate::stockfish::EngineScore;

/// The runner-up move must stay strictly inside (-50, +50) centipawns.
pub const NEAR_EQUAL_BAND_CP: i32 = 50;

/// Evaluation from White's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Cp(i32),
    /// Mate in N moves; positive = White mates
    Mate(i32),
}

impl Score {
    /// Re-orient an engine score (side to move) towards White.
    pub fn from_engine(score: EngineScore, side_to_move: Side) -> Self {
        let sign = match side_to_move {
            Side::White => 1,
            Side::Black => -1,
        };
        match score {
            EngineScore::Cp(cp) => Score::Cp(cp.saturating_mul(sign)),
            EngineScore::Mate(n) => Score::Mate(n.saturating_mul(sign)),
        }
    }

    /// Centipawns with forced mates clamped to `±clamp`; a shorter mate
    /// scores further from zero.
    pub fn centipawns(self, clamp: i32) -> i32 {
        match self {
            Score::Cp(cp) => cp,
            Score::Mate(n) if n > 0 => clamp.saturating_sub(n),
            Score::Mate(n) => clamp.saturating_neg().saturating_sub(n),
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Score::Cp(cp) if cp > 0 => write!(f, "+{cp}"),
            Score::Cp(cp) => write!(f, "{cp}"),
            Score::Mate(n) if n > 0 => write!(f, "#+{n}"),
            Score::Mate(n) => write!(f, "#-{}", n.abs()),
        }
    }
}

/// One ranked oracle line: its first move and White-oriented score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateLine {
    pub uci: String,
    pub score: Option<Score>,
}

#[derive(Debug, Clone, Copy)]
pub struct DetectionRules {
    pub gap_threshold_cp: i32,
    pub mate_score_clamp: i32,
}

impl Default for DetectionRules {
    fn default() -> Self {
        Self {
            gap_threshold_cp: 100,
            mate_score_clamp: 10_000,
        }
    }
}

/// The numeric rule: decisive gap and a roughly equal runner-up.
pub fn qualifies(best_cp: i32, second_cp: i32, rules: &DetectionRules) -> bool {
    gap_cp(best_cp, second_cp) > i64::from(rules.gap_threshold_cp)
        && second_cp > -NEAR_EQUAL_BAND_CP
        && second_cp < NEAR_EQUAL_BAND_CP
}

/// Absolute gap, widened so clamped mate scores cannot overflow.
fn gap_cp(best_cp: i32, second_cp: i32) -> i64 {
    (i64::from(best_cp) - i64::from(second_cp)).abs()
}

/// Decide whether the top two oracle lines make `task` a critical moment.
///
/// Fewer than two lines, a missing score or an unplayable move all yield
/// `None`; none of them is an error.
pub fn detect(
    task: &PositionTask,
    lines: &[CandidateLine],
    rules: &DetectionRules,
) -> Option<CriticalMoment> {
    let [best, second, ..] = lines else {
        return None;
    };
    let best_score = best.score?;
    let second_score = second.score?;

    let best_cp = best_score.centipawns(rules.mate_score_clamp);
    let second_cp = second_score.centipawns(rules.mate_score_clamp);
    if !qualifies(best_cp, second_cp, rules) {
        return None;
    }

    let best_move = uci_to_san(&task.position, &best.uci)?;
    let second_best_move = uci_to_san(&task.position, &second.uci)?;

    Some(CriticalMoment {
        fen: task.board_fen(),
        ply: task.ply,
        move_number: task.move_number,
        turn: task.turn,
        best_move,
        best_move_eval: best_score.to_string(),
        best_move_cp: best_cp,
        second_best_move,
        second_best_move_eval: second_score.to_string(),
        second_best_move_cp: second_cp,
        difference: gap_cp(best_cp, second_cp) as f64 / 100.0,
    })
}

/// Convert a single UCI move to SAN at a given position.
fn uci_to_san(pos: &Chess, uci_str: &str) -> Option<String> {
    let uci_move: UciMove = uci_str.parse().ok()?;
    let legal_move = uci_move.to_move(pos).ok()?;
    Some(San::from_move(pos, legal_move).to_string())
}
