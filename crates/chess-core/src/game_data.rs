use serde::{Deserialize, Serialize};
use shakmaty::Color;

/// Placeholder for free-text headers missing from the PGN.
pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMetadata {
    pub white: String,
    pub black: String,
    pub result: String, // "1-0", "0-1", "1/2-1/2", "*"
    pub date: String,
    pub event: String,
}

impl Default for GameMetadata {
    fn default() -> Self {
        Self {
            white: UNKNOWN.to_string(),
            black: UNKNOWN.to_string(),
            result: "*".to_string(),
            date: UNKNOWN.to_string(),
            event: UNKNOWN.to_string(),
        }
    }
}

/// Side to move at a given ply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }
}

/// A position where one move is decisively better than every alternative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalMoment {
    /// Board-only FEN (piece placement) of the position before the move.
    pub fen: String,
    /// 1-based half-move index within the game.
    pub ply: u32,
    pub move_number: u32,
    pub turn: Side,
    pub best_move: String,
    pub best_move_eval: String,
    pub best_move_cp: i32,
    pub second_best_move: String,
    pub second_best_move_eval: String,
    pub second_best_move_cp: i32,
    /// Evaluation gap between the two moves, in pawns.
    pub difference: f64,
}

/// One parsed game plus the critical moments found in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    /// 1-based ordinal within the corpus.
    pub game_number: u32,
    #[serde(flatten)]
    pub metadata: GameMetadata,
    pub critical_moments: Vec<CriticalMoment>,
}

impl Game {
    pub fn new(game_number: u32, metadata: GameMetadata) -> Self {
        Self {
            game_number,
            metadata,
            critical_moments: Vec::new(),
        }
    }

    /// Order moments by ply; append order depends on worker completion.
    pub fn sort_moments(&mut self) {
        self.critical_moments.sort_by_key(|m| m.ply);
    }
}
