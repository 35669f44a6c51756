//! Flatten games into per-ply evaluation tasks.

use shakmaty::{fen::Fen, Chess, EnPassantMode, Position};

use crate::game_data::Side;
use crate::pgn::LoadedGame;

/// The position before one mainline move, tagged with its owning game.
#[derive(Debug, Clone)]
pub struct PositionTask {
    pub game_number: u32,
    /// 1-based half-move index within the game.
    pub ply: u32,
    pub move_number: u32,
    pub turn: Side,
    pub position: Chess,
}

impl PositionTask {
    /// Full FEN, as sent to the engine.
    pub fn fen(&self) -> String {
        Fen::from_position(&self.position, EnPassantMode::Legal).to_string()
    }

    /// Piece placement only.
    pub fn board_fen(&self) -> String {
        self.position.board().to_string()
    }
}

/// One task per ply, corpus order then ply order.
pub fn enumerate_positions(games: &[LoadedGame]) -> Vec<PositionTask> {
    let total: usize = games.iter().map(|g| g.moves.len()).sum();
    let mut tasks = Vec::with_capacity(total);

    for game in games {
        let mut pos = game.start.clone();
        for (i, mv) in game.moves.iter().enumerate() {
            tasks.push(PositionTask {
                game_number: game.game_number,
                ply: i as u32 + 1,
                move_number: pos.fullmoves().get(),
                turn: pos.turn().into(),
                position: pos.clone(),
            });
            pos.play_unchecked(mv.clone());
        }
    }

    tasks
}
