//! Fan-in of critical moments into their owning games.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use chess_core::{CriticalMoment, Game, LoadedGame};
use tracing::error;

use crate::error::AnalysisError;

/// Per-game lists, each behind its own lock. The set of games is fixed at
/// construction so lookups never contend.
pub struct ResultAggregator {
    games: BTreeMap<u32, Mutex<Game>>,
}

impl ResultAggregator {
    pub fn new(loaded: &[LoadedGame]) -> Self {
        let games = loaded
            .iter()
            .map(|g| (g.game_number, Mutex::new(Game::new(g.game_number, g.metadata.clone()))))
            .collect();
        Self { games }
    }

    /// Append one moment to its game. An unknown game is logged and the
    /// moment dropped; no other game is touched.
    pub fn append(&self, game_number: u32, moment: CriticalMoment) -> Result<(), AnalysisError> {
        let Some(game) = self.games.get(&game_number) else {
            error!(game_number, ply = moment.ply, "Critical moment for unknown game dropped");
            return Err(AnalysisError::UnknownGame(game_number));
        };
        game.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .critical_moments
            .push(moment);
        Ok(())
    }

    /// Games in corpus order, moments sorted by ply.
    pub fn finalize(self) -> Vec<Game> {
        self.games
            .into_values()
            .map(|game| {
                let mut game = game.into_inner().unwrap_or_else(PoisonError::into_inner);
                game.sort_moments();
                game
            })
            .collect()
    }
}
