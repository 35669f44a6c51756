//! Game loading and position enumeration shared by the analysis crates.

pub mod game_data;
pub mod pgn;
pub mod positions;

pub use game_data::{CriticalMoment, Game, GameMetadata, Side};
pub use pgn::{load_corpus, LoadedGame};
pub use positions::{enumerate_positions, PositionTask};
