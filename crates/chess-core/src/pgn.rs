//! PGN corpus loading on top of the `pgn-reader` streaming parser.

use std::io;
use std::ops::ControlFlow;

use pgn_reader::{RawTag, Reader, SanPlus, Skip, Visitor};
use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess, Move, Position};
use tracing::{debug, warn};

use crate::game_data::GameMetadata;

/// A game whose mainline replayed legally from its starting position.
#[derive(Debug, Clone)]
pub struct LoadedGame {
    /// 1-based ordinal among the games kept from the corpus.
    pub game_number: u32,
    pub metadata: GameMetadata,
    /// Standard start, or the position from a `FEN` tag.
    pub start: Chess,
    pub moves: Vec<Move>,
}

/// Tags collected during header parsing.
#[derive(Default)]
struct GameTags {
    metadata: GameMetadata,
    tag_count: usize,
    setup_fen: Option<String>,
}

/// State during movetext parsing.
struct GameState {
    metadata: GameMetadata,
    tag_count: usize,
    start: Chess,
    board: Chess,
    moves: Vec<Move>,
}

/// Visitor that replays every mainline into legal `Move`s.
///
/// Yields `None` for games that cannot be used: an unreadable `FEN` tag, an
/// illegal or ambiguous SAN, or a block with neither tags nor moves.
#[derive(Default)]
struct CorpusVisitor {
    dropped: usize,
}

impl Visitor for CorpusVisitor {
    type Tags = GameTags;
    type Movetext = GameState;
    type Output = Option<(GameMetadata, Chess, Vec<Move>)>;

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, GameTags> {
        ControlFlow::Continue(GameTags::default())
    }

    fn tag(
        &mut self,
        tags: &mut GameTags,
        name: &[u8],
        value: RawTag<'_>,
    ) -> ControlFlow<Self::Output> {
        tags.tag_count += 1;
        let value = value.decode_utf8_lossy().trim().to_string();
        if value.is_empty() {
            return ControlFlow::Continue(());
        }
        match name {
            b"White" => tags.metadata.white = value,
            b"Black" => tags.metadata.black = value,
            b"Result" => tags.metadata.result = value,
            b"Date" => tags.metadata.date = value,
            b"Event" => tags.metadata.event = value,
            b"FEN" => tags.setup_fen = Some(value),
            _ => {}
        }
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, tags: GameTags) -> ControlFlow<Self::Output, GameState> {
        let start = match tags.setup_fen.as_deref().map(setup_position) {
            None => Chess::default(),
            Some(Ok(pos)) => pos,
            Some(Err(e)) => {
                warn!(
                    white = %tags.metadata.white,
                    black = %tags.metadata.black,
                    error = %e,
                    "Dropping game with unusable FEN tag"
                );
                self.dropped += 1;
                return ControlFlow::Break(None);
            }
        };

        ControlFlow::Continue(GameState {
            metadata: tags.metadata,
            tag_count: tags.tag_count,
            board: start.clone(),
            start,
            moves: Vec::new(),
        })
    }

    fn san(&mut self, state: &mut GameState, san_plus: SanPlus) -> ControlFlow<Self::Output> {
        match san_plus.san.to_move(&state.board) {
            Ok(mv) => {
                state.board.play_unchecked(mv.clone());
                state.moves.push(mv);
                ControlFlow::Continue(())
            }
            Err(e) => {
                warn!(
                    san = %san_plus,
                    ply = state.moves.len() + 1,
                    white = %state.metadata.white,
                    black = %state.metadata.black,
                    error = %e,
                    "Dropping game with illegal move"
                );
                self.dropped += 1;
                ControlFlow::Break(None)
            }
        }
    }

    fn begin_variation(&mut self, _state: &mut GameState) -> ControlFlow<Self::Output, Skip> {
        // Mainline only
        ControlFlow::Continue(Skip(true))
    }

    fn end_game(&mut self, state: GameState) -> Self::Output {
        if state.tag_count == 0 && state.moves.is_empty() {
            return None;
        }
        Some((state.metadata, state.start, state.moves))
    }
}

/// Standard-castling position from a `FEN` tag value.
fn setup_position(fen: &str) -> Result<Chess, String> {
    let fen: Fen = fen.parse().map_err(|e| format!("invalid FEN '{fen}': {e}"))?;
    fen.into_position(CastlingMode::Standard)
        .map_err(|e| format!("illegal setup position: {e}"))
}

/// Parse every game in a PGN corpus, in corpus order.
///
/// Malformed games are dropped; an empty result is the caller's concern.
pub fn load_corpus(corpus: &str) -> io::Result<Vec<LoadedGame>> {
    let mut reader = Reader::new(corpus.as_bytes());
    let mut visitor = CorpusVisitor::default();
    let mut games = Vec::new();

    while let Some(parsed) = reader.read_game(&mut visitor)? {
        if let Some((metadata, start, moves)) = parsed {
            games.push(LoadedGame {
                game_number: games.len() as u32 + 1,
                metadata,
                start,
                moves,
            });
        }
    }

    debug!(kept = games.len(), dropped = visitor.dropped, "Corpus loaded");
    Ok(games)
}
