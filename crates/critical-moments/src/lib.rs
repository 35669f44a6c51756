//! Critical-moment analysis: find positions where exactly one move keeps a
//! real advantage, across a whole PGN corpus, on a bounded engine pool.

pub use chess_core;

pub mod aggregator;
pub mod config;
pub mod detector;
pub mod error;
pub mod fakes;
pub mod job;
pub mod oracle;
pub mod pool;
pub mod progress;
pub mod stockfish;

pub use config::AnalysisConfig;
pub use error::{AnalysisError, OracleError};
pub use job::{AnalysisService, JobOrchestrator};
pub use oracle::{PositionOracle, StockfishOracle};
pub use progress::{JobId, JobRegistry, JobResults, JobSnapshot, JobStatus};
