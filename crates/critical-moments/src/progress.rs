//! Process-wide job registry and per-job progress tracking.
//!
//! Jobs are created on submit and never removed; the registry lives as long
//! as the process does.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use chess_core::Game;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn new() -> Self {
        JobId(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        JobId(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Starting,
    Analyzing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

/// Mutable state of one job. Fields change only through the transition
/// methods, which refuse to leave a terminal state.
#[derive(Debug)]
pub struct JobProgress {
    filename: Option<String>,
    status: JobStatus,
    total_moves: usize,
    current_move: usize,
    progress: u8,
    results: Option<Vec<Game>>,
    error: Option<String>,
}

impl JobProgress {
    fn new(filename: Option<String>) -> Self {
        Self {
            filename,
            status: JobStatus::Starting,
            total_moves: 0,
            current_move: 0,
            progress: 0,
            results: None,
            error: None,
        }
    }

    /// `starting → analyzing`, fixing the task count.
    pub fn begin_analyzing(&mut self, total_moves: usize) -> bool {
        if self.status != JobStatus::Starting {
            return false;
        }
        self.total_moves = total_moves;
        self.status = JobStatus::Analyzing;
        true
    }

    /// Count one finished task. Never exceeds the total.
    pub fn record_completion(&mut self) -> bool {
        if self.status != JobStatus::Analyzing || self.current_move >= self.total_moves {
            return false;
        }
        self.current_move += 1;
        self.progress = (self.current_move * 100 / self.total_moves) as u8;
        true
    }

    pub fn complete(&mut self, results: Vec<Game>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.results = Some(results);
        true
    }

    /// Record a terminal failure; counters already reached are kept.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = JobStatus::Error;
        self.error = Some(message.into());
        true
    }
}

/// Read-only view returned to pollers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub filename: Option<String>,
    pub status: JobStatus,
    /// Percent complete, 0..=100
    pub progress: u8,
    pub total_moves: usize,
    pub current_move: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobResults {
    Completed(Vec<Game>),
    Failed(String),
    StillProcessing,
}

#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<JobId, JobProgress>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job in `starting` state.
    pub fn create(&self, filename: Option<String>) -> JobId {
        let id = JobId::new();
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), JobProgress::new(filename));
        id
    }

    /// Apply `f` to a job under the write lock. `None` for an unknown id.
    pub fn update<R>(&self, id: &JobId, f: impl FnOnce(&mut JobProgress) -> R) -> Option<R> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        jobs.get_mut(id).map(f)
    }

    pub fn snapshot(&self, id: &JobId) -> Option<JobSnapshot> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.get(id).map(|job| JobSnapshot {
            job_id: id.clone(),
            filename: job.filename.clone(),
            status: job.status,
            progress: job.progress,
            total_moves: job.total_moves,
            current_move: job.current_move,
            error: job.error.clone(),
        })
    }

    pub fn results(&self, id: &JobId) -> Option<JobResults> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.get(id).map(|job| match job.status {
            JobStatus::Completed => JobResults::Completed(job.results.clone().unwrap_or_default()),
            JobStatus::Error => JobResults::Failed(job.error.clone().unwrap_or_default()),
            JobStatus::Starting | JobStatus::Analyzing => JobResults::StillProcessing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let registry = JobRegistry::new();
        let id = registry.create(Some("games.pgn".into()));

        let snap = registry.snapshot(&id).unwrap();
        assert_eq!(snap.status, JobStatus::Starting);
        assert_eq!(snap.filename.as_deref(), Some("games.pgn"));
        assert_eq!(registry.results(&id), Some(JobResults::StillProcessing));

        registry.update(&id, |job| job.begin_analyzing(3));
        for _ in 0..3 {
            assert_eq!(registry.update(&id, |job| job.record_completion()), Some(true));
        }
        let snap = registry.snapshot(&id).unwrap();
        assert_eq!((snap.current_move, snap.total_moves, snap.progress), (3, 3, 100));

        registry.update(&id, |job| job.complete(Vec::new()));
        let snap = registry.snapshot(&id).unwrap();
        assert_eq!(snap.status, JobStatus::Completed);
        assert_eq!(registry.results(&id), Some(JobResults::Completed(Vec::new())));
    }

    #[test]
    fn test_progress_is_floored_and_saturates() {
        let registry = JobRegistry::new();
        let id = registry.create(None);
        registry.update(&id, |job| job.begin_analyzing(3));

        registry.update(&id, |job| job.record_completion());
        assert_eq!(registry.snapshot(&id).unwrap().progress, 33);
        registry.update(&id, |job| job.record_completion());
        assert_eq!(registry.snapshot(&id).unwrap().progress, 66);
        registry.update(&id, |job| job.record_completion());

        // Extra completion events are refused
        assert_eq!(registry.update(&id, |job| job.record_completion()), Some(false));
        assert_eq!(registry.snapshot(&id).unwrap().current_move, 3);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let registry = JobRegistry::new();
        let id = registry.create(None);

        assert_eq!(registry.update(&id, |job| job.fail("boom")), Some(true));
        assert_eq!(registry.update(&id, |job| job.begin_analyzing(5)), Some(false));
        assert_eq!(registry.update(&id, |job| job.complete(Vec::new())), Some(false));
        assert_eq!(registry.update(&id, |job| job.fail("again")), Some(false));

        let snap = registry.snapshot(&id).unwrap();
        assert_eq!(snap.status, JobStatus::Error);
        assert_eq!(snap.error.as_deref(), Some("boom"));
        assert_eq!(registry.results(&id), Some(JobResults::Failed("boom".into())));
    }

    #[test]
    fn test_completion_before_analyzing_is_refused() {
        let registry = JobRegistry::new();
        let id = registry.create(None);
        assert_eq!(registry.update(&id, |job| job.record_completion()), Some(false));
    }

    #[test]
    fn test_unknown_job() {
        let registry = JobRegistry::new();
        let id = JobId::from("missing");
        assert!(registry.snapshot(&id).is_none());
        assert!(registry.results(&id).is_none());
        assert!(registry.update(&id, |job| job.record_completion()).is_none());
    }

    #[test]
    fn test_concurrent_completions_are_not_lost() {
        let registry = JobRegistry::new();
        let id = registry.create(None);
        registry.update(&id, |job| job.begin_analyzing(800));

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..100 {
                        registry.update(&id, |job| job.record_completion());
                        let snap = registry.snapshot(&id).unwrap();
                        assert!(snap.current_move <= snap.total_moves);
                    }
                });
            }
        });

        let snap = registry.snapshot(&id).unwrap();
        assert_eq!(snap.current_move, 800);
        assert_eq!(snap.progress, 100);
    }
}
