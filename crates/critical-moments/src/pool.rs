//! Bounded concurrent evaluation of position tasks.

use std::sync::Arc;

use chess_core::{CriticalMoment, PositionTask};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error};

use crate::detector::{detect, DetectionRules};
use crate::error::AnalysisError;
use crate::oracle::OracleClient;

/// Exactly one per submitted task.
#[derive(Debug)]
pub struct Completion {
    pub game_number: u32,
    pub ply: u32,
    pub moment: Option<CriticalMoment>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub completed: usize,
    pub critical: usize,
    /// Workers that panicked; still counted as completed.
    pub crashed: usize,
}

pub struct EvaluationPool {
    client: OracleClient,
    rules: DetectionRules,
    worker_count: usize,
}

impl EvaluationPool {
    pub fn new(client: OracleClient, rules: DetectionRules, worker_count: usize) -> Self {
        Self {
            client,
            rules,
            worker_count: worker_count.max(1),
        }
    }

    /// Evaluate every task, at most `worker_count` at a time, calling
    /// `on_complete` once per finished task in completion order.
    ///
    /// Workers live only for the duration of this call; dropping the future
    /// aborts whatever is still in flight.
    pub async fn run<F>(
        &self,
        tasks: Vec<PositionTask>,
        mut on_complete: F,
    ) -> Result<PoolStats, AnalysisError>
    where
        F: FnMut(Completion),
    {
        let semaphore = Arc::new(Semaphore::new(self.worker_count));
        let mut in_flight: JoinSet<Completion> = JoinSet::new();
        let mut stats = PoolStats::default();

        debug!(tasks = tasks.len(), workers = self.worker_count, "Dispatching positions");

        for task in tasks {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| AnalysisError::Orchestrator(format!("Worker pool closed: {e}")))?;

            // Report whatever finished while we waited for the permit
            while let Some(joined) = in_flight.try_join_next() {
                finish(joined, &mut stats, &mut on_complete);
            }

            let client = self.client.clone();
            let rules = self.rules;
            in_flight.spawn(async move {
                let _permit = permit; // Hold until done
                let moment = match client.evaluate(&task).await {
                    Some(lines) => detect(&task, &lines, &rules),
                    None => None,
                };
                Completion {
                    game_number: task.game_number,
                    ply: task.ply,
                    moment,
                }
            });
        }

        while let Some(joined) = in_flight.join_next().await {
            finish(joined, &mut stats, &mut on_complete);
        }

        Ok(stats)
    }
}

fn finish<F>(joined: Result<Completion, JoinError>, stats: &mut PoolStats, on_complete: &mut F)
where
    F: FnMut(Completion),
{
    stats.completed += 1;
    match joined {
        Ok(completion) => {
            if completion.moment.is_some() {
                stats.critical += 1;
            }
            on_complete(completion);
        }
        Err(e) => {
            error!(error = %e, "Evaluation worker crashed");
            stats.crashed += 1;
            // Counted but carries nothing to aggregate
            on_complete(Completion {
                game_number: 0,
                ply: 0,
                moment: None,
            });
        }
    }
}
