//! Job orchestration: load → enumerate → dispatch → aggregate → finalize,
//! plus the submit / poll / fetch facade used by the HTTP layer.

use std::sync::Arc;

use chess_core::{enumerate_positions, load_corpus, Game};
use tracing::{error, info, Instrument};

use crate::aggregator::ResultAggregator;
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::oracle::{OracleClient, OracleSettings, PositionOracle};
use crate::pool::EvaluationPool;
use crate::progress::{JobId, JobRegistry, JobResults, JobSnapshot, JobStatus};

/// Runs one job at a time against a shared registry.
pub struct JobOrchestrator {
    registry: JobRegistry,
    pool: EvaluationPool,
}

impl JobOrchestrator {
    pub fn new(registry: JobRegistry, config: &AnalysisConfig, oracle: Arc<dyn PositionOracle>) -> Self {
        let client = OracleClient::new(oracle, OracleSettings::from(config));
        let pool = EvaluationPool::new(client, config.detection_rules(), config.worker_count);
        Self { registry, pool }
    }

    /// Drive `id` to a terminal state and return it.
    pub async fn execute(&self, id: &JobId, corpus: &str) -> JobStatus {
        match self.analyze(id, corpus).await {
            Ok(games) => {
                let critical: usize = games.iter().map(|g| g.critical_moments.len()).sum();
                info!(job_id = %id, games = games.len(), critical, "Analysis complete");
                self.registry.update(id, |job| job.complete(games));
                JobStatus::Completed
            }
            Err(e) => {
                error!(job_id = %id, error = %e, "Analysis failed");
                self.registry.update(id, |job| job.fail(e.to_string()));
                JobStatus::Error
            }
        }
    }

    async fn analyze(&self, id: &JobId, corpus: &str) -> Result<Vec<Game>, AnalysisError> {
        let games = load_corpus(corpus).map_err(|e| AnalysisError::Corpus(e.to_string()))?;
        if games.is_empty() {
            return Err(AnalysisError::corpus_invalid());
        }

        let tasks = enumerate_positions(&games);
        let total = tasks.len();
        info!(job_id = %id, games = games.len(), positions = total, "Corpus loaded");

        let started = self
            .registry
            .update(id, |job| job.begin_analyzing(total))
            .ok_or_else(|| AnalysisError::Orchestrator(format!("Job {id} is not registered")))?;
        if !started {
            return Err(AnalysisError::Orchestrator(format!("Job {id} was already started")));
        }

        let aggregator = ResultAggregator::new(&games);
        let stats = self
            .pool
            .run(tasks, |completion| {
                if let Some(moment) = completion.moment {
                    // Unknown games are logged by the aggregator and skipped
                    let _ = aggregator.append(completion.game_number, moment);
                }
                self.registry.update(id, |job| job.record_completion());
            })
            .await?;

        info!(
            job_id = %id,
            completed = stats.completed,
            critical = stats.critical,
            crashed = stats.crashed,
            "Positions evaluated"
        );
        Ok(aggregator.finalize())
    }
}

/// The three operations exposed to callers.
#[derive(Clone)]
pub struct AnalysisService {
    registry: JobRegistry,
    orchestrator: Arc<JobOrchestrator>,
}

impl AnalysisService {
    pub fn new(config: &AnalysisConfig, oracle: Arc<dyn PositionOracle>) -> Self {
        let registry = JobRegistry::new();
        let orchestrator = Arc::new(JobOrchestrator::new(registry.clone(), config, oracle));
        Self {
            registry,
            orchestrator,
        }
    }

    /// Register a job and start it in the background. Must be called from
    /// within a Tokio runtime. There is no way to cancel the job.
    pub fn submit(&self, corpus: String, filename: Option<String>) -> JobId {
        let id = self.registry.create(filename.clone());
        info!(job_id = %id, filename = filename.as_deref().unwrap_or("-"), "Analysis submitted");

        let orchestrator = self.orchestrator.clone();
        let registry = self.registry.clone();
        let job_id = id.clone();
        let span = tracing::info_span!("analysis_job", job_id = %id);

        tokio::spawn(
            async move {
                let worker_id = job_id.clone();
                let worker = tokio::spawn(
                    async move { orchestrator.execute(&worker_id, &corpus).await }
                        .in_current_span(),
                );
                if let Err(e) = worker.await {
                    error!(error = %e, "Analysis task aborted");
                    registry.update(&job_id, |job| {
                        job.fail(AnalysisError::Orchestrator(e.to_string()).to_string())
                    });
                }
            }
            .instrument(span),
        );

        id
    }

    pub fn poll(&self, id: &JobId) -> Option<JobSnapshot> {
        self.registry.snapshot(id)
    }

    pub fn fetch_results(&self, id: &JobId) -> Option<JobResults> {
        self.registry.results(id)
    }
}
