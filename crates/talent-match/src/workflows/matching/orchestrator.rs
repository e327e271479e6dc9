//! Bounded-concurrency batch scheduler that streams scoring results into a
//! [`LiveRankingStore`].
//!
//! Targets are split into batches of at most `concurrency_limit` candidates. A batch is
//! dispatched all at once and the next one starts only after every member finished and
//! the pacing delay elapsed. Each completion is merged into the store immediately, so
//! the ranking updates while the batch is still running.
//!
//! Superseding a run never aborts its in-flight calls. The store stops accepting the
//! old token, the late results are dropped at merge time, and the old run stops
//! dispatching at its next batch boundary.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::domain::{AtsScore, CandidateId, RequirementId};
use super::ports::{RunRequest, ScoringError, ScoringService};
use super::store::{ContextToken, LiveRankingStore, MergeOutcome, PatchOutcome, ScorePatch};

pub const MAX_ATS_SCORE: f64 = 100.0;

/// Scheduling knobs shared by every run of an orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Replaces the scoring service's suggested concurrency when set.
    pub concurrency_override: Option<usize>,
    pub pacing: Duration,
    pub call_timeout: Option<Duration>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            concurrency_override: None,
            pacing: Duration::from_millis(250),
            call_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Parameters fixed for the lifetime of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunContext {
    pub token: ContextToken,
    pub concurrency_limit: usize,
    pub pacing: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    Pending,
    InFlight,
    Succeeded(f64),
    Failed(ScoringError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreTask {
    pub candidate_id: CandidateId,
    pub state: TaskState,
    pub token: ContextToken,
}

/// Final tally for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub token: ContextToken,
    pub succeeded: usize,
    pub failed: usize,
    pub total: usize,
    /// Targets never dispatched because the run was superseded first.
    pub skipped: usize,
    pub superseded: bool,
}

pub struct ScoreOrchestrator {
    store: Arc<LiveRankingStore>,
    settings: OrchestratorSettings,
}

impl ScoreOrchestrator {
    pub fn new(store: Arc<LiveRankingStore>, settings: OrchestratorSettings) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &Arc<LiveRankingStore> {
        &self.store
    }

    /// Opens a run: allocates its token, which immediately supersedes any earlier run
    /// on the same store.
    pub fn open_run(&self, target_ids: Vec<CandidateId>, suggested_concurrency: usize) -> ScoreRun {
        let mut seen = HashSet::new();
        let target_ids: Vec<CandidateId> = target_ids
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();

        let concurrency_limit = self
            .settings
            .concurrency_override
            .unwrap_or(suggested_concurrency)
            .max(1);
        let token = self.store.begin_run(target_ids.len());
        let context = RunContext {
            token,
            concurrency_limit,
            pacing: self.settings.pacing,
        };

        info!(
            %token,
            targets = target_ids.len(),
            concurrency = concurrency_limit,
            pacing_ms = context.pacing.as_millis() as u64,
            "scoring run opened"
        );

        let tasks = target_ids
            .into_iter()
            .map(|candidate_id| ScoreTask {
                candidate_id,
                state: TaskState::Pending,
                token,
            })
            .collect();

        ScoreRun {
            store: self.store.clone(),
            context,
            tasks,
            call_timeout: self.settings.call_timeout,
        }
    }

    /// Opens and executes a run over `target_ids` with an arbitrary scoring call.
    pub async fn run<F, Fut>(
        &self,
        target_ids: Vec<CandidateId>,
        suggested_concurrency: usize,
        score: F,
    ) -> RunSummary
    where
        F: Fn(CandidateId) -> Fut + Send + Sync,
        Fut: Future<Output = Result<f64, ScoringError>> + Send,
    {
        self.open_run(target_ids, suggested_concurrency)
            .execute(score)
            .await
    }

    /// Asks the scoring service for a plan, then scores every planned candidate. Only a
    /// failure to obtain the plan is returned as an error.
    pub async fn score_requirement<S>(
        &self,
        service: &S,
        requirement: &RequirementId,
        request: RunRequest,
    ) -> Result<RunSummary, ScoringError>
    where
        S: ScoringService + ?Sized,
    {
        let plan = service.start_run(requirement, request).await?;
        let summary = self
            .run(
                plan.target_candidate_ids,
                plan.suggested_concurrency,
                move |candidate_id| async move {
                    service
                        .score_one(requirement, &candidate_id)
                        .await
                        .map(|scored| scored.ats_score)
                },
            )
            .await;
        Ok(summary)
    }
}

/// An opened run that has not been executed yet.
pub struct ScoreRun {
    store: Arc<LiveRankingStore>,
    context: RunContext,
    tasks: Vec<ScoreTask>,
    call_timeout: Option<Duration>,
}

impl ScoreRun {
    pub fn context(&self) -> &RunContext {
        &self.context
    }

    pub fn tasks(&self) -> &[ScoreTask] {
        &self.tasks
    }

    pub async fn execute<F, Fut>(self, score: F) -> RunSummary
    where
        F: Fn(CandidateId) -> Fut + Send + Sync,
        Fut: Future<Output = Result<f64, ScoringError>> + Send,
    {
        let ScoreRun {
            store,
            context,
            mut tasks,
            call_timeout,
        } = self;
        let mut superseded = false;

        for (index, batch) in tasks.chunks_mut(context.concurrency_limit).enumerate() {
            if index > 0 {
                if store.is_active(context.token) {
                    tokio::time::sleep(context.pacing).await;
                }
                if !store.is_active(context.token) {
                    info!(token = %context.token, batch = index, "superseded run stops dispatching");
                    superseded = true;
                    break;
                }
            }

            debug!(token = %context.token, batch = index, size = batch.len(), "dispatching batch");
            for task in batch.iter_mut() {
                task.state = TaskState::InFlight;
            }

            let calls = batch.iter().map(|task| {
                dispatch(
                    &store,
                    &context,
                    call_timeout,
                    task.candidate_id.clone(),
                    &score,
                )
            });
            let results = join_all(calls).await;

            for (task, result) in batch.iter_mut().zip(results) {
                task.state = match result {
                    Ok(score) => TaskState::Succeeded(score),
                    Err(error) => TaskState::Failed(error),
                };
            }
        }

        let superseded = superseded || !store.is_active(context.token);
        let summary = summarize(context.token, &tasks, superseded);
        store.finish_run(context.token);
        info!(
            token = %summary.token,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            total = summary.total,
            superseded = summary.superseded,
            "scoring run finished"
        );
        summary
    }
}

async fn dispatch<F, Fut>(
    store: &LiveRankingStore,
    context: &RunContext,
    call_timeout: Option<Duration>,
    candidate_id: CandidateId,
    score: &F,
) -> Result<f64, ScoringError>
where
    F: Fn(CandidateId) -> Fut,
    Fut: Future<Output = Result<f64, ScoringError>>,
{
    let call = score(candidate_id.clone());
    let result = match call_timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(ScoringError::Timeout(limit)),
        },
        None => call.await,
    }
    .and_then(validate_score);

    let outcome = match &result {
        Ok(score) => PatchOutcome::Scored(AtsScore {
            score: *score,
            calculated_at: Utc::now(),
        }),
        Err(error) => {
            warn!(candidate = %candidate_id, token = %context.token, %error, "candidate scoring failed");
            PatchOutcome::Failed {
                reason: error.to_string(),
            }
        }
    };

    let merged = store.merge_patch(ScorePatch {
        candidate_id,
        token: context.token,
        outcome,
    });
    if merged == MergeOutcome::UnknownCandidate {
        debug!(token = %context.token, "scored candidate is no longer displayed");
    }

    result
}

fn validate_score(score: f64) -> Result<f64, ScoringError> {
    if (0.0..=MAX_ATS_SCORE).contains(&score) {
        Ok(score)
    } else {
        Err(ScoringError::InvalidScore(score))
    }
}

fn summarize(token: ContextToken, tasks: &[ScoreTask], superseded: bool) -> RunSummary {
    let mut summary = RunSummary {
        token,
        succeeded: 0,
        failed: 0,
        total: tasks.len(),
        skipped: 0,
        superseded,
    };
    for task in tasks {
        match task.state {
            TaskState::Succeeded(_) => summary.succeeded += 1,
            TaskState::Failed(_) => summary.failed += 1,
            TaskState::Pending | TaskState::InFlight => summary.skipped += 1,
        }
    }
    summary
}
