use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use super::domain::{
    CandidateId, CandidateRecord, EngagementFlags, ListQuery, Pagination, RequirementId,
    RequirementSummary,
};
use super::filter::{FilterEngine, FilterSpec};
use super::normalizer::{RecordNormalizer, SalaryUnitPolicy};
use super::orchestrator::{
    OrchestratorSettings, RunContext, RunSummary, ScoreOrchestrator, ScoreRun,
};
use super::ports::{
    CandidateSource, CandidateSourceError, EngagementAction, EngagementError, EngagementService,
    RunRequest, ScoringError, ScoringService,
};
use super::store::{ContextToken, LiveRankingStore, RankingSnapshot, RunProgress};

/// Service composing the candidate source, filter engine, ranking stores, and scorer.
///
/// Each requirement gets its own display context backed by one [`LiveRankingStore`].
pub struct MatchingService<C, S, E> {
    source: Arc<C>,
    scoring: Arc<S>,
    engagement: Arc<E>,
    settings: OrchestratorSettings,
    salary_policy: SalaryUnitPolicy,
    contexts: Mutex<HashMap<RequirementId, Arc<LiveRankingStore>>>,
}

impl<C, S, E> MatchingService<C, S, E>
where
    C: CandidateSource + 'static,
    S: ScoringService + 'static,
    E: EngagementService + 'static,
{
    pub fn new(
        source: Arc<C>,
        scoring: Arc<S>,
        engagement: Arc<E>,
        settings: OrchestratorSettings,
        salary_policy: SalaryUnitPolicy,
    ) -> Self {
        Self {
            source,
            scoring,
            engagement,
            settings,
            salary_policy,
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// Display context for a requirement, created empty on first use.
    pub fn store(&self, requirement: &RequirementId) -> Arc<LiveRankingStore> {
        self.contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(requirement.clone())
            .or_default()
            .clone()
    }

    fn existing_store(
        &self,
        requirement: &RequirementId,
    ) -> Result<Arc<LiveRankingStore>, MatchingServiceError> {
        self.contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(requirement)
            .cloned()
            .ok_or_else(|| MatchingServiceError::ContextNotFound(requirement.clone()))
    }

    /// Fetch a page, filter it, and make the survivors the displayed set.
    pub async fn refresh(
        &self,
        requirement: &RequirementId,
        query: &ListQuery,
        filter: &FilterSpec,
    ) -> Result<RefreshOutcome, MatchingServiceError> {
        let page = self.source.list(requirement, query).await?;
        let fetched = page.candidates.len();

        let normalizer = RecordNormalizer::new(Utc::now().date_naive(), self.salary_policy);
        let filtered = FilterEngine::new(normalizer).apply(page.candidates, filter);
        let matched = filtered.len();

        let store = self.store(requirement);
        store.replace(filtered);

        info!(%requirement, fetched, matched, "candidate listing refreshed");

        Ok(RefreshOutcome {
            requirement: page.requirement,
            pagination: page.pagination,
            fetched,
            matched,
            view: RankingView::from_snapshot(requirement.clone(), store.snapshot()),
        })
    }

    pub fn view(&self, requirement: &RequirementId) -> Result<RankingView, MatchingServiceError> {
        let store = self.existing_store(requirement)?;
        Ok(RankingView::from_snapshot(
            requirement.clone(),
            store.snapshot(),
        ))
    }

    /// Obtains a run plan and opens the run. The returned run has already superseded
    /// any earlier run on this requirement; call [`PendingRun::execute`] to score.
    pub async fn start_scoring(
        &self,
        requirement: &RequirementId,
        request: RunRequest,
    ) -> Result<PendingRun<S>, MatchingServiceError> {
        let plan = self.scoring.start_run(requirement, request).await?;
        let orchestrator = ScoreOrchestrator::new(self.store(requirement), self.settings.clone());
        let run = orchestrator.open_run(plan.target_candidate_ids, plan.suggested_concurrency);

        Ok(PendingRun {
            run,
            scoring: self.scoring.clone(),
            requirement: requirement.clone(),
            total_candidates: plan.total_candidates,
        })
    }

    pub async fn score(
        &self,
        requirement: &RequirementId,
        request: RunRequest,
    ) -> Result<RunSummary, MatchingServiceError> {
        let run = self.start_scoring(requirement, request).await?;
        Ok(run.execute().await)
    }

    /// Forward an engagement mutation and merge the returned flags into the listing.
    pub async fn engage(
        &self,
        requirement: &RequirementId,
        candidate: &CandidateId,
        action: EngagementAction,
    ) -> Result<EngagementFlags, MatchingServiceError> {
        let store = self.existing_store(requirement)?;
        if store.get(candidate).is_none() {
            return Err(MatchingServiceError::CandidateNotListed(candidate.clone()));
        }

        let flags = match action {
            EngagementAction::Like => self.engagement.set_liked(candidate, true).await?,
            EngagementAction::Unlike => self.engagement.set_liked(candidate, false).await?,
            EngagementAction::Save => self.engagement.set_saved(candidate, true).await?,
            EngagementAction::Unsave => self.engagement.set_saved(candidate, false).await?,
            EngagementAction::View => self.engagement.mark_viewed(candidate).await?,
        };

        store.apply_engagement(candidate, flags);
        Ok(flags)
    }
}

/// A scoring run that has been planned and opened but not executed.
pub struct PendingRun<S> {
    run: ScoreRun,
    scoring: Arc<S>,
    requirement: RequirementId,
    total_candidates: usize,
}

impl<S> PendingRun<S>
where
    S: ScoringService + 'static,
{
    pub fn token(&self) -> ContextToken {
        self.run.context().token
    }

    pub fn context(&self) -> &RunContext {
        self.run.context()
    }

    pub fn target_count(&self) -> usize {
        self.run.tasks().len()
    }

    pub fn total_candidates(&self) -> usize {
        self.total_candidates
    }

    pub async fn execute(self) -> RunSummary {
        let PendingRun {
            run,
            scoring,
            requirement,
            ..
        } = self;

        run.execute(move |candidate_id| {
            let scoring = scoring.clone();
            let requirement = requirement.clone();
            async move {
                scoring
                    .score_one(&requirement, &candidate_id)
                    .await
                    .map(|scored| scored.ats_score)
            }
        })
        .await
    }
}

/// Result of a listing refresh.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshOutcome {
    pub requirement: RequirementSummary,
    pub pagination: Pagination,
    pub fetched: usize,
    pub matched: usize,
    pub view: RankingView,
}

/// Presentation payload for one display context.
#[derive(Debug, Clone, Serialize)]
pub struct RankingView {
    pub requirement_id: RequirementId,
    pub revision: u64,
    pub candidates: Vec<CandidateRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<RunProgress>,
}

impl RankingView {
    pub fn from_snapshot(requirement_id: RequirementId, snapshot: RankingSnapshot) -> Self {
        Self {
            requirement_id,
            revision: snapshot.revision,
            candidates: snapshot.candidates,
            progress: snapshot.progress,
        }
    }
}

/// Error raised by the matching service.
#[derive(Debug, thiserror::Error)]
pub enum MatchingServiceError {
    #[error("no candidate listing loaded for requirement {0}")]
    ContextNotFound(RequirementId),
    #[error("candidate {0} is not part of the current listing")]
    CandidateNotListed(CandidateId),
    #[error(transparent)]
    Source(#[from] CandidateSourceError),
    #[error("scoring run could not start: {0}")]
    RunStart(#[from] ScoringError),
    #[error(transparent)]
    Engagement(#[from] EngagementError),
}

impl MatchingServiceError {
    /// Upstream faults that the caller may retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            MatchingServiceError::Source(CandidateSourceError::Unavailable(_))
            | MatchingServiceError::Engagement(EngagementError::Unavailable(_)) => true,
            MatchingServiceError::RunStart(error) => error.is_retryable(),
            _ => false,
        }
    }
}
