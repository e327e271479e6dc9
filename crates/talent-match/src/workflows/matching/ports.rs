use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::domain::{
    CandidateId, CandidatePage, CandidateRecord, EngagementFlags, ListQuery, RequirementId,
};

/// Upstream listing service that owns candidate persistence.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn list(
        &self,
        requirement: &RequirementId,
        query: &ListQuery,
    ) -> Result<CandidatePage, CandidateSourceError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CandidateSourceError {
    #[error("requirement {0} not found")]
    RequirementNotFound(RequirementId),
    #[error("candidate service unavailable: {0}")]
    Unavailable(String),
}

/// Which candidates a scoring run should cover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTarget {
    All,
    Candidates(Vec<CandidateId>),
}

/// Parameters for opening a scoring run with the scoring service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub target: RunTarget,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl RunRequest {
    pub fn all() -> Self {
        Self {
            target: RunTarget::All,
            page: None,
            limit: None,
        }
    }

    pub fn candidates(ids: Vec<CandidateId>) -> Self {
        Self {
            target: RunTarget::Candidates(ids),
            page: None,
            limit: None,
        }
    }
}

/// The scoring service's answer to a run request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPlan {
    pub target_candidate_ids: Vec<CandidateId>,
    pub total_candidates: usize,
    pub suggested_concurrency: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub ats_score: f64,
    #[serde(default)]
    pub candidate: Option<CandidateRecord>,
}

/// External relevance scorer, called once per candidate.
#[async_trait]
pub trait ScoringService: Send + Sync {
    async fn start_run(
        &self,
        requirement: &RequirementId,
        request: RunRequest,
    ) -> Result<RunPlan, ScoringError>;

    async fn score_one(
        &self,
        requirement: &RequirementId,
        candidate: &CandidateId,
    ) -> Result<ScoredCandidate, ScoringError>;
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoringError {
    #[error("scoring service unreachable: {0}")]
    Network(String),
    #[error("scoring call exceeded {0:?}")]
    Timeout(Duration),
    #[error("scoring service rejected the request: {0}")]
    Rejected(String),
    #[error("scoring service returned out-of-range score {0}")]
    InvalidScore(f64),
}

impl ScoringError {
    /// Network faults and timeouts may succeed if tried again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScoringError::Network(_) | ScoringError::Timeout(_))
    }
}

/// Like, save, and view mutations. Returns the candidate's flags after the change.
#[async_trait]
pub trait EngagementService: Send + Sync {
    async fn set_liked(
        &self,
        candidate: &CandidateId,
        liked: bool,
    ) -> Result<EngagementFlags, EngagementError>;

    async fn set_saved(
        &self,
        candidate: &CandidateId,
        saved: bool,
    ) -> Result<EngagementFlags, EngagementError>;

    async fn mark_viewed(&self, candidate: &CandidateId) -> Result<EngagementFlags, EngagementError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EngagementError {
    #[error("candidate {0} not found")]
    CandidateNotFound(CandidateId),
    #[error("engagement service unavailable: {0}")]
    Unavailable(String),
}

/// Engagement mutation requested from the listing screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementAction {
    Like,
    Unlike,
    Save,
    Unsave,
    View,
}
