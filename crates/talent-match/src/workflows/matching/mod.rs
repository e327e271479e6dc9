//! Candidate matching for employer listing screens: normalization of heterogeneous
//! candidate attributes, declarative filtering, a live ranking store per requirement,
//! and a bounded-concurrency scoring orchestrator that streams results into it.

pub mod domain;
pub mod filter;
pub mod normalizer;
pub mod orchestrator;
pub mod ports;
pub mod router;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use domain::{
    AtsScore, CandidateId, CandidatePage, CandidateRecord, EducationEntry, EducationField,
    EngagementFlags, ListQuery, Pagination, RequirementId, RequirementSummary, SkillsField,
    WorkExperience,
};
pub use filter::{
    FilterEngine, FilterIssue, FilterSpec, Predicate, ValueRange, VerificationFlag,
    FULL_SALARY_RANGE, PROFILE_COMPLETE_THRESHOLD,
};
pub use normalizer::{
    normalize_skills, NormalizedCandidate, RecordNormalizer, SalaryUnitPolicy, SkillToken,
};
pub use orchestrator::{
    OrchestratorSettings, RunContext, RunSummary, ScoreOrchestrator, ScoreRun, ScoreTask,
    TaskState,
};
pub use ports::{
    CandidateSource, CandidateSourceError, EngagementAction, EngagementError, EngagementService,
    RunPlan, RunRequest, RunTarget, ScoredCandidate, ScoringError, ScoringService,
};
pub use router::matching_router;
pub use service::{
    MatchingService, MatchingServiceError, PendingRun, RankingView, RefreshOutcome,
};
pub use store::{
    ContextToken, LiveRankingStore, MergeOutcome, PatchOutcome, RankingSnapshot, RunProgress,
    ScorePatch, SubscriptionId,
};
