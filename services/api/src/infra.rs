use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use talent_match::error::AppError;
use talent_match::workflows::matching::{
    normalize_skills, CandidateId, CandidatePage, CandidateRecord, CandidateSource,
    CandidateSourceError, EngagementError, EngagementFlags, EngagementService, ListQuery,
    Pagination, RequirementId, RequirementSummary, RunPlan, RunRequest, RunTarget,
    ScoredCandidate, ScoringError, ScoringService,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Requirements and their candidate listings, as stored in a catalog file.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Catalog {
    #[serde(default)]
    pub(crate) requirements: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CatalogEntry {
    pub(crate) requirement: RequirementSummary,
    #[serde(default)]
    pub(crate) candidates: Vec<CandidateRecord>,
}

impl Catalog {
    pub(crate) fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn flags(&self) -> HashMap<CandidateId, EngagementFlags> {
        self.requirements
            .iter()
            .flat_map(|entry| entry.candidates.iter())
            .map(|candidate| (candidate.id.clone(), candidate.engagement()))
            .collect()
    }
}

#[derive(Debug, Default)]
pub(crate) struct InMemoryCandidateSource {
    listings: HashMap<RequirementId, CatalogEntry>,
}

impl InMemoryCandidateSource {
    pub(crate) fn from_catalog(catalog: &Catalog) -> Self {
        let listings = catalog
            .requirements
            .iter()
            .map(|entry| (entry.requirement.id.clone(), entry.clone()))
            .collect();
        Self { listings }
    }

    fn entry(&self, requirement: &RequirementId) -> Option<&CatalogEntry> {
        self.listings.get(requirement)
    }
}

#[async_trait]
impl CandidateSource for InMemoryCandidateSource {
    async fn list(
        &self,
        requirement: &RequirementId,
        query: &ListQuery,
    ) -> Result<CandidatePage, CandidateSourceError> {
        let entry = self
            .entry(requirement)
            .ok_or_else(|| CandidateSourceError::RequirementNotFound(requirement.clone()))?;

        let search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(str::to_lowercase);
        let matching: Vec<&CandidateRecord> = entry
            .candidates
            .iter()
            .filter(|candidate| match &search {
                Some(term) => candidate.name.to_lowercase().contains(term.as_str()),
                None => true,
            })
            .collect();

        let page_size = query.page_size.max(1);
        let page = query.page.max(1);
        let total_items = matching.len() as u64;
        let total_pages = matching.len().div_ceil(page_size as usize) as u32;
        let candidates = matching
            .into_iter()
            .skip((page as usize - 1) * page_size as usize)
            .take(page_size as usize)
            .cloned()
            .collect();

        Ok(CandidatePage {
            candidates,
            requirement: entry.requirement.clone(),
            pagination: Pagination {
                page,
                page_size,
                total_items,
                total_pages,
            },
        })
    }
}

/// Deterministic local scorer: the share of the requirement's skills a candidate lists.
pub(crate) struct KeywordScoringService {
    source: Arc<InMemoryCandidateSource>,
    suggested_concurrency: usize,
}

impl KeywordScoringService {
    pub(crate) fn new(source: Arc<InMemoryCandidateSource>, suggested_concurrency: usize) -> Self {
        Self {
            source,
            suggested_concurrency,
        }
    }

    fn lookup(&self, requirement: &RequirementId) -> Result<&CatalogEntry, ScoringError> {
        self.source
            .entry(requirement)
            .ok_or_else(|| ScoringError::Rejected(format!("unknown requirement {requirement}")))
    }
}

pub(crate) fn keyword_score(requirement: &RequirementSummary, candidate: &CandidateRecord) -> f64 {
    let wanted: HashSet<String> = requirement
        .skills
        .iter()
        .map(|skill| skill.trim().to_lowercase())
        .filter(|skill| !skill.is_empty())
        .collect();
    if wanted.is_empty() {
        return 0.0;
    }

    let held: HashSet<String> = normalize_skills(candidate)
        .into_iter()
        .map(|skill| skill.key)
        .collect();
    let overlap = wanted.intersection(&held).count();
    (overlap as f64 * 100.0 / wanted.len() as f64).round()
}

#[async_trait]
impl ScoringService for KeywordScoringService {
    async fn start_run(
        &self,
        requirement: &RequirementId,
        request: RunRequest,
    ) -> Result<RunPlan, ScoringError> {
        let entry = self.lookup(requirement)?;
        let mut targets: Vec<CandidateId> = match request.target {
            RunTarget::All => entry
                .candidates
                .iter()
                .map(|candidate| candidate.id.clone())
                .collect(),
            RunTarget::Candidates(ids) => ids,
        };
        if let Some(limit) = request.limit {
            let page = request.page.unwrap_or(1).max(1) as usize;
            targets = targets
                .into_iter()
                .skip((page - 1) * limit as usize)
                .take(limit as usize)
                .collect();
        }

        Ok(RunPlan {
            total_candidates: entry.candidates.len(),
            target_candidate_ids: targets,
            suggested_concurrency: self.suggested_concurrency,
        })
    }

    async fn score_one(
        &self,
        requirement: &RequirementId,
        candidate: &CandidateId,
    ) -> Result<ScoredCandidate, ScoringError> {
        let entry = self.lookup(requirement)?;
        let record = entry
            .candidates
            .iter()
            .find(|record| &record.id == candidate)
            .ok_or_else(|| ScoringError::Rejected(format!("unknown candidate {candidate}")))?;

        Ok(ScoredCandidate {
            ats_score: keyword_score(&entry.requirement, record),
            candidate: None,
        })
    }
}

#[derive(Default)]
pub(crate) struct InMemoryEngagementService {
    flags: Mutex<HashMap<CandidateId, EngagementFlags>>,
}

impl InMemoryEngagementService {
    pub(crate) fn from_catalog(catalog: &Catalog) -> Self {
        Self {
            flags: Mutex::new(catalog.flags()),
        }
    }

    fn update<F>(&self, candidate: &CandidateId, change: F) -> Result<EngagementFlags, EngagementError>
    where
        F: FnOnce(&mut EngagementFlags),
    {
        let mut guard = self.flags.lock().expect("engagement mutex poisoned");
        let flags = guard
            .get_mut(candidate)
            .ok_or_else(|| EngagementError::CandidateNotFound(candidate.clone()))?;
        change(flags);
        Ok(*flags)
    }
}

#[async_trait]
impl EngagementService for InMemoryEngagementService {
    async fn set_liked(
        &self,
        candidate: &CandidateId,
        liked: bool,
    ) -> Result<EngagementFlags, EngagementError> {
        self.update(candidate, |flags| {
            flags.like_count = if liked {
                flags.like_count.saturating_add(1)
            } else {
                flags.like_count.saturating_sub(1)
            };
        })
    }

    async fn set_saved(
        &self,
        candidate: &CandidateId,
        saved: bool,
    ) -> Result<EngagementFlags, EngagementError> {
        self.update(candidate, |flags| flags.is_saved = saved)
    }

    async fn mark_viewed(&self, candidate: &CandidateId) -> Result<EngagementFlags, EngagementError> {
        self.update(candidate, |flags| flags.is_viewed = true)
    }
}
