use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::matching::domain::{
    AtsScore, CandidateId, CandidatePage, CandidateRecord, EducationEntry, EducationField,
    EngagementFlags, ListQuery, Pagination, RequirementId, RequirementSummary, SkillsField,
    WorkExperience,
};
use crate::workflows::matching::normalizer::{RecordNormalizer, SalaryUnitPolicy};
use crate::workflows::matching::orchestrator::OrchestratorSettings;
use crate::workflows::matching::ports::{
    CandidateSource, CandidateSourceError, EngagementError, EngagementService, RunPlan,
    RunRequest, RunTarget, ScoredCandidate, ScoringError, ScoringService,
};
use crate::workflows::matching::service::MatchingService;
use crate::workflows::matching::FilterEngine;

pub(super) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 10, 1).expect("valid date")
}

pub(super) fn engine() -> FilterEngine {
    FilterEngine::new(RecordNormalizer::new(today(), SalaryUnitPolicy::default()))
}

pub(super) fn id(value: &str) -> CandidateId {
    CandidateId(value.to_string())
}

pub(super) fn ids(values: &[&str]) -> Vec<CandidateId> {
    values.iter().map(|value| id(value)).collect()
}

pub(super) fn requirement() -> RequirementId {
    RequirementId("req-backend".to_string())
}

pub(super) fn scored_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 1, 9, 30, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn ats(score: f64) -> AtsScore {
    AtsScore {
        score,
        calculated_at: scored_at(),
    }
}

pub(super) fn candidate(value: &str) -> CandidateRecord {
    CandidateRecord {
        id: id(value),
        name: format!("Candidate {value}"),
        ..CandidateRecord::default()
    }
}

pub(super) fn candidates(values: &[&str]) -> Vec<CandidateRecord> {
    values.iter().map(|value| candidate(value)).collect()
}

pub(super) fn view_ids(records: &[CandidateRecord]) -> Vec<String> {
    records.iter().map(|record| record.id.0.clone()).collect()
}

/// Five candidates with deliberately mixed field shapes.
pub(super) fn roster() -> Vec<CandidateRecord> {
    vec![
        CandidateRecord {
            id: id("priya"),
            name: "Priya Nair".to_string(),
            designation: Some("Senior Backend Engineer".to_string()),
            current_location: Some("Bengaluru".to_string()),
            preferred_locations: vec!["Pune".to_string()],
            work_experiences: vec![WorkExperience {
                company: Some("Finch".to_string()),
                start_date: Some("2018-06-01".to_string()),
                end_date: Some("2024-06-01".to_string()),
                is_current: false,
            }],
            current_salary: Some("18 LPA".to_string()),
            expected_salary: Some("2400000".to_string()),
            skills: SkillsField::List(vec!["Rust".to_string(), "PostgreSQL".to_string()]),
            education: Some(EducationField::Text("B.Tech Computer Science".to_string())),
            phone_verified: true,
            email_verified: true,
            profile_completion: 92,
            is_saved: true,
            ..CandidateRecord::default()
        },
        CandidateRecord {
            id: id("arjun"),
            name: "Arjun Mehta".to_string(),
            headline: Some("Data engineer who likes Kafka".to_string()),
            current_location: Some("Mumbai".to_string()),
            experience_text: Some("3 years".to_string()),
            current_salary: Some("75000".to_string()),
            skills: SkillsField::Delimited("Python, Kafka, SQL".to_string()),
            education_details: vec![EducationEntry {
                degree: Some("MCA".to_string()),
                institution: Some("Pune University".to_string()),
                year: Some("2021".to_string()),
            }],
            phone_verified: true,
            profile_completion: 60,
            is_viewed: true,
            ..CandidateRecord::default()
        },
        CandidateRecord {
            id: id("meera"),
            name: "Meera Iyer".to_string(),
            summary: Some("Backend generalist, Go and Rust".to_string()),
            current_location: Some("Chennai".to_string()),
            experience_years: Some(7.0),
            current_salary: Some("Not specified".to_string()),
            skills: SkillsField::List(vec!["Go".to_string(), "rust".to_string()]),
            email_verified: true,
            profile_completion: 85,
            ..CandidateRecord::default()
        },
        CandidateRecord {
            id: id("kabir"),
            name: "Kabir Singh".to_string(),
            designation: Some("QA Analyst".to_string()),
            current_location: Some("Pune".to_string()),
            work_experiences: vec![WorkExperience {
                company: None,
                start_date: Some("2024-10-01".to_string()),
                end_date: None,
                is_current: true,
            }],
            expected_salary: Some("4.5".to_string()),
            skills: SkillsField::Delimited("Selenium, Java".to_string()),
            education: Some(EducationField::Entries(vec![EducationEntry {
                degree: Some("B.Sc".to_string()),
                institution: None,
                year: None,
            }])),
            profile_completion: 40,
            ..CandidateRecord::default()
        },
        CandidateRecord {
            id: id("zoya"),
            name: "Zoya Khan".to_string(),
            designation: Some("Platform Engineer".to_string()),
            current_location: Some("Remote - Delhi".to_string()),
            skills: SkillsField::List(vec!["Kubernetes".to_string(), "Rust".to_string()]),
            phone_verified: true,
            email_verified: true,
            profile_completion: 100,
            ..CandidateRecord::default()
        },
    ]
}

pub(super) fn quick_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        concurrency_override: None,
        pacing: Duration::ZERO,
        call_timeout: None,
    }
}

#[derive(Default)]
pub(super) struct MemorySource {
    listings: Mutex<HashMap<RequirementId, (RequirementSummary, Vec<CandidateRecord>)>>,
    offline: bool,
}

impl MemorySource {
    pub(super) fn with_listing(requirement: RequirementId, records: Vec<CandidateRecord>) -> Self {
        let source = Self::default();
        source.listings.lock().expect("source mutex poisoned").insert(
            requirement.clone(),
            (
                RequirementSummary {
                    id: requirement,
                    title: "Backend Engineer".to_string(),
                    skills: vec!["rust".to_string()],
                },
                records,
            ),
        );
        source
    }

    pub(super) fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl CandidateSource for MemorySource {
    async fn list(
        &self,
        requirement: &RequirementId,
        query: &ListQuery,
    ) -> Result<CandidatePage, CandidateSourceError> {
        if self.offline {
            return Err(CandidateSourceError::Unavailable("connection refused".to_string()));
        }

        let listings = self.listings.lock().expect("source mutex poisoned");
        let (summary, records) = listings
            .get(requirement)
            .ok_or_else(|| CandidateSourceError::RequirementNotFound(requirement.clone()))?;

        Ok(CandidatePage {
            candidates: records.clone(),
            requirement: summary.clone(),
            pagination: Pagination {
                page: query.page,
                page_size: query.page_size,
                total_items: records.len() as u64,
                total_pages: 1,
            },
        })
    }
}

/// Scoring stub with canned per-candidate answers; unknown ids fail with a network error.
pub(super) struct StubScoring {
    scores: HashMap<CandidateId, Result<f64, ScoringError>>,
    suggested_concurrency: usize,
    refuse_runs: bool,
    pub(super) calls: Mutex<Vec<CandidateId>>,
}

impl StubScoring {
    pub(super) fn new(scores: &[(&str, f64)], suggested_concurrency: usize) -> Self {
        Self {
            scores: scores
                .iter()
                .map(|(value, score)| (id(value), Ok(*score)))
                .collect(),
            suggested_concurrency,
            refuse_runs: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn refusing() -> Self {
        Self {
            refuse_runs: true,
            ..Self::new(&[], 1)
        }
    }

    pub(super) fn calls(&self) -> Vec<CandidateId> {
        self.calls.lock().expect("calls mutex poisoned").clone()
    }
}

#[async_trait]
impl ScoringService for StubScoring {
    async fn start_run(
        &self,
        _requirement: &RequirementId,
        request: RunRequest,
    ) -> Result<RunPlan, ScoringError> {
        if self.refuse_runs {
            return Err(ScoringError::Network("scoring gateway offline".to_string()));
        }

        let targets: Vec<CandidateId> = match request.target {
            RunTarget::All => {
                let mut all: Vec<CandidateId> = self.scores.keys().cloned().collect();
                all.sort();
                all
            }
            RunTarget::Candidates(ids) => ids,
        };
        Ok(RunPlan {
            total_candidates: targets.len(),
            target_candidate_ids: targets,
            suggested_concurrency: self.suggested_concurrency,
        })
    }

    async fn score_one(
        &self,
        _requirement: &RequirementId,
        candidate: &CandidateId,
    ) -> Result<ScoredCandidate, ScoringError> {
        self.calls
            .lock()
            .expect("calls mutex poisoned")
            .push(candidate.clone());
        let score = self
            .scores
            .get(candidate)
            .cloned()
            .unwrap_or_else(|| Err(ScoringError::Network(format!("no score for {candidate}"))))?;
        Ok(ScoredCandidate {
            ats_score: score,
            candidate: None,
        })
    }
}

#[derive(Default)]
pub(super) struct MemoryEngagement {
    flags: Mutex<HashMap<CandidateId, EngagementFlags>>,
}

impl MemoryEngagement {
    fn update<F>(&self, candidate: &CandidateId, change: F) -> EngagementFlags
    where
        F: FnOnce(&mut EngagementFlags),
    {
        let mut flags = self.flags.lock().expect("engagement mutex poisoned");
        let entry = flags.entry(candidate.clone()).or_default();
        change(entry);
        *entry
    }
}

#[async_trait]
impl EngagementService for MemoryEngagement {
    async fn set_liked(
        &self,
        candidate: &CandidateId,
        liked: bool,
    ) -> Result<EngagementFlags, EngagementError> {
        Ok(self.update(candidate, |flags| {
            flags.like_count = if liked {
                flags.like_count + 1
            } else {
                flags.like_count.saturating_sub(1)
            };
        }))
    }

    async fn set_saved(
        &self,
        candidate: &CandidateId,
        saved: bool,
    ) -> Result<EngagementFlags, EngagementError> {
        Ok(self.update(candidate, |flags| flags.is_saved = saved))
    }

    async fn mark_viewed(&self, candidate: &CandidateId) -> Result<EngagementFlags, EngagementError> {
        Ok(self.update(candidate, |flags| flags.is_viewed = true))
    }
}

pub(super) type TestService = MatchingService<MemorySource, StubScoring, MemoryEngagement>;

pub(super) fn build_service(
    source: MemorySource,
    scoring: StubScoring,
) -> (TestService, Arc<StubScoring>) {
    let scoring = Arc::new(scoring);
    let service = MatchingService::new(
        Arc::new(source),
        scoring.clone(),
        Arc::new(MemoryEngagement::default()),
        quick_settings(),
        SalaryUnitPolicy::default(),
    );
    (service, scoring)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
