use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::domain::CandidateRecord;
use super::normalizer::{NormalizedCandidate, RecordNormalizer};

/// Profile completion percentage that satisfies the profile-complete flag.
pub const PROFILE_COMPLETE_THRESHOLD: u8 = 80;

/// Salary slider extent, in lakhs per annum. A salary filter equal to this range
/// does not restrict the listing.
pub const FULL_SALARY_RANGE: ValueRange = ValueRange::new(0.0, 100.0);

/// Inclusive numeric range used by the experience and salary filters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Verification requirements a candidate must satisfy together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationFlag {
    Phone,
    Email,
    ProfileComplete,
}

impl VerificationFlag {
    pub fn satisfied_by(self, candidate: &CandidateRecord) -> bool {
        match self {
            VerificationFlag::Phone => candidate.phone_verified,
            VerificationFlag::Email => candidate.email_verified,
            VerificationFlag::ProfileComplete => {
                candidate.profile_completion >= PROFILE_COMPLETE_THRESHOLD
            }
        }
    }
}

/// Declarative filter selection made on the candidate listing screen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    pub experience: Option<ValueRange>,
    pub salary: Option<ValueRange>,
    pub keyword: Option<String>,
    pub location_include: Option<String>,
    pub location_exclude: Option<String>,
    pub skills_include: Vec<String>,
    pub skills_exclude: Vec<String>,
    pub education: Vec<String>,
    pub verification: BTreeSet<VerificationFlag>,
    pub saved_only: bool,
    pub accessed_only: bool,
}

/// Malformed filter input. These are corrected in place and logged, never returned
/// to the caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterIssue {
    #[error("{field} range has a non-finite bound; range ignored")]
    NonFiniteBound { field: &'static str },
    #[error("{field} range minimum {min} exceeds maximum {max}; bounds swapped")]
    InvertedRange {
        field: &'static str,
        min: f64,
        max: f64,
    },
    #[error("{field} range bound {value} is negative; clamped to zero")]
    NegativeBound { field: &'static str, value: f64 },
}

impl FilterSpec {
    /// Returns a corrected copy: trimmed and lowercased terms, comma-separated terms
    /// split apart, and numeric ranges clamped into a usable shape.
    pub fn sanitized(&self) -> (FilterSpec, Vec<FilterIssue>) {
        let mut issues = Vec::new();
        let spec = FilterSpec {
            experience: sanitize_range("experience", self.experience, &mut issues),
            salary: sanitize_range("salary", self.salary, &mut issues),
            keyword: sanitize_text(self.keyword.as_deref()),
            location_include: sanitize_text(self.location_include.as_deref()),
            location_exclude: sanitize_text(self.location_exclude.as_deref()),
            skills_include: split_terms(&self.skills_include),
            skills_exclude: split_terms(&self.skills_exclude),
            education: split_terms(&self.education),
            verification: self.verification.clone(),
            saved_only: self.saved_only,
            accessed_only: self.accessed_only,
        };
        (spec, issues)
    }

    /// Independent predicates for an already sanitized spec.
    pub fn predicates(&self) -> Vec<Predicate> {
        let mut predicates = Vec::new();

        if let Some(keyword) = &self.keyword {
            predicates.push(Predicate::Keyword(keyword.clone()));
        }
        if let Some(location) = &self.location_include {
            predicates.push(Predicate::LocationInclude(location.clone()));
        }
        if let Some(location) = &self.location_exclude {
            predicates.push(Predicate::LocationExclude(location.clone()));
        }
        if !self.skills_include.is_empty() {
            predicates.push(Predicate::SkillsInclude(self.skills_include.clone()));
        }
        if !self.skills_exclude.is_empty() {
            predicates.push(Predicate::SkillsExclude(self.skills_exclude.clone()));
        }
        if let Some(range) = self.experience {
            predicates.push(Predicate::Experience(range));
        }
        if let Some(range) = self.salary.filter(|range| *range != FULL_SALARY_RANGE) {
            predicates.push(Predicate::Salary(range));
        }
        if !self.verification.is_empty() {
            predicates.push(Predicate::Verification(self.verification.clone()));
        }
        if !self.education.is_empty() {
            predicates.push(Predicate::Education(self.education.clone()));
        }
        if self.saved_only {
            predicates.push(Predicate::SavedOnly);
        }
        if self.accessed_only {
            predicates.push(Predicate::AccessedOnly);
        }

        predicates
    }
}

/// One filter criterion. Each variant reads the candidate and its normalized values
/// only, so predicates can be evaluated in any order.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Keyword(String),
    LocationInclude(String),
    LocationExclude(String),
    SkillsInclude(Vec<String>),
    SkillsExclude(Vec<String>),
    Experience(ValueRange),
    Salary(ValueRange),
    Verification(BTreeSet<VerificationFlag>),
    Education(Vec<String>),
    SavedOnly,
    AccessedOnly,
}

impl Predicate {
    pub fn matches(&self, candidate: &CandidateRecord, normalized: &NormalizedCandidate) -> bool {
        match self {
            Predicate::Keyword(keyword) => [
                Some(candidate.name.as_str()),
                candidate.designation.as_deref(),
                candidate.headline.as_deref(),
                candidate.summary.as_deref(),
            ]
            .into_iter()
            .flatten()
            .any(|field| contains_ignore_case(field, keyword)),
            Predicate::LocationInclude(location) => location_matches(candidate, location),
            Predicate::LocationExclude(location) => !location_matches(candidate, location),
            Predicate::SkillsInclude(terms) => normalized
                .skills
                .iter()
                .any(|skill| terms.iter().any(|term| skill.key.contains(term.as_str()))),
            Predicate::SkillsExclude(terms) => !normalized
                .skills
                .iter()
                .any(|skill| terms.iter().any(|term| skill.key.contains(term.as_str()))),
            Predicate::Experience(range) => range.contains(normalized.experience_years),
            Predicate::Salary(range) => normalized.salaries().any(|lpa| range.contains(lpa)),
            Predicate::Verification(flags) => {
                flags.iter().all(|flag| flag.satisfied_by(candidate))
            }
            Predicate::Education(terms) => [candidate.education_text(), candidate.primary_degree()]
                .into_iter()
                .flatten()
                .any(|field| terms.iter().any(|term| contains_ignore_case(field, term))),
            Predicate::SavedOnly => candidate.is_saved,
            Predicate::AccessedOnly => candidate.is_viewed,
        }
    }
}

/// Applies filter specs over candidate collections, preserving input order.
#[derive(Debug, Clone, Copy)]
pub struct FilterEngine {
    normalizer: RecordNormalizer,
}

impl FilterEngine {
    pub fn new(normalizer: RecordNormalizer) -> Self {
        Self { normalizer }
    }

    pub fn normalizer(&self) -> &RecordNormalizer {
        &self.normalizer
    }

    pub fn apply(&self, candidates: Vec<CandidateRecord>, spec: &FilterSpec) -> Vec<CandidateRecord> {
        let (spec, issues) = spec.sanitized();
        for issue in &issues {
            warn!(%issue, "filter input adjusted");
        }

        self.apply_predicates(candidates, &spec.predicates())
    }

    pub fn apply_predicates(
        &self,
        candidates: Vec<CandidateRecord>,
        predicates: &[Predicate],
    ) -> Vec<CandidateRecord> {
        if predicates.is_empty() {
            return candidates;
        }

        let before = candidates.len();
        let filtered: Vec<_> = candidates
            .into_iter()
            .filter(|candidate| {
                let normalized = self.normalizer.normalize(candidate);
                predicates
                    .iter()
                    .all(|predicate| predicate.matches(candidate, &normalized))
            })
            .collect();

        debug!(
            predicates = predicates.len(),
            before,
            after = filtered.len(),
            "candidate filter applied"
        );
        filtered
    }
}

fn location_matches(candidate: &CandidateRecord, location: &str) -> bool {
    candidate
        .current_location
        .iter()
        .chain(candidate.preferred_locations.iter())
        .any(|field| contains_ignore_case(field, location))
}

/// `needle` is expected to be lowercase already.
fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

fn sanitize_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_lowercase)
}

fn split_terms(terms: &[String]) -> Vec<String> {
    terms
        .iter()
        .flat_map(|term| term.split(','))
        .filter_map(|term| sanitize_text(Some(term)))
        .collect()
}

fn sanitize_range(
    field: &'static str,
    range: Option<ValueRange>,
    issues: &mut Vec<FilterIssue>,
) -> Option<ValueRange> {
    let range = range?;
    if !range.min.is_finite() || !range.max.is_finite() {
        issues.push(FilterIssue::NonFiniteBound { field });
        return None;
    }

    let (mut min, mut max) = (range.min, range.max);
    if min > max {
        issues.push(FilterIssue::InvertedRange { field, min, max });
        std::mem::swap(&mut min, &mut max);
    }
    for bound in [&mut min, &mut max] {
        if *bound < 0.0 {
            issues.push(FilterIssue::NegativeBound {
                field,
                value: *bound,
            });
            *bound = 0.0;
        }
    }

    Some(ValueRange::new(min, max))
}
