use std::collections::HashSet;
use std::sync::OnceLock;

use chrono::{DateTime, Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::domain::{CandidateRecord, SkillsField, WorkExperience};

const UNITS_PER_LAKH: f64 = 100_000.0;
const MONTHS_PER_YEAR: f64 = 12.0;

static NUMERIC_TOKEN: OnceLock<Regex> = OnceLock::new();

fn numeric_token() -> &'static Regex {
    NUMERIC_TOKEN
        .get_or_init(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").expect("numeric token pattern"))
}

/// Thresholds used to infer the unit of a salary string that does not name one.
///
/// Values at or above `annual_threshold` are annual figures in base currency units,
/// values in `[monthly_threshold, annual_threshold)` are monthly figures, and anything
/// smaller is taken to already be in lakhs per annum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SalaryUnitPolicy {
    pub annual_threshold: f64,
    pub monthly_threshold: f64,
}

impl Default for SalaryUnitPolicy {
    fn default() -> Self {
        Self {
            annual_threshold: 100_000.0,
            monthly_threshold: 1_000.0,
        }
    }
}

/// Skill token keeping the display casing next to the matching key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillToken {
    pub display: String,
    pub key: String,
}

/// Canonical comparable values derived from one candidate record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedCandidate {
    pub experience_years: f64,
    pub current_salary_lpa: Option<f64>,
    pub expected_salary_lpa: Option<f64>,
    pub skills: Vec<SkillToken>,
}

impl NormalizedCandidate {
    pub fn salaries(&self) -> impl Iterator<Item = f64> + '_ {
        self.current_salary_lpa
            .iter()
            .chain(self.expected_salary_lpa.iter())
            .copied()
    }
}

/// Reconciles heterogeneous candidate fields into comparable values.
#[derive(Debug, Clone, Copy)]
pub struct RecordNormalizer {
    today: NaiveDate,
    salary_policy: SalaryUnitPolicy,
}

impl RecordNormalizer {
    pub fn new(today: NaiveDate, salary_policy: SalaryUnitPolicy) -> Self {
        Self {
            today,
            salary_policy,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn salary_policy(&self) -> SalaryUnitPolicy {
        self.salary_policy
    }

    pub fn normalize(&self, record: &CandidateRecord) -> NormalizedCandidate {
        NormalizedCandidate {
            experience_years: self.experience_years(record),
            current_salary_lpa: self.salary_lpa(record.current_salary.as_deref()),
            expected_salary_lpa: self.salary_lpa(record.expected_salary.as_deref()),
            skills: normalize_skills(record),
        }
    }

    /// Experience in years, resolved in order: work history spans, the first number in
    /// the free-text field, the explicit numeric field, then zero.
    pub fn experience_years(&self, record: &CandidateRecord) -> f64 {
        if !record.work_experiences.is_empty() {
            let months: u32 = record
                .work_experiences
                .iter()
                .map(|entry| self.months_in(entry))
                .sum();
            if months > 0 {
                return f64::from(months) / MONTHS_PER_YEAR;
            }
        }

        if let Some(years) = record.experience_text.as_deref().and_then(first_number) {
            return years;
        }

        record
            .experience_years
            .filter(|years| years.is_finite() && *years >= 0.0)
            .unwrap_or(0.0)
    }

    /// Salary expressed in lakhs per annum, or `None` when nothing usable is present.
    pub fn salary_lpa(&self, raw: Option<&str>) -> Option<f64> {
        let raw = raw?.trim();
        if raw.is_empty()
            || raw.eq_ignore_ascii_case("null")
            || raw.eq_ignore_ascii_case("not specified")
        {
            return None;
        }

        let value = first_number(raw)?;
        let lowered = raw.to_lowercase();
        if lowered.contains("lpa") || lowered.contains("lakh") {
            return Some(value);
        }

        let policy = &self.salary_policy;
        if value >= policy.annual_threshold {
            Some(value / UNITS_PER_LAKH)
        } else if value >= policy.monthly_threshold {
            Some(value * MONTHS_PER_YEAR / UNITS_PER_LAKH)
        } else {
            Some(value)
        }
    }

    fn months_in(&self, entry: &WorkExperience) -> u32 {
        let Some(start) = entry.start_date.as_deref().and_then(parse_date) else {
            return 0;
        };

        let end = if entry.is_current {
            Some(self.today)
        } else {
            match entry.end_date.as_deref().map(str::trim) {
                None | Some("") => Some(self.today),
                Some(raw) => parse_date(raw),
            }
        };

        end.map(|end| month_span(start, end)).unwrap_or(0)
    }
}

/// Skill tokens from either the list or the delimited form, deduplicated by lowercase key.
pub fn normalize_skills(record: &CandidateRecord) -> Vec<SkillToken> {
    let raw: Vec<&str> = match &record.skills {
        SkillsField::List(items) => items.iter().flat_map(|item| item.split(',')).collect(),
        SkillsField::Delimited(text) => text.split(',').collect(),
    };

    let mut seen = HashSet::new();
    raw.into_iter()
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter_map(|token| {
            let key = token.to_lowercase();
            seen.insert(key.clone()).then(|| SkillToken {
                display: token.to_string(),
                key,
            })
        })
        .collect()
}

fn first_number(text: &str) -> Option<f64> {
    let token = numeric_token().find(text)?;
    token.as_str().replace(',', "").parse::<f64>().ok()
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.date_naive());
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{trimmed}-01"), "%Y-%m-%d"))
        .ok()
}

fn month_span(start: NaiveDate, end: NaiveDate) -> u32 {
    let months = (end.year() - start.year()) * 12 + end.month() as i32 - start.month() as i32;
    u32::try_from(months).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::matching::domain::CandidateId;

    fn normalizer() -> RecordNormalizer {
        RecordNormalizer::new(
            NaiveDate::from_ymd_opt(2025, 10, 1).expect("valid today"),
            SalaryUnitPolicy::default(),
        )
    }

    fn record() -> CandidateRecord {
        CandidateRecord {
            id: CandidateId("c-1".to_string()),
            name: "Asha Rao".to_string(),
            ..CandidateRecord::default()
        }
    }

    fn job(start: Option<&str>, end: Option<&str>, is_current: bool) -> WorkExperience {
        WorkExperience {
            company: None,
            start_date: start.map(str::to_string),
            end_date: end.map(str::to_string),
            is_current,
        }
    }

    #[test]
    fn salary_units_follow_threshold_policy() {
        let normalizer = normalizer();
        assert_eq!(normalizer.salary_lpa(Some("500000")), Some(5.0));
        assert_eq!(normalizer.salary_lpa(Some("50000")), Some(6.0));
        assert_eq!(normalizer.salary_lpa(Some("5 LPA")), Some(5.0));
        assert_eq!(normalizer.salary_lpa(Some("12.5")), Some(12.5));
        assert_eq!(normalizer.salary_lpa(Some("₹ 5,00,000 per annum")), Some(5.0));
        assert_eq!(normalizer.salary_lpa(Some("7.5 Lakhs")), Some(7.5));
    }

    #[test]
    fn salary_placeholders_are_absent() {
        let normalizer = normalizer();
        assert_eq!(normalizer.salary_lpa(Some("Not specified")), None);
        assert_eq!(normalizer.salary_lpa(Some("null")), None);
        assert_eq!(normalizer.salary_lpa(Some("   ")), None);
        assert_eq!(normalizer.salary_lpa(Some("negotiable")), None);
        assert_eq!(normalizer.salary_lpa(None), None);
    }

    #[test]
    fn salary_policy_thresholds_are_configurable() {
        let normalizer = RecordNormalizer::new(
            NaiveDate::from_ymd_opt(2025, 10, 1).expect("valid today"),
            SalaryUnitPolicy {
                annual_threshold: 1_000_000.0,
                monthly_threshold: 10_000.0,
            },
        );
        assert_eq!(normalizer.salary_lpa(Some("500000")), Some(60.0));
        assert_eq!(normalizer.salary_lpa(Some("5000")), Some(5000.0));
    }

    #[test]
    fn experience_sums_work_history_spans() {
        let mut candidate = record();
        candidate.work_experiences = vec![job(Some("2019-01-01"), Some("2021-01-01"), false)];
        let years = normalizer().experience_years(&candidate);
        assert!((years - 2.0).abs() < 0.01, "expected 2 years, got {years}");
    }

    #[test]
    fn current_role_runs_until_today() {
        let mut candidate = record();
        candidate.work_experiences = vec![
            job(Some("2024-10-01"), None, true),
            job(Some("2022-04"), Some("2023-04"), false),
        ];
        let years = normalizer().experience_years(&candidate);
        assert!((years - 2.0).abs() < 0.01, "expected 2 years, got {years}");
    }

    #[test]
    fn unparsable_history_falls_back_to_text_then_field() {
        let mut candidate = record();
        candidate.work_experiences = vec![job(Some("sometime"), Some("2021-01-01"), false)];
        candidate.experience_text = Some("around 4.5 years".to_string());
        candidate.experience_years = Some(9.0);
        assert_eq!(normalizer().experience_years(&candidate), 4.5);

        candidate.experience_text = Some("fresher".to_string());
        assert_eq!(normalizer().experience_years(&candidate), 9.0);

        candidate.experience_years = None;
        assert_eq!(normalizer().experience_years(&candidate), 0.0);
    }

    #[test]
    fn skills_accept_both_shapes() {
        let mut candidate = record();
        candidate.skills = SkillsField::Delimited(" Rust, SQL ,rust,, Kafka".to_string());
        let skills = normalize_skills(&candidate);
        let keys: Vec<_> = skills.iter().map(|token| token.key.as_str()).collect();
        assert_eq!(keys, vec!["rust", "sql", "kafka"]);
        assert_eq!(skills[0].display, "Rust");

        candidate.skills = SkillsField::List(vec!["Go".to_string(), "gRPC, Docker".to_string()]);
        let keys: Vec<_> = normalize_skills(&candidate)
            .into_iter()
            .map(|token| token.key)
            .collect();
        assert_eq!(keys, vec!["go", "grpc", "docker"]);
    }
}
