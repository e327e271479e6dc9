use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for candidates listed against a requirement.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CandidateId(pub String);

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier for an employer job requirement; also keys a display context.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequirementId(pub String);

impl fmt::Display for RequirementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single employment entry. Dates arrive as free-form strings from the data service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkExperience {
    pub company: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub is_current: bool,
}

/// Skills are sent either as a list or as one comma-delimited string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SkillsField {
    List(Vec<String>),
    Delimited(String),
}

impl Default for SkillsField {
    fn default() -> Self {
        SkillsField::List(Vec::new())
    }
}

/// Structured education row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EducationEntry {
    pub degree: Option<String>,
    pub institution: Option<String>,
    pub year: Option<String>,
}

/// Education is either a free-text line or a structured list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EducationField {
    Text(String),
    Entries(Vec<EducationEntry>),
}

/// Relevance score paired with its calculation time. Holding both in one value keeps
/// a score from ever existing without its timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtsScore {
    pub score: f64,
    pub calculated_at: DateTime<Utc>,
}

/// Engagement flags owned by the engagement service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementFlags {
    pub is_viewed: bool,
    pub is_saved: bool,
    pub like_count: u32,
}

/// Candidate row as delivered by the candidate data service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateRecord {
    pub id: CandidateId,
    pub name: String,
    pub designation: Option<String>,
    pub headline: Option<String>,
    pub summary: Option<String>,
    pub current_location: Option<String>,
    pub preferred_locations: Vec<String>,
    pub work_experiences: Vec<WorkExperience>,
    pub experience_text: Option<String>,
    pub experience_years: Option<f64>,
    pub current_salary: Option<String>,
    pub expected_salary: Option<String>,
    pub skills: SkillsField,
    pub education: Option<EducationField>,
    pub education_details: Vec<EducationEntry>,
    pub phone_verified: bool,
    pub email_verified: bool,
    pub profile_completion: u8,
    pub ats: Option<AtsScore>,
    pub is_viewed: bool,
    pub is_saved: bool,
    pub like_count: u32,
}

impl CandidateRecord {
    pub fn ats_score(&self) -> Option<f64> {
        self.ats.map(|ats| ats.score)
    }

    pub fn engagement(&self) -> EngagementFlags {
        EngagementFlags {
            is_viewed: self.is_viewed,
            is_saved: self.is_saved,
            like_count: self.like_count,
        }
    }

    pub fn apply_engagement(&mut self, flags: EngagementFlags) {
        self.is_viewed = flags.is_viewed;
        self.is_saved = flags.is_saved;
        self.like_count = flags.like_count;
    }

    /// Free-text education line, when the record carries one.
    pub fn education_text(&self) -> Option<&str> {
        match &self.education {
            Some(EducationField::Text(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    /// Degree of the first structured education row, preferring `education_details`.
    pub fn primary_degree(&self) -> Option<&str> {
        let entries: &[EducationEntry] = if !self.education_details.is_empty() {
            &self.education_details
        } else if let Some(EducationField::Entries(entries)) = &self.education {
            entries
        } else {
            &[]
        };
        entries.first().and_then(|entry| entry.degree.as_deref())
    }
}

/// Requirement header returned alongside a candidate page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequirementSummary {
    pub id: RequirementId,
    pub title: String,
    pub skills: Vec<String>,
}

/// Paging metadata from the candidate data service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

/// Listing request forwarded to the candidate data service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    pub page: u32,
    pub page_size: u32,
    pub search: Option<String>,
    pub sort_by: Option<String>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 50,
            search: None,
            sort_by: None,
        }
    }
}

/// One page of candidates for a requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePage {
    pub candidates: Vec<CandidateRecord>,
    pub requirement: RequirementSummary,
    pub pagination: Pagination,
}
