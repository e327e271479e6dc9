use crate::infra::{
    Catalog, InMemoryCandidateSource, InMemoryEngagementService, KeywordScoringService,
};
use crate::server::LOCAL_SCORER_CONCURRENCY;
use chrono::Local;
use clap::Args;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use talent_match::config::AppConfig;
use talent_match::error::AppError;
use talent_match::workflows::matching::{
    normalize_skills, CandidateRecord, FilterSpec, ListQuery, MatchingService, RecordNormalizer,
    RequirementId, RunRequest, RunSummary, ValueRange, VerificationFlag, FULL_SALARY_RANGE,
};

#[derive(Args, Debug, Default)]
pub(crate) struct RankArgs {
    /// Candidate catalog (JSON) to rank from
    #[arg(long)]
    pub(crate) catalog: PathBuf,
    /// Requirement id to rank. Defaults to the first requirement in the catalog.
    #[arg(long)]
    pub(crate) requirement: Option<String>,
    /// Keep candidates whose name, designation, headline, or summary mentions this text
    #[arg(long)]
    pub(crate) keyword: Option<String>,
    /// Keep candidates with a matching current or preferred location
    #[arg(long)]
    pub(crate) location: Option<String>,
    /// Drop candidates with a matching current or preferred location
    #[arg(long)]
    pub(crate) exclude_location: Option<String>,
    /// Keep candidates holding any of these skills (repeatable)
    #[arg(long = "skill")]
    pub(crate) skills: Vec<String>,
    /// Drop candidates holding any of these skills (repeatable)
    #[arg(long = "exclude-skill")]
    pub(crate) exclude_skills: Vec<String>,
    /// Keep candidates whose education mentions any of these terms (repeatable)
    #[arg(long)]
    pub(crate) education: Vec<String>,
    #[arg(long)]
    pub(crate) min_experience: Option<f64>,
    #[arg(long)]
    pub(crate) max_experience: Option<f64>,
    /// Lower salary bound in lakhs per annum
    #[arg(long)]
    pub(crate) min_salary: Option<f64>,
    /// Upper salary bound in lakhs per annum
    #[arg(long)]
    pub(crate) max_salary: Option<f64>,
    /// Required verification: phone, email, or profile-complete (repeatable)
    #[arg(long, value_parser = parse_verification)]
    pub(crate) verified: Vec<VerificationFlag>,
    #[arg(long)]
    pub(crate) saved_only: bool,
    #[arg(long)]
    pub(crate) viewed_only: bool,
    /// Override the scorer's suggested concurrency
    #[arg(long)]
    pub(crate) concurrency: Option<usize>,
    /// Delay between scoring batches in milliseconds
    #[arg(long, default_value_t = 0)]
    pub(crate) pacing_ms: u64,
    /// Print only the first N ranked candidates
    #[arg(long)]
    pub(crate) top: Option<usize>,
}

impl RankArgs {
    fn filter_spec(&self) -> FilterSpec {
        let experience = (self.min_experience.is_some() || self.max_experience.is_some()).then(|| {
            ValueRange::new(
                self.min_experience.unwrap_or(0.0),
                self.max_experience.unwrap_or(f64::MAX),
            )
        });
        let salary = (self.min_salary.is_some() || self.max_salary.is_some()).then(|| {
            ValueRange::new(
                self.min_salary.unwrap_or(FULL_SALARY_RANGE.min),
                self.max_salary.unwrap_or(FULL_SALARY_RANGE.max),
            )
        });

        FilterSpec {
            experience,
            salary,
            keyword: self.keyword.clone(),
            location_include: self.location.clone(),
            location_exclude: self.exclude_location.clone(),
            skills_include: self.skills.clone(),
            skills_exclude: self.exclude_skills.clone(),
            education: self.education.clone(),
            verification: self.verified.iter().copied().collect::<BTreeSet<_>>(),
            saved_only: self.saved_only,
            accessed_only: self.viewed_only,
        }
    }
}

pub(crate) fn parse_verification(raw: &str) -> Result<VerificationFlag, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "phone" => Ok(VerificationFlag::Phone),
        "email" => Ok(VerificationFlag::Email),
        "profile" | "profile-complete" | "profile_complete" => Ok(VerificationFlag::ProfileComplete),
        other => Err(format!(
            "unknown verification '{other}' (expected phone, email, or profile-complete)"
        )),
    }
}

pub(crate) async fn run_rank(args: RankArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let catalog = Catalog::load(&args.catalog)?;

    let requirement = match args
        .requirement
        .clone()
        .or_else(|| catalog.requirements.first().map(|entry| entry.requirement.id.0.clone()))
    {
        Some(id) => RequirementId(id),
        None => {
            println!("Catalog {} lists no requirements", args.catalog.display());
            return Ok(());
        }
    };

    let mut settings = config.scoring.orchestrator_settings();
    settings.pacing = Duration::from_millis(args.pacing_ms);
    if args.concurrency.is_some() {
        settings.concurrency_override = args.concurrency;
    }

    let source = Arc::new(InMemoryCandidateSource::from_catalog(&catalog));
    let service = MatchingService::new(
        source.clone(),
        Arc::new(KeywordScoringService::new(source, LOCAL_SCORER_CONCURRENCY)),
        Arc::new(InMemoryEngagementService::from_catalog(&catalog)),
        settings,
        config.salary_policy,
    );

    let query = ListQuery {
        page_size: u32::MAX,
        ..ListQuery::default()
    };
    let refreshed = service
        .refresh(&requirement, &query, &args.filter_spec())
        .await?;
    println!(
        "Ranking for {} ({})",
        refreshed.requirement.title, refreshed.requirement.id
    );
    println!(
        "- {} candidates fetched | {} matched filters",
        refreshed.fetched, refreshed.matched
    );

    if refreshed.matched == 0 {
        println!("No candidates to score");
        return Ok(());
    }

    let targets = refreshed
        .view
        .candidates
        .iter()
        .map(|candidate| candidate.id.clone())
        .collect();
    let summary = service
        .score(&requirement, RunRequest::candidates(targets))
        .await?;

    let view = service.view(&requirement)?;
    let normalizer = RecordNormalizer::new(Local::now().date_naive(), config.salary_policy);
    render_ranking(&normalizer, &view.candidates, args.top);
    render_summary(&summary);

    Ok(())
}

fn render_ranking(
    normalizer: &RecordNormalizer,
    candidates: &[CandidateRecord],
    top: Option<usize>,
) {
    println!(
        "\n{:>3}  {:>5}  {:<28} {:>10}  {:>13}  Skills",
        "#", "Score", "Candidate", "Experience", "Salary (LPA)"
    );
    for (rank, candidate) in candidates
        .iter()
        .take(top.unwrap_or(candidates.len()))
        .enumerate()
    {
        let normalized = normalizer.normalize(candidate);
        let score = candidate
            .ats_score()
            .map(|score| format!("{score:.0}"))
            .unwrap_or_else(|| "-".to_string());
        let salary = match (normalized.current_salary_lpa, normalized.expected_salary_lpa) {
            (Some(current), Some(expected)) => format!("{current:.1} / {expected:.1}"),
            (Some(current), None) => format!("{current:.1}"),
            (None, Some(expected)) => format!("- / {expected:.1}"),
            (None, None) => "-".to_string(),
        };
        let skills: Vec<String> = normalize_skills(candidate)
            .into_iter()
            .map(|skill| skill.display)
            .collect();
        println!(
            "{:>3}  {:>5}  {:<28} {:>6.1} yrs  {:>13}  {}",
            rank + 1,
            score,
            format!("{} ({})", candidate.name, candidate.id),
            normalized.experience_years,
            salary,
            skills.join(", ")
        );
    }
}

fn render_summary(summary: &RunSummary) {
    println!(
        "\nScoring {}: {} scored | {} failed | {} skipped of {}",
        summary.token, summary.succeeded, summary.failed, summary.skipped, summary.total
    );
}
