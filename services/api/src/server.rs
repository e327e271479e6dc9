use crate::cli::ServeArgs;
use crate::infra::{
    AppState, Catalog, InMemoryCandidateSource, InMemoryEngagementService, KeywordScoringService,
};
use crate::routes::with_matching_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use talent_match::config::AppConfig;
use talent_match::error::AppError;
use talent_match::telemetry;
use talent_match::workflows::matching::MatchingService;
use tracing::info;

/// Suggested batch size reported by the local keyword scorer.
pub(crate) const LOCAL_SCORER_CONCURRENCY: usize = 4;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let catalog = match args.catalog.take() {
        Some(path) => Catalog::load(&path)?,
        None => Catalog::default(),
    };

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let source = Arc::new(InMemoryCandidateSource::from_catalog(&catalog));
    let scoring = Arc::new(KeywordScoringService::new(
        source.clone(),
        LOCAL_SCORER_CONCURRENCY,
    ));
    let engagement = Arc::new(InMemoryEngagementService::from_catalog(&catalog));
    let matching_service = Arc::new(MatchingService::new(
        source,
        scoring,
        engagement,
        config.scoring.orchestrator_settings(),
        config.salary_policy,
    ));

    let app = with_matching_routes(matching_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        requirements = catalog.requirements.len(),
        "candidate matching service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
