use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::{
    build_service, candidates, read_json_body, requirement, roster, MemoryEngagement,
    MemorySource, StubScoring,
};
use crate::workflows::matching::domain::ListQuery;
use crate::workflows::matching::filter::FilterSpec;
use crate::workflows::matching::router::{matching_router, ranking_handler};

fn json_request(uri: &str, body: Value) -> axum::http::Request<axum::body::Body> {
    axum::http::Request::post(uri)
        .header(axum::http::header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(
            serde_json::to_vec(&body).expect("serialize body"),
        ))
        .expect("request builds")
}

#[tokio::test]
async fn search_route_returns_filtered_listing() {
    let (service, _) = build_service(
        MemorySource::with_listing(requirement(), roster()),
        StubScoring::new(&[], 2),
    );
    let router = matching_router(Arc::new(service));

    let response = router
        .oneshot(json_request(
            "/api/v1/requirements/req-backend/candidates/search",
            json!({
                "query": { "page": 1, "page_size": 25 },
                "filter": { "location_include": "pune" }
            }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["matched"], json!(2));
    assert_eq!(payload["pagination"]["page_size"], json!(25));
    assert_eq!(payload["view"]["candidates"][0]["id"], json!("priya"));
}

#[tokio::test]
async fn ranking_handler_returns_not_found_for_unloaded_requirement() {
    let (service, _) = build_service(MemorySource::default(), StubScoring::new(&[], 1));

    let response = ranking_handler::<MemorySource, StubScoring, MemoryEngagement>(
        State(Arc::new(service)),
        Path("req-missing".to_string()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let payload = read_json_body(response).await;
    assert_eq!(payload["retryable"], json!(false));
}

#[tokio::test]
async fn start_run_route_accepts_and_reports_the_plan() {
    let (service, _) = build_service(
        MemorySource::with_listing(requirement(), candidates(&["a", "b", "c"])),
        StubScoring::new(&[("a", 10.0), ("b", 20.0), ("c", 30.0)], 4),
    );
    let service = Arc::new(service);
    service
        .refresh(&requirement(), &ListQuery::default(), &FilterSpec::default())
        .await
        .expect("listing refreshes");

    let response = matching_router(service.clone())
        .oneshot(json_request(
            "/api/v1/requirements/req-backend/ats-runs",
            json!({ "candidate_ids": ["a", "c"] }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["token"], json!(1));
    assert_eq!(payload["target_count"], json!(2));
    assert_eq!(payload["concurrency_limit"], json!(4));
}

#[tokio::test]
async fn start_run_route_maps_refusal_to_bad_gateway() {
    let (service, _) = build_service(MemorySource::default(), StubScoring::refusing());

    let response = matching_router(Arc::new(service))
        .oneshot(json_request(
            "/api/v1/requirements/req-backend/ats-runs",
            json!({}),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let payload = read_json_body(response).await;
    assert_eq!(payload["retryable"], json!(true));
}

#[tokio::test]
async fn engagement_route_returns_updated_flags() {
    let (service, _) = build_service(
        MemorySource::with_listing(requirement(), candidates(&["a"])),
        StubScoring::new(&[], 1),
    );
    let service = Arc::new(service);
    service
        .refresh(&requirement(), &ListQuery::default(), &FilterSpec::default())
        .await
        .expect("listing refreshes");

    let response = matching_router(service.clone())
        .oneshot(json_request(
            "/api/v1/requirements/req-backend/candidates/a/engagement",
            json!({ "action": "save" }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["is_saved"], json!(true));

    let missing = matching_router(service)
        .oneshot(json_request(
            "/api/v1/requirements/req-backend/candidates/zed/engagement",
            json!({ "action": "like" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}
