//! Integration tests: submit/get, validation, triage, auth, pagination,
//! cascade delete, summary, bulk status, vocabularies.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use pulse_api::server::{self, AppState};
use pulse_ingest::{Ingestor, Triage};
use pulse_notify::{spawn_notifier, MockNotifier};
use pulse_store::InMemoryRecordStore;
use pulse_types::{PulseConfig, RecordStore};
use serde_json::json;
use std::sync::Arc;
use tower::util::ServiceExt;

const ADMIN_TOKEN: &str = "secret-token";

fn test_app() -> axum::Router {
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    let notify = spawn_notifier(Arc::new(MockNotifier::new()));
    let mut config = PulseConfig::default();
    config.admin_token = ADMIN_TOKEN.to_string();
    let ingestor = Ingestor::new(Arc::clone(&store), notify, config.ingest.clone());
    let triage = Triage::new(Arc::clone(&store));
    let state = Arc::new(AppState {
        store,
        ingestor,
        triage,
        config,
    });
    server::router(state)
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let body = res.into_body().collect().await.unwrap().to_bytes();
    let j: serde_json::Value = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
    };
    (status, j)
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_json_admin(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-pulse-token", ADMIN_TOKEN)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn submit(app: &axum::Router, body: serde_json::Value) -> i64 {
    let (status, j) = send(app, post_json("/feedback", body)).await;
    assert_eq!(status, StatusCode::OK);
    j["id"].as_i64().unwrap()
}

#[tokio::test]
async fn submit_then_get_round_trip() {
    let app = test_app();
    let id = submit(
        &app,
        json!({
            "type": "bug",
            "rating": 2,
            "comment": "checkout page is slow",
            "page_url": "https://shop.example/checkout",
            "page_title": "Checkout",
            "email": "alice@example.com"
        }),
    )
    .await;

    let (status, j) = send(&app, get(&format!("/feedback/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(j["status"], "new");
    assert_eq!(j["rating"], 2);
    assert_eq!(j["body"], "checkout page is slow");
    assert_eq!(j["category"], "bug");
    assert_eq!(j["meta"]["email"], "alice@example.com");
    let history = j["history"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["message"], "created");
}

#[tokio::test]
async fn submit_accepts_events_alias() {
    let app = test_app();
    let (status, j) = send(
        &app,
        post_json("/events", json!({ "type": "page_view", "comment": "landed" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(j["category"], "page_view");
}

#[tokio::test]
async fn invalid_submission_returns_field_errors_and_writes_nothing() {
    let app = test_app();
    let (status, j) = send(&app, post_json("/feedback", json!({ "type": "bug" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let errors = j["errors"].as_array().unwrap();
    assert!(!errors.is_empty());

    let (status, j) = send(&app, get("/feedback")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(j["pagination"]["total"], 0);
}

#[tokio::test]
async fn out_of_range_rating_is_rejected() {
    let app = test_app();
    let (status, j) = send(
        &app,
        post_json("/feedback", json!({ "type": "bug", "rating": 9 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let errors = j["errors"].as_array().unwrap();
    assert!(errors.iter().any(|e| e["field"] == "rating"));
}

#[tokio::test]
async fn admin_resolves_a_report_end_to_end() {
    let app = test_app();
    let id = submit(
        &app,
        json!({ "type": "bug", "rating": 2, "comment": "broken link" }),
    )
    .await;

    let (status, j) = send(
        &app,
        post_json_admin(&format!("/feedback/{}", id), json!({ "status": "resolved" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(j["status"], "resolved");

    let (_, j) = send(&app, get(&format!("/feedback/{}", id))).await;
    let history = j["history"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1]["old_status"], "new");
    assert_eq!(history[1]["new_status"], "resolved");

    // The resolved record still counts toward aggregates.
    let (_, j) = send(&app, get("/feedback/summary")).await;
    assert_eq!(j["total"], 1);
    assert_eq!(j["average_rating"], 2.0);
}

#[tokio::test]
async fn mutating_endpoints_require_the_token() {
    let app = test_app();
    let id = submit(&app, json!({ "type": "bug", "comment": "x" })).await;

    let (status, j) = send(
        &app,
        post_json(&format!("/feedback/{}", id), json!({ "status": "spam" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(j["error"], "forbidden");

    let wrong = Request::builder()
        .method("DELETE")
        .uri(format!("/feedback/{}", id))
        .header("x-pulse-token", "wrong")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, wrong).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The record is untouched.
    let (_, j) = send(&app, get(&format!("/feedback/{}", id))).await;
    assert_eq!(j["status"], "new");
}

#[tokio::test]
async fn update_rejects_unknown_status_and_empty_patch() {
    let app = test_app();
    let id = submit(&app, json!({ "type": "bug", "comment": "x" })).await;

    let (status, _) = send(
        &app,
        post_json_admin(&format!("/feedback/{}", id), json!({ "status": "bogus" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        post_json_admin(&format!("/feedback/{}", id), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_record_returns_404() {
    let app = test_app();
    let (status, j) = send(&app, get("/feedback/9999")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(j["error"], "not found");

    let (status, _) = send(
        &app,
        post_json_admin("/feedback/9999", json!({ "status": "closed" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_cascades_and_get_returns_404() {
    let app = test_app();
    let id = submit(
        &app,
        json!({ "type": "bug", "comment": "x", "email": "a@b.co" }),
    )
    .await;

    let req = Request::builder()
        .method("DELETE")
        .uri(format!("/feedback/{}", id))
        .header("x-pulse-token", ADMIN_TOKEN)
        .body(Body::empty())
        .unwrap();
    let (status, j) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(j["deleted"], true);

    let (status, _) = send(&app, get(&format!("/feedback/{}", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_paginates_without_overlap() {
    let app = test_app();
    for i in 0..45 {
        submit(&app, json!({ "type": "bug", "comment": format!("r{}", i) })).await;
    }

    let mut seen = std::collections::HashSet::new();
    let mut sizes = Vec::new();
    for page in 1..=3 {
        let (status, j) = send(
            &app,
            get(&format!("/feedback?page={}&per_page=20&orderby=id&order=asc", page)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(j["pagination"]["total"], 45);
        assert_eq!(j["pagination"]["pages"], 3);
        let data = j["data"].as_array().unwrap();
        sizes.push(data.len());
        for item in data {
            assert!(seen.insert(item["id"].as_i64().unwrap()));
        }
    }
    assert_eq!(sizes, vec![20, 20, 5]);
    assert_eq!(seen.len(), 45);
}

#[tokio::test]
async fn list_filters_by_status_and_category() {
    let app = test_app();
    let bug = submit(&app, json!({ "type": "bug", "comment": "b" })).await;
    submit(&app, json!({ "type": "praise", "comment": "p" })).await;
    send(
        &app,
        post_json_admin(&format!("/feedback/{}", bug), json!({ "status": "spam" })),
    )
    .await;

    let (_, j) = send(&app, get("/feedback?status=spam")).await;
    assert_eq!(j["pagination"]["total"], 1);
    assert_eq!(j["data"][0]["id"], bug);

    let (_, j) = send(&app, get("/feedback?type=praise")).await;
    assert_eq!(j["pagination"]["total"], 1);
    assert_eq!(j["data"][0]["category"], "praise");
}

#[tokio::test]
async fn summary_counts_and_rating_rules() {
    let app = test_app();
    for rating in [json!(5), json!(5), json!(3), json!(1), json!(null)] {
        submit(
            &app,
            json!({ "type": "bug", "rating": rating, "comment": "r" }),
        )
        .await;
    }

    let (status, j) = send(&app, get("/feedback/summary")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(j["total"], 5);
    assert_eq!(j["average_rating"], 3.5);
    let daily = j["daily"].as_array().unwrap();
    assert_eq!(daily.len(), 1);
    assert_eq!(daily[0]["positive_count"], 2);
    assert_eq!(daily[0]["neutral_count"], 1);
    assert_eq!(daily[0]["negative_count"], 1);
    assert_eq!(j["by_status"][0]["value"], "new");
    assert_eq!(j["by_status"][0]["count"], 5);
}

#[tokio::test]
async fn bulk_status_reports_per_item_outcomes() {
    let app = test_app();
    let a = submit(&app, json!({ "type": "bug", "comment": "a" })).await;
    let b = submit(&app, json!({ "type": "bug", "comment": "b" })).await;

    let (status, j) = send(
        &app,
        post_json_admin(
            "/feedback/bulk_status",
            json!({ "ids": [a, 9999, b], "status": "closed" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let results = j["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["ok"], true);
    assert_eq!(results[1]["ok"], false);
    assert_eq!(results[1]["error"], "not found");
    assert_eq!(results[2]["ok"], true);

    let (_, j) = send(&app, get(&format!("/feedback/{}", a))).await;
    assert_eq!(j["status"], "closed");
}

#[tokio::test]
async fn vocabulary_endpoints_and_health() {
    let app = test_app();

    let (status, j) = send(&app, get("/feedback/types")).await;
    assert_eq!(status, StatusCode::OK);
    let types = j["data"].as_array().unwrap();
    assert!(types.iter().any(|t| t["slug"] == "bug"));

    let (status, j) = send(&app, get("/feedback/statuses")).await;
    assert_eq!(status, StatusCode::OK);
    let statuses = j["data"].as_array().unwrap();
    assert_eq!(statuses.len(), 5);
    assert_eq!(statuses[0]["slug"], "new");
    assert_eq!(statuses[0]["label"], "New");

    let res = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn submitter_header_attributes_the_record() {
    let app = test_app();
    let req = Request::builder()
        .method("POST")
        .uri("/feedback")
        .header("content-type", "application/json")
        .header("x-pulse-user", "u42")
        .body(Body::from(
            json!({ "type": "question", "comment": "how?" }).to_string(),
        ))
        .unwrap();
    let (status, j) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(j["submitter_id"], "u42");
    let id = j["id"].as_i64().unwrap();

    let (_, j) = send(&app, get("/feedback?submitter=u42")).await;
    assert_eq!(j["pagination"]["total"], 1);
    assert_eq!(j["data"][0]["id"], id);
}
