//! Axum router and handlers.
//!
//! Anonymous creation is open; admin-mutating endpoints require the
//! capability token in `x-pulse-token`. Storage failures are logged with
//! context and surfaced as a generic 500 without internals.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    routing::post,
    Json, Router,
};
use pulse_ingest::{IngestError, Ingestor, Triage};
use pulse_types::{
    ListOptions, OrderDir, OrderField, PulseConfig, RecordFilter, RecordStore, Status,
    SubmitRequest,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub ingestor: Ingestor,
    pub triage: Triage,
    pub config: PulseConfig,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/events", post(handle_submit))
        .route("/feedback", post(handle_submit).get(handle_list))
        .route("/feedback/summary", get(handle_summary))
        .route("/feedback/types", get(handle_types))
        .route("/feedback/statuses", get(handle_statuses))
        .route("/feedback/bulk_status", post(handle_bulk_status))
        .route(
            "/feedback/:id",
            get(handle_get).post(handle_update).delete(handle_delete),
        )
        .route("/health", get(handle_health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn storage_failure(context: &str, e: impl std::fmt::Display) -> Response {
    tracing::error!(error = %e, context, "storage failure");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "storage failure" })),
    )
        .into_response()
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "not found" })),
    )
        .into_response()
}

fn bad_request(errors: serde_json::Value) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "errors": errors }))).into_response()
}

/// Capability check for admin-mutating endpoints. An empty configured token
/// disables admin access entirely.
fn require_admin(headers: &HeaderMap, config: &PulseConfig) -> Result<(), Response> {
    let supplied = header_str(headers, "x-pulse-token");
    if config.admin_token.is_empty() || supplied.as_deref() != Some(config.admin_token.as_str()) {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "forbidden" })),
        )
            .into_response());
    }
    Ok(())
}

fn actor_from(headers: &HeaderMap) -> String {
    header_str(headers, "x-pulse-user").unwrap_or_else(|| "admin".to_string())
}

async fn handle_submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SubmitRequest>,
) -> Response {
    let submitter = header_str(&headers, "x-pulse-user");
    match state.ingestor.submit(&req, submitter.as_deref()).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(IngestError::Validation(errors)) => {
            bad_request(serde_json::to_value(errors).unwrap_or_default())
        }
        Err(IngestError::Store(e)) => storage_failure("submit", e),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    status: Option<String>,
    #[serde(default, rename = "type")]
    category: Option<String>,
    #[serde(default)]
    search: Option<String>,
    #[serde(default)]
    submitter: Option<String>,
    #[serde(default)]
    date_after: Option<String>,
    #[serde(default)]
    date_before: Option<String>,
    #[serde(default)]
    page: Option<u64>,
    #[serde(default)]
    per_page: Option<u64>,
    #[serde(default)]
    orderby: Option<String>,
    #[serde(default)]
    order: Option<String>,
}

impl ListParams {
    /// Unknown status slugs are ignored rather than rejected, matching how
    /// the admin list treats stale bookmarked filters.
    fn filter(&self) -> RecordFilter {
        let statuses = self
            .status
            .as_deref()
            .map(|s| s.split(',').filter_map(Status::parse).collect())
            .unwrap_or_default();
        RecordFilter {
            statuses,
            category: self.category.clone(),
            submitter_id: self.submitter.clone(),
            date_after: self.date_after.clone(),
            date_before: self.date_before.clone(),
            search: self.search.clone(),
        }
    }
}

async fn handle_list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Response {
    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(20).clamp(1, 100);
    let opts = ListOptions {
        filter: params.filter(),
        order_field: params
            .orderby
            .as_deref()
            .and_then(OrderField::parse)
            .unwrap_or_default(),
        order_dir: params
            .order
            .as_deref()
            .and_then(OrderDir::parse)
            .unwrap_or_default(),
        offset: (page - 1) * per_page,
        limit: per_page,
    };
    match state.store.list(&opts).await {
        Ok((items, total)) => Json(json!({
            "data": items,
            "pagination": {
                "total": total,
                "pages": total.div_ceil(per_page),
                "page": page,
                "per_page": per_page,
            }
        }))
        .into_response(),
        Err(e) => storage_failure("list", e),
    }
}

async fn handle_get(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    match state.store.get_detail(id).await {
        Ok(Some(detail)) => Json(detail).into_response(),
        Ok(None) => not_found(),
        Err(e) => storage_failure("get", e),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    assignee_id: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    body: Option<String>,
}

async fn handle_update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<UpdateRequest>,
) -> Response {
    if let Err(resp) = require_admin(&headers, &state.config) {
        return resp;
    }

    let mut errors = Vec::new();
    let status = match req.status.as_deref() {
        None => None,
        Some(s) => match Status::parse(s) {
            Some(st) => Some(st),
            None => {
                errors.push(json!({ "field": "status", "message": "unknown status" }));
                None
            }
        },
    };
    let priority = match req.priority.as_deref() {
        None => None,
        Some(p) => match pulse_types::Priority::parse(p) {
            Some(pr) => Some(pr),
            None => {
                errors.push(json!({ "field": "priority", "message": "unknown priority" }));
                None
            }
        },
    };
    if !errors.is_empty() {
        return bad_request(json!(errors));
    }

    let patch = pulse_types::RecordPatch {
        category: req.category,
        body: req.body,
        status,
        assignee_id: req.assignee_id,
        priority,
    };
    if patch.is_empty() {
        return bad_request(json!([{ "field": "", "message": "no supported fields supplied" }]));
    }

    let actor = actor_from(&headers);
    match state.store.update(id, patch, &actor).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => not_found(),
        Err(e) => storage_failure("update", e),
    }
}

async fn handle_delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = require_admin(&headers, &state.config) {
        return resp;
    }
    match state.store.delete(id).await {
        Ok(true) => Json(json!({ "deleted": true })).into_response(),
        Ok(false) => not_found(),
        Err(e) => storage_failure("delete", e),
    }
}

#[derive(Debug, Deserialize)]
pub struct BulkStatusRequest {
    ids: Vec<i64>,
    status: String,
}

async fn handle_bulk_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<BulkStatusRequest>,
) -> Response {
    if let Err(resp) = require_admin(&headers, &state.config) {
        return resp;
    }
    let Some(status) = Status::parse(&req.status) else {
        return bad_request(json!([{ "field": "status", "message": "unknown status" }]));
    };
    let actor = actor_from(&headers);
    let results = state.triage.bulk_set_status(&req.ids, status, &actor).await;
    Json(json!({ "results": results })).into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryParams {
    #[serde(default)]
    date_after: Option<String>,
    #[serde(default)]
    date_before: Option<String>,
    #[serde(default, rename = "type")]
    category: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

async fn handle_summary(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SummaryParams>,
) -> Response {
    let filter = RecordFilter {
        statuses: params
            .status
            .as_deref()
            .map(|s| s.split(',').filter_map(Status::parse).collect())
            .unwrap_or_default(),
        category: params.category.clone(),
        date_after: params.date_after.clone(),
        date_before: params.date_before.clone(),
        ..Default::default()
    };
    match build_summary(state.store.as_ref(), &filter).await {
        Ok(payload) => Json(payload).into_response(),
        Err(e) => storage_failure("summary", e),
    }
}

async fn build_summary(
    store: &dyn RecordStore,
    filter: &RecordFilter,
) -> Result<serde_json::Value, pulse_types::StoreError> {
    let total = pulse_report::count(store, filter).await?;
    let average_rating = pulse_report::average_rating(store, filter).await?;
    let by_status = pulse_report::count_by(store, pulse_report::Dimension::Status, filter).await?;
    let by_category =
        pulse_report::count_by(store, pulse_report::Dimension::Category, filter).await?;
    let daily = pulse_report::summary_over_time(store, filter).await?;
    let top_pages = pulse_report::top_by_page(store, filter, 10).await?;
    Ok(json!({
        "total": total,
        "average_rating": average_rating,
        "by_status": by_status,
        "by_category": by_category,
        "daily": daily,
        "top_pages": top_pages,
    }))
}

async fn handle_types(State(state): State<Arc<AppState>>) -> Response {
    Json(json!({ "data": state.config.categories })).into_response()
}

async fn handle_statuses() -> Response {
    let data: Vec<serde_json::Value> = Status::ALL
        .iter()
        .map(|s| json!({ "slug": s.as_str(), "label": s.label() }))
        .collect();
    Json(json!({ "data": data })).into_response()
}

async fn handle_health() -> &'static str {
    "ok"
}
