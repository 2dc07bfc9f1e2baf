pub mod monitor;

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use vandalwatch_common::{CaseFilter, CaseStatus, TargetType, VandalWatchError};

use crate::AppState;

const MAX_LIST_LIMIT: u32 = 200;

// --- Request structs ---

#[derive(Deserialize)]
pub struct CasesQuery {
    status: Option<String>,
    city: Option<String>,
    target_type: Option<String>,
    include_duplicates: Option<bool>,
    limit: Option<u32>,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    status: String,
    note: Option<String>,
}

#[derive(Deserialize)]
pub struct DuplicateRequest {
    #[serde(alias = "duplicateOf")]
    duplicate_of: Uuid,
}

// --- Helpers ---

pub(crate) fn error_json(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// Map a service error onto a status code. Anything unexpected is a 500.
fn service_error(e: anyhow::Error, context: &str) -> Response {
    match e.downcast_ref::<VandalWatchError>() {
        Some(VandalWatchError::NotFound(_)) => error_json(StatusCode::NOT_FOUND, e.to_string()),
        Some(VandalWatchError::Validation(_)) => error_json(StatusCode::BAD_REQUEST, e.to_string()),
        Some(VandalWatchError::InvalidTransition { .. }) => {
            error_json(StatusCode::CONFLICT, e.to_string())
        }
        _ => {
            warn!(error = %e, "{context}");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn parse_id(id: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(id).map_err(|_| error_json(StatusCode::BAD_REQUEST, "Invalid case id"))
}

fn parse_filter(params: CasesQuery) -> Result<CaseFilter, VandalWatchError> {
    Ok(CaseFilter {
        status: params.status.as_deref().map(str::parse::<CaseStatus>).transpose()?,
        city: params.city.filter(|c| !c.trim().is_empty()),
        target_type: params
            .target_type
            .as_deref()
            .map(str::parse::<TargetType>)
            .transpose()?,
        include_duplicates: params.include_duplicates.unwrap_or(false),
        limit: params.limit.unwrap_or(50).clamp(1, MAX_LIST_LIMIT),
    })
}

// --- Handlers ---

pub async fn api_cases(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CasesQuery>,
) -> impl IntoResponse {
    let filter = match parse_filter(params) {
        Ok(f) => f,
        Err(e) => return error_json(StatusCode::BAD_REQUEST, e.to_string()),
    };

    match state.cases.list(filter).await {
        Ok(cases) => Json(serde_json::json!({ "cases": cases })).into_response(),
        Err(e) => service_error(e, "Failed to list cases"),
    }
}

pub async fn api_case_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.cases.detail(id).await {
        Ok(detail) => Json(detail).into_response(),
        Err(e) => service_error(e, "Failed to load case detail"),
    }
}

pub async fn api_case_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<StatusRequest>,
) -> impl IntoResponse {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let status: CaseStatus = match body.status.parse() {
        Ok(s) => s,
        Err(e) => return error_json(StatusCode::BAD_REQUEST, format!("{e}")),
    };

    match state
        .cases
        .update_status(id, status, body.note.as_deref())
        .await
    {
        Ok(case) => Json(case).into_response(),
        Err(e) => service_error(e, "Failed to update case status"),
    }
}

pub async fn api_case_duplicate_of(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<DuplicateRequest>,
) -> impl IntoResponse {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.cases.mark_duplicate(id, body.duplicate_of).await {
        Ok(case) => Json(case).into_response(),
        Err(e) => service_error(e, "Failed to mark case as duplicate"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use vandalwatch_scout::testing::{sample_new_case, FixedAnalyzer, MockCaseStore, MockSearcher};
    use vandalwatch_scout::traits::CaseStore;
    use vandalwatch_scout::{CaseService, Monitor};

    fn app(store: Arc<MockCaseStore>) -> axum::Router {
        let monitor = Arc::new(Monitor::new(
            Arc::new(MockSearcher::new()),
            Arc::new(FixedAnalyzer::new()),
            store.clone(),
            Default::default(),
        ));
        crate::router(Arc::new(AppState {
            cases: CaseService::new(store),
            monitor,
        }))
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn lists_cases_newest_first() {
        let store = Arc::new(MockCaseStore::new());
        store.create_case(&sample_new_case("Austin")).await.unwrap();
        let newest = store.create_case(&sample_new_case("Dallas")).await.unwrap();

        let resp = app(store)
            .oneshot(Request::get("/api/cases").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["cases"].as_array().unwrap().len(), 2);
        assert_eq!(json["cases"][0]["id"], newest.id.to_string());
    }

    #[tokio::test]
    async fn invalid_status_filter_is_bad_request() {
        let resp = app(Arc::new(MockCaseStore::new()))
            .oneshot(Request::get("/api/cases?status=closed").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_case_is_not_found() {
        let uri = format!("/api/cases/{}", Uuid::new_v4());
        let resp = app(Arc::new(MockCaseStore::new()))
            .oneshot(Request::get(uri.as_str()).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn status_update_then_backwards_move_conflicts() {
        let store = Arc::new(MockCaseStore::new());
        let case = store.create_case(&sample_new_case("Austin")).await.unwrap();
        let uri = format!("/api/cases/{}/status", case.id);
        let app = app(store);

        let resp = app
            .clone()
            .oneshot(post_json(&uri, serde_json::json!({ "status": "identified" })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "identified");
        assert_eq!(json["verified"], true);

        let resp = app
            .oneshot(post_json(&uri, serde_json::json!({ "status": "verified" })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn duplicate_of_self_is_bad_request() {
        let store = Arc::new(MockCaseStore::new());
        let case = store.create_case(&sample_new_case("Austin")).await.unwrap();
        let uri = format!("/api/cases/{}/duplicate-of", case.id);

        let resp = app(store)
            .oneshot(post_json(&uri, serde_json::json!({ "duplicateOf": case.id })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
