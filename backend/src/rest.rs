use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use shared::{ActivityListResponse, ErrorResponse, TreeListResponse};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::domain::{LookupService, SyncService};
use crate::pages;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sync_service: SyncService,
    pub lookup_service: LookupService,
}

impl AppState {
    pub fn new(sync_service: SyncService, lookup_service: LookupService) -> Self {
        Self {
            sync_service,
            lookup_service,
        }
    }
}

/// Build the full application router, pages and API included.
pub fn app(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/sync/", post(sync_activities))
        .route("/tree/:tree_id/", get(get_tree_info))
        .route("/synced-activities/", get(get_synced_activities))
        .route("/trees/", get(get_all_trees));

    // CORS setup so the capture front end can call the API from anywhere
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/", get(pages::dashboard))
        .route("/scan/", get(pages::scan))
        .nest("/api", api_routes)
        .layer(cors)
        .with_state(state)
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn bad_request(message: &str) -> axum::response::Response {
    error_response(StatusCode::BAD_REQUEST, message)
}

/// Axum handler for POST /api/sync/
///
/// Accepts `{"activities": [...]}` and processes each item independently;
/// a malformed request body fails the whole request, anything past that is
/// reported per item in the response's `errors` list.
pub async fn sync_activities(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(&rejection.body_text()),
    };

    let items = match body.get("activities") {
        Some(Value::Array(items)) => items.clone(),
        Some(_) => return bad_request("activities must be an array"),
        None if body.is_object() => Vec::new(),
        None => return bad_request("request body must be a JSON object"),
    };

    info!("POST /api/sync/ - {} pending activities", items.len());

    match state.sync_service.sync_activities(&items).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => {
            tracing::error!("Error syncing activities: {:?}", e);
            bad_request(&e.to_string())
        }
    }
}

/// Axum handler for GET /api/tree/:tree_id/
pub async fn get_tree_info(
    State(state): State<AppState>,
    Path(tree_id): Path<String>,
) -> impl IntoResponse {
    info!("GET /api/tree/{}/", tree_id);

    match state.lookup_service.tree_info(&tree_id).await {
        Ok(Some(info)) => (StatusCode::OK, Json(info)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Tree not found"),
        Err(e) => {
            tracing::error!("Error looking up tree {}: {:?}", tree_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Error looking up tree")
        }
    }
}

/// Axum handler for GET /api/synced-activities/
pub async fn get_synced_activities(State(state): State<AppState>) -> impl IntoResponse {
    info!("GET /api/synced-activities/");

    match state.lookup_service.synced_activities().await {
        Ok(activities) => {
            (StatusCode::OK, Json(ActivityListResponse { activities })).into_response()
        }
        Err(e) => {
            tracing::error!("Error listing synced activities: {:?}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Error listing activities")
        }
    }
}

/// Axum handler for GET /api/trees/
pub async fn get_all_trees(State(state): State<AppState>) -> impl IntoResponse {
    info!("GET /api/trees/");

    match state.lookup_service.all_trees().await {
        Ok(trees) => (StatusCode::OK, Json(TreeListResponse { trees })).into_response(),
        Err(e) => {
            tracing::error!("Error listing trees: {:?}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Error listing trees")
        }
    }
}
