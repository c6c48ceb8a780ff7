use crate::error::ApiError;
use crate::routes::{bearer_token, parse_body, parse_id, ListQuery};
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use crmvault_core::api::{
    ListRestoresResponse, RestoreJobResponse, RestoreRequestBody, RestoreResponse,
};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_restores).post(restore))
        .route("/{id}", get(get_restore))
}

/// An empty body has no mode and is rejected as a validation error.
async fn restore(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<RestoreResponse>, ApiError> {
    let request: RestoreRequestBody = parse_body(&body)?;
    let response = state
        .service
        .restore(bearer_token(&headers), request)
        .await?;
    Ok(Json(response))
}

async fn list_restores(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListRestoresResponse>, ApiError> {
    let response = state
        .service
        .list_restores(bearer_token(&headers), query.limit)
        .await?;
    Ok(Json(response))
}

async fn get_restore(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<RestoreJobResponse>, ApiError> {
    let response = state
        .service
        .get_restore(bearer_token(&headers), parse_id(&id)?)
        .await?;
    Ok(Json(response))
}
