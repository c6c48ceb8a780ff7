use crate::error::ApiError;
use crate::routes::{bearer_token, parse_body, parse_id, ListQuery};
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use crmvault_core::api::{
    BackupJobResponse, CreateBackupRequest, CreateBackupResponse, ListBackupsResponse,
};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_backups).post(create_backup))
        .route("/{id}", get(get_backup))
}

async fn create_backup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CreateBackupResponse>, ApiError> {
    let request: CreateBackupRequest = parse_body(&body)?;
    let response = state
        .service
        .create_backup(bearer_token(&headers), request)
        .await?;
    Ok(Json(response))
}

async fn list_backups(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListBackupsResponse>, ApiError> {
    let response = state
        .service
        .list_backups(bearer_token(&headers), query.limit)
        .await?;
    Ok(Json(response))
}

async fn get_backup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BackupJobResponse>, ApiError> {
    let response = state
        .service
        .get_backup(bearer_token(&headers), parse_id(&id)?)
        .await?;
    Ok(Json(response))
}
