use crate::error::ApiError;
use crate::routes::bearer_token;
use crate::state::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use crmvault_core::api::ModulesResponse;
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_modules))
}

async fn list_modules(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ModulesResponse>, ApiError> {
    Ok(Json(state.service.modules(bearer_token(&headers)).await?))
}
