//! Download route behind signed URLs.
//!
//! No bearer token is needed here; the signature and expiry in the query
//! string are the credential.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/{bucket}/{*path}", get(download))
}

#[derive(Debug, Deserialize)]
struct SignedQuery {
    expires: Option<i64>,
    signature: Option<String>,
}

async fn download(
    State(state): State<Arc<AppState>>,
    Path((bucket, path)): Path<(String, String)>,
    Query(query): Query<SignedQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(expires), Some(signature)) = (query.expires, query.signature) else {
        return Err(ApiError::InvalidSignature);
    };
    if !state.signer.verify(&bucket, &path, expires, &signature, Utc::now()) {
        tracing::warn!(bucket = %bucket, path = %path, "Rejected download with bad signature");
        return Err(ApiError::InvalidSignature);
    }

    let object = state.storage.get(&bucket, &path).await?;
    tracing::debug!(bucket = %bucket, path = %path, bytes = object.bytes.len(), "Serving object");

    Ok((
        [(header::CONTENT_TYPE, object.content_type)],
        object.bytes,
    ))
}
