//! HTTP client for the CRMVault server API

use anyhow::{Context, Result};
use crmvault_core::api::{
    BackupJobResponse, CreateBackupRequest, CreateBackupResponse, ErrorResponse,
    ListBackupsResponse, ListRestoresResponse, ModulesResponse, RestoreJobResponse,
    RestoreRequestBody, RestoreResponse,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use uuid::Uuid;

/// A non-success answer from the server
#[derive(Debug)]
pub struct ApiFailure {
    pub status: StatusCode,
    pub message: String,
    pub job_id: Option<Uuid>,
}

impl std::fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.message)?;
        if let Some(job_id) = self.job_id {
            write!(f, " (job {})", job_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiFailure {}

pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let response = self
            .authorized(request)
            .send()
            .await
            .with_context(|| format!("Failed to {}: the server may be unavailable", what))?;

        parse_response(response, what).await
    }

    pub async fn modules(&self) -> Result<ModulesResponse> {
        self.send(self.client.get(self.url("/api/modules")), "list modules")
            .await
    }

    pub async fn create_backup(&self, request: &CreateBackupRequest) -> Result<CreateBackupResponse> {
        self.send(
            self.client.post(self.url("/api/backups")).json(request),
            "create backup",
        )
        .await
    }

    pub async fn list_backups(&self, limit: Option<usize>) -> Result<ListBackupsResponse> {
        let mut request = self.client.get(self.url("/api/backups"));
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }
        self.send(request, "list backups").await
    }

    pub async fn get_backup(&self, id: Uuid) -> Result<BackupJobResponse> {
        self.send(
            self.client.get(self.url(&format!("/api/backups/{}", id))),
            "get backup",
        )
        .await
    }

    pub async fn restore(&self, request: &RestoreRequestBody) -> Result<RestoreResponse> {
        self.send(
            self.client.post(self.url("/api/restores")).json(request),
            "restore",
        )
        .await
    }

    pub async fn list_restores(&self, limit: Option<usize>) -> Result<ListRestoresResponse> {
        let mut request = self.client.get(self.url("/api/restores"));
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }
        self.send(request, "list restores").await
    }

    pub async fn get_restore(&self, id: Uuid) -> Result<RestoreJobResponse> {
        self.send(
            self.client.get(self.url(&format!("/api/restores/{}", id))),
            "get restore",
        )
        .await
    }

    /// Fetch a signed download URL; the signature is the credential
    pub async fn download(&self, signed_url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(signed_url)
            .send()
            .await
            .context("Failed to download artifact")?;

        if !response.status().is_success() {
            return Err(failure(response).await.into());
        }
        let bytes = response
            .bytes()
            .await
            .context("Failed to read artifact body")?;
        Ok(bytes.to_vec())
    }
}

async fn parse_response<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    if !response.status().is_success() {
        return Err(failure(response).await.into());
    }
    response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", what))
}

async fn failure(response: Response) -> ApiFailure {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    failure_from_body(status, &body)
}

/// Error details from a failed response body, which is usually an [`ErrorResponse`]
pub fn failure_from_body(status: StatusCode, body: &str) -> ApiFailure {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(error) => ApiFailure {
            status,
            message: error.error,
            job_id: error.job_id,
        },
        Err(_) => ApiFailure {
            status,
            message: if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                body.trim().to_string()
            },
            job_id: None,
        },
    }
}
