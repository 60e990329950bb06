use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::core::errors::{VaultSyncError, VaultSyncResult};
use crate::remote::api::{
    CreateSecretRequest, DownloadChunkResponse, FinalizeChunkedUploadRequest,
    InitChunkedUploadRequest, InitChunkedUploadResponse, RemoteApi, SecretWire, SyncResponse,
    UpdateSecretRequest, UploadChunkRequest, UploadChunkResponse,
};

/// Bearer credential source. The transport-level authentication protocol
/// is not this crate's concern; implementations hand out the current
/// token and mint a fresh one after a 401.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> VaultSyncResult<String>;
    async fn refresh(&self) -> VaultSyncResult<String>;
}

#[derive(Clone)]
pub struct HttpRemote {
    base_url: String,
    client: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn TokenProvider>) -> VaultSyncResult<Self> {
        let base_url = normalize_endpoint(base_url.into())?;
        Ok(Self {
            base_url,
            client: reqwest::Client::builder().build()?,
            tokens,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Sends an authenticated request. A 401 is tolerated once: the token
    /// is refreshed and the request replayed before giving up.
    async fn execute(
        &self,
        method: Method,
        path: &str,
        query: Option<&[(&str, &str)]>,
        body: Option<&serde_json::Value>,
    ) -> VaultSyncResult<reqwest::Response> {
        let mut token = self.tokens.access_token().await?;
        let mut refreshed = false;

        loop {
            let mut request = self
                .client
                .request(method.clone(), self.url(path))
                .bearer_auth(&token)
                .header("Accept", "application/json");
            if let Some(query) = query {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED && !refreshed {
                token = self.tokens.refresh().await?;
                refreshed = true;
                continue;
            }
            if status == StatusCode::CONFLICT {
                return Err(VaultSyncError::VersionConflict);
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(VaultSyncError::Transport(parse_api_error(status, &body)));
            }
            return Ok(response);
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: Option<&[(&str, &str)]>,
        body: Option<&serde_json::Value>,
    ) -> VaultSyncResult<T> {
        let response = self.execute(method, path, query, body).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl RemoteApi for HttpRemote {
    async fn create_secret(&self, request: &CreateSecretRequest) -> VaultSyncResult<SecretWire> {
        let body = serde_json::to_value(request)?;
        self.send_json(Method::POST, "/v1/secrets", None, Some(&body))
            .await
    }

    async fn get_secret(&self, id: &str) -> VaultSyncResult<SecretWire> {
        self.send_json(Method::GET, &format!("/v1/secrets/{id}"), None, None)
            .await
    }

    async fn update_secret(
        &self,
        id: &str,
        request: &UpdateSecretRequest,
    ) -> VaultSyncResult<SecretWire> {
        let body = serde_json::to_value(request)?;
        self.send_json(Method::PUT, &format!("/v1/secrets/{id}"), None, Some(&body))
            .await
    }

    async fn delete_secret(&self, id: &str) -> VaultSyncResult<()> {
        self.execute(Method::DELETE, &format!("/v1/secrets/{id}"), None, None)
            .await?;
        Ok(())
    }

    async fn sync_since(&self, since: Option<&str>) -> VaultSyncResult<SyncResponse> {
        let query = since.map(|since| [("since", since)]);
        self.send_json(
            Method::GET,
            "/v1/secrets/sync",
            query.as_ref().map(|pairs| pairs.as_slice()),
            None,
        )
        .await
    }

    async fn init_chunked_upload(
        &self,
        request: &InitChunkedUploadRequest,
    ) -> VaultSyncResult<InitChunkedUploadResponse> {
        let body = serde_json::to_value(request)?;
        self.send_json(Method::POST, "/v1/secrets/chunks/init", None, Some(&body))
            .await
    }

    async fn upload_chunk(
        &self,
        secret_id: &str,
        request: &UploadChunkRequest,
    ) -> VaultSyncResult<UploadChunkResponse> {
        let body = serde_json::to_value(request)?;
        self.send_json(
            Method::POST,
            &format!("/v1/secrets/{secret_id}/chunks"),
            None,
            Some(&body),
        )
        .await
    }

    async fn finalize_chunked_upload(
        &self,
        secret_id: &str,
        request: &FinalizeChunkedUploadRequest,
    ) -> VaultSyncResult<SecretWire> {
        let body = serde_json::to_value(request)?;
        self.send_json(
            Method::POST,
            &format!("/v1/secrets/{secret_id}/chunks/finalize"),
            None,
            Some(&body),
        )
        .await
    }

    async fn download_chunk(
        &self,
        secret_id: &str,
        chunk_index: usize,
    ) -> VaultSyncResult<DownloadChunkResponse> {
        self.send_json(
            Method::GET,
            &format!("/v1/secrets/{secret_id}/chunks/{chunk_index}"),
            None,
            None,
        )
        .await
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_endpoint(raw: String) -> VaultSyncResult<String> {
    let endpoint = raw.trim();
    if endpoint.is_empty() {
        return Err(VaultSyncError::Transport(
            "endpoint must not be empty".to_owned(),
        ));
    }
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Ok(endpoint.trim_end_matches('/').to_owned())
    } else {
        Err(VaultSyncError::Transport(
            "endpoint must include http:// or https://".to_owned(),
        ))
    }
}
