//! HTTP client for the capture server
//!
//! Thin reqwest wrapper implementing [`RemoteApi`]. The bearer token is
//! attached reactively: the first attempt carries no Authorization header,
//! and only a 401 challenge triggers a single retry with the current
//! stored credential. This keeps the token from being sent proactively
//! and supports external re-authentication flows, since the credential is
//! re-read at challenge time.

use super::dto::{
    CaptureRequest, CaptureResponse, InboxResponse, NoteDetailResponse, NoteUpdateRequest,
    NoteUpdateResponse,
};
use super::{ApiError, ApiResult, RemoteApi};
use crate::config;
use crate::database::models::NoteStatus;
use crate::error::Result;
use crate::services::SettingsService;
use reqwest::StatusCode;
use std::time::Duration;

#[derive(Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    settings: SettingsService,
}

impl RemoteClient {
    pub fn new(settings: SettingsService) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config::CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(config::REQUEST_TIMEOUT_SECS))
            .read_timeout(Duration::from_secs(config::READ_TIMEOUT_SECS))
            .build()
            .map_err(|e| crate::error::AppError::Generic(format!("HTTP client init failed: {}", e)))?;

        Ok(Self { http, settings })
    }

    async fn base_url(&self) -> ApiResult<String> {
        let url = self
            .settings
            .server_url()
            .await
            .map_err(|e| ApiError::Store(e.to_string()))?;

        match url {
            Some(url) if !url.trim().is_empty() => Ok(url),
            _ => Err(ApiError::NotConfigured),
        }
    }

    async fn auth_token(&self) -> ApiResult<Option<String>> {
        self.settings
            .auth_token()
            .await
            .map_err(|e| ApiError::Store(e.to_string()))
    }

    /// Send a request, retrying once with the bearer token after a 401
    /// challenge.
    async fn send(&self, builder: reqwest::RequestBuilder) -> ApiResult<reqwest::Response> {
        let retry = builder.try_clone();
        let response = builder.send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            if let Some(retry) = retry {
                if let Some(token) = self.auth_token().await? {
                    let challenged = retry.bearer_auth(token).send().await?;
                    return Self::ensure_success(challenged).await;
                }
            }
        }

        Self::ensure_success(response).await
    }

    async fn ensure_success(response: reqwest::Response) -> ApiResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            message: truncate_chars(&message, config::SYNC_ERROR_MESSAGE_MAX_CHARS),
        })
    }
}

impl RemoteApi for RemoteClient {
    async fn capture(&self, request: &CaptureRequest) -> ApiResult<CaptureResponse> {
        let base = self.base_url().await?;
        let response = self
            .send(self.http.post(format!("{}/capture", base)).json(request))
            .await?;

        Ok(response.json().await?)
    }

    async fn get_inbox(
        &self,
        limit: u32,
        offset: Option<u32>,
        status: Option<NoteStatus>,
        since: Option<&str>,
    ) -> ApiResult<InboxResponse> {
        let base = self.base_url().await?;

        let mut query: Vec<(&str, String)> = vec![("limit", limit.to_string())];
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }
        if let Some(status) = status {
            query.push(("status", status.as_str().to_string()));
        }
        if let Some(since) = since {
            query.push(("since", since.to_string()));
        }

        let response = self
            .send(self.http.get(format!("{}/inbox", base)).query(&query))
            .await?;

        Ok(response.json().await?)
    }

    async fn get_note(&self, uid: &str) -> ApiResult<NoteDetailResponse> {
        let base = self.base_url().await?;
        let response = self
            .send(self.http.get(format!("{}/note/{}", base, uid)))
            .await?;

        Ok(response.json().await?)
    }

    async fn update_note(
        &self,
        uid: &str,
        request: &NoteUpdateRequest,
    ) -> ApiResult<NoteUpdateResponse> {
        let base = self.base_url().await?;
        let response = self
            .send(self.http.patch(format!("{}/note/{}", base, uid)).json(request))
            .await?;

        Ok(response.json().await?)
    }

    async fn health_check(&self) -> bool {
        let Ok(base) = self.base_url().await else {
            return false;
        };

        match self.http.get(format!("{}/healthz", base)).send().await {
            Ok(response) => response.status() == StatusCode::OK,
            Err(_) => false,
        }
    }
}

/// Character-boundary-safe truncation for stored error messages
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
