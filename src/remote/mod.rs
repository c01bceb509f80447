//! Remote client module
//!
//! Stateless HTTP wrapper over the capture server plus the error taxonomy
//! the sync workers use to classify failures. `RemoteApi` is the seam the
//! reconciler and dispatcher depend on; tests substitute an in-process
//! implementation.

pub mod client;
pub mod dto;

pub use client::RemoteClient;
pub use dto::{
    CaptureRequest, CaptureResponse, GcalStatus, InboxItem, InboxResponse, NoteDetailResponse,
    NoteFrontmatter, NoteUpdateRequest, NoteUpdateResponse,
};

use crate::database::models::NoteStatus;
use std::future::Future;
use thiserror::Error;

/// Remote call failure, classified for retry policy
#[derive(Error, Debug)]
pub enum ApiError {
    /// Server answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// Transport failure: DNS, connect, TLS, or timeout
    #[error("Network error: {0}")]
    Network(String),

    /// No server URL configured yet
    #[error("Server URL not configured")]
    NotConfigured,

    /// Local failure while preparing the call (e.g. reading the stored
    /// credential); treated as transient
    #[error("Store error: {0}")]
    Store(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Network(err.to_string())
    }
}

impl ApiError {
    /// 401 — credential is invalid; fatal for the current cycle
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Status { status: 401, .. })
    }

    /// Other 4xx — permanent per-note failure, not worth automatic retry
    pub fn is_permanent(&self) -> bool {
        matches!(self, ApiError::Status { status, .. } if (400..500).contains(status) && *status != 401)
    }

    /// 5xx or transport failure — transient, retried with backoff
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Status { status, .. } => *status >= 500,
            ApiError::Network(_) | ApiError::Store(_) => true,
            ApiError::NotConfigured => false,
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Capture server operations consumed by the sync engine
pub trait RemoteApi: Send + Sync {
    /// `POST /capture` — create a note; `uuid` in the request is the
    /// idempotency token
    fn capture(
        &self,
        request: &CaptureRequest,
    ) -> impl Future<Output = ApiResult<CaptureResponse>> + Send;

    /// `GET /inbox` — lightweight note summaries
    fn get_inbox(
        &self,
        limit: u32,
        offset: Option<u32>,
        status: Option<NoteStatus>,
        since: Option<&str>,
    ) -> impl Future<Output = ApiResult<InboxResponse>> + Send;

    /// `GET /note/{uid}` — full note detail
    fn get_note(&self, uid: &str) -> impl Future<Output = ApiResult<NoteDetailResponse>> + Send;

    /// `PATCH /note/{uid}` — partial update
    fn update_note(
        &self,
        uid: &str,
        request: &NoteUpdateRequest,
    ) -> impl Future<Output = ApiResult<NoteUpdateResponse>> + Send;

    /// `GET /healthz` — reachability probe
    fn health_check(&self) -> impl Future<Output = bool> + Send;
}
