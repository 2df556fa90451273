//! Announcement collaborator.
//!
//! [`AnnouncementSource`] is the narrow seam the synchronizer depends on;
//! [`HttpAnnouncementApi`] is the production implementation talking to the
//! device backend with the access-key headers.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::config::BackendConfig;
use crate::error::AppError;
use crate::media::RawAnnouncement;

#[async_trait]
pub trait AnnouncementSource: Send + Sync {
    /// Current announcements in playback order.
    async fn fetch_announcements(&self) -> Result<Vec<RawAnnouncement>, AppError>;

    /// Playable URI for a video whose payload is not path-addressable.
    async fn resolve_video(&self, announcement_id: i64) -> Result<String, AppError>;
}

/// Backend payload: either the value or `{errorCode, messages}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiEnvelope<T> {
    Failure {
        #[serde(rename = "errorCode")]
        error_code: String,
        #[serde(default)]
        messages: Vec<String>,
    },
    Success(T),
}

impl<T> From<ApiEnvelope<T>> for Result<T, AppError> {
    fn from(envelope: ApiEnvelope<T>) -> Self {
        match envelope {
            ApiEnvelope::Success(value) => Ok(value),
            ApiEnvelope::Failure {
                error_code,
                messages,
            } => Err(AppError::from_code(&error_code, &messages)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnnouncementMedia {
    #[allow(dead_code)] // reported by the backend, not needed for playback
    filename: String,
    media: String,
}

#[derive(Debug, Clone)]
struct AccessKeys {
    access_key_id: HeaderValue,
    secret_access_key: HeaderValue,
}

#[derive(Debug, Clone)]
pub struct HttpAnnouncementApi {
    client: Client,
    base_url: Url,
    keys: Option<AccessKeys>,
}

impl HttpAnnouncementApi {
    pub fn new(cfg: &BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(cfg.request_timeout)
            .build()
            .context("failed to build backend HTTP client")?;
        let keys = match (&cfg.access_key_id, &cfg.secret_access_key) {
            (Some(id), Some(secret)) => Some(AccessKeys {
                access_key_id: HeaderValue::from_str(id)
                    .context("backend.access-key-id is not a valid header value")?,
                secret_access_key: HeaderValue::from_str(secret)
                    .context("backend.secret-access-key is not a valid header value")?,
            }),
            _ => None,
        };
        Ok(Self {
            client,
            base_url: cfg.base_url()?,
            keys,
        })
    }

    fn auth_headers(&self) -> Result<HeaderMap, AppError> {
        let keys = self.keys.as_ref().ok_or_else(|| {
            AppError::DeviceLinking("Device is not linked, missing authentication keys".into())
        })?;
        let mut headers = HeaderMap::new();
        headers.insert("access-key-id", keys.access_key_id.clone());
        headers.insert("secret-access-key", keys.secret_access_key.clone());
        Ok(headers)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, AppError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|err| AppError::Application(format!("invalid request path {path}: {err}")))?;
        debug!(%url, "backend request");
        let response = self
            .client
            .get(url.clone())
            .headers(self.auth_headers()?)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;

        match serde_json::from_slice::<ApiEnvelope<T>>(&body) {
            Ok(envelope @ ApiEnvelope::Failure { .. }) => envelope.into(),
            Ok(envelope) if status.is_success() => envelope.into(),
            Ok(_) => Err(status_error(status)),
            Err(err) => {
                warn!(%url, %status, error = %err, "unexpected backend response");
                Err(status_error(status))
            }
        }
    }
}

#[async_trait]
impl AnnouncementSource for HttpAnnouncementApi {
    async fn fetch_announcements(&self) -> Result<Vec<RawAnnouncement>, AppError> {
        self.get_json("v1/announcements").await
    }

    async fn resolve_video(&self, announcement_id: i64) -> Result<String, AppError> {
        let media: AnnouncementMedia = self
            .get_json(&format!("v1/announcements/{announcement_id}/media"))
            .await?;
        Ok(media.media)
    }
}

fn transport_error(err: reqwest::Error) -> AppError {
    AppError::Initialization(format!("backend request failed: {err}"))
}

fn status_error(status: StatusCode) -> AppError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            AppError::AuthenticationFailed("Device authentication was rejected".into())
        }
        StatusCode::NOT_FOUND => AppError::DeviceNotFound("Device was not found".into()),
        other => AppError::Initialization(format!("backend responded with {other}")),
    }
}
