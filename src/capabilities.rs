//! Clients for the external analysis service.
//!
//! Three capabilities are consumed, each behind its own trait so the
//! orchestrators can be exercised with in-process fakes:
//!
//! | Trait | Request | Response |
//! |-------|---------|----------|
//! | [`MetadataLookup`] | `GET {base}/video/{id}` | `{title, description, thumbnail, duration}` |
//! | [`Segmenter`] | `POST {base}/video/{id}/analyze` | `{segments: [...]}` |
//! | [`Answerer`] | `POST {base}/chat` with `{question}` | `{answer, video_id?, youtube_id?, start_time?, end_time?}` |
//!
//! [`HttpVideoService`] implements all three over `reqwest`. The base URL and
//! timeouts are read from the current configuration snapshot on every call,
//! so a reload takes effect for the next request.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ytchat_core::models::NewSegment;

use crate::config::{ConfigHandle, ServicesConfig};

/// Failure of a call to an external capability.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("{capability} timed out after {secs}s")]
    Timeout { capability: &'static str, secs: u64 },

    /// `body` is kept for logging and left out of the message.
    #[error("{capability} returned HTTP {status}")]
    Status {
        capability: &'static str,
        status: u16,
        body: String,
    },

    #[error("{capability} request failed: {source}")]
    Transport {
        capability: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{capability} returned an undecodable body: {reason}")]
    Decode {
        capability: &'static str,
        reason: String,
    },
}

impl CapabilityError {
    pub fn capability(&self) -> &'static str {
        match self {
            Self::Timeout { capability, .. }
            | Self::Status { capability, .. }
            | Self::Transport { capability, .. }
            | Self::Decode { capability, .. } => capability,
        }
    }
}

pub type CapabilityResult<T> = std::result::Result<T, CapabilityError>;

/// Descriptive fields of a video as reported by the metadata service.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VideoMetadata {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumbnail: String,
    /// Seconds.
    #[serde(default)]
    pub duration: i64,
}

/// Raw answer from the question-answering service. Any of the citation
/// fields may be missing; see [`crate::retrieval`] for how they are
/// normalized.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct QaAnswer {
    pub answer: String,
    #[serde(default)]
    pub video_id: Option<i64>,
    #[serde(default)]
    pub youtube_id: Option<String>,
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub end_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SegmentationResponse {
    #[serde(default)]
    segments: Vec<NewSegment>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    question: &'a str,
}

#[async_trait]
pub trait MetadataLookup: Send + Sync {
    async fn lookup(&self, platform_id: &str) -> CapabilityResult<VideoMetadata>;
}

#[async_trait]
pub trait Segmenter: Send + Sync {
    /// Splits the video into segment descriptors. May take minutes.
    async fn segment(&self, platform_id: &str) -> CapabilityResult<Vec<NewSegment>>;
}

#[async_trait]
pub trait Answerer: Send + Sync {
    async fn answer(&self, question: &str) -> CapabilityResult<QaAnswer>;
}

/// HTTP client for the analysis service.
pub struct HttpVideoService {
    config: Arc<ConfigHandle>,
}

const METADATA: &str = "metadata lookup";
const SEGMENTATION: &str = "segmentation";
const ANSWERING: &str = "question answering";

impl HttpVideoService {
    pub fn new(config: Arc<ConfigHandle>) -> Self {
        Self { config }
    }

    fn client(capability: &'static str, timeout: Duration) -> CapabilityResult<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| CapabilityError::Transport { capability, source })
    }

    fn endpoint(services: &ServicesConfig, path: &str) -> String {
        format!("{}{}", services.base_url.trim_end_matches('/'), path)
    }

    /// Sends the request and decodes a 2xx JSON body into `T`.
    async fn exchange<T: DeserializeOwned>(
        capability: &'static str,
        timeout: Duration,
        request: reqwest::RequestBuilder,
    ) -> CapabilityResult<T> {
        let classify = |source: reqwest::Error| {
            if source.is_timeout() {
                CapabilityError::Timeout {
                    capability,
                    secs: timeout.as_secs(),
                }
            } else {
                CapabilityError::Transport { capability, source }
            }
        };

        let response = request.send().await.map_err(classify)?;
        let status = response.status();
        let body = response.bytes().await.map_err(classify)?;

        if !status.is_success() {
            let body = String::from_utf8_lossy(&body).into_owned();
            tracing::warn!(capability, status = status.as_u16(), %body,
                "upstream returned an error status");
            return Err(CapabilityError::Status {
                capability,
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_slice(&body).map_err(|e| CapabilityError::Decode {
            capability,
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl MetadataLookup for HttpVideoService {
    async fn lookup(&self, platform_id: &str) -> CapabilityResult<VideoMetadata> {
        let config = self.config.snapshot();
        let timeout = config.services.metadata_timeout();
        let client = Self::client(METADATA, timeout)?;
        let url = Self::endpoint(&config.services, &format!("/video/{}", platform_id));

        tracing::debug!(%url, "looking up video metadata");
        Self::exchange(METADATA, timeout, client.get(&url)).await
    }
}

#[async_trait]
impl Segmenter for HttpVideoService {
    async fn segment(&self, platform_id: &str) -> CapabilityResult<Vec<NewSegment>> {
        let config = self.config.snapshot();
        let timeout = config.services.analysis_timeout();
        let client = Self::client(SEGMENTATION, timeout)?;
        let url = Self::endpoint(&config.services, &format!("/video/{}/analyze", platform_id));

        tracing::debug!(%url, "requesting segmentation");
        let response: SegmentationResponse =
            Self::exchange(SEGMENTATION, timeout, client.post(&url)).await?;
        Ok(response.segments)
    }
}

#[async_trait]
impl Answerer for HttpVideoService {
    async fn answer(&self, question: &str) -> CapabilityResult<QaAnswer> {
        let config = self.config.snapshot();
        let timeout = config.services.chat_timeout();
        let client = Self::client(ANSWERING, timeout)?;
        let url = Self::endpoint(&config.services, "/chat");

        Self::exchange(
            ANSWERING,
            timeout,
            client.post(&url).json(&ChatRequest { question }),
        )
        .await
    }
}
