//! Question answering and chat history.
//!
//! [`Retriever::ask`] forwards a validated question to the answering
//! service, turns whatever citation fields came back into at most one
//! [`Citation`], attaches the cited video, and appends the exchange to the
//! chat log.
//!
//! Citation rules:
//!
//! - `video_id` with both bounds cites that video.
//! - No `video_id` but a `youtube_id` with both bounds cites the video
//!   registered under that platform id.
//! - Missing, negative, or reversed bounds produce no citation.
//! - A reference that does not resolve to a stored video is echoed back to
//!   the caller but not persisted.

use std::sync::Arc;

use serde::Serialize;

use ytchat_core::models::{ChatMessage, Citation, NewChatMessage, Video};
use ytchat_core::store::{Store, StoreError};

use crate::capabilities::{Answerer, QaAnswer};
use crate::config::ConfigHandle;
use crate::error::AppError;

pub const MAX_QUESTION_CHARS: usize = 2000;

/// Trim and check a caller-supplied question.
pub fn validate_question(question: &str) -> Result<&str, AppError> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("question must not be empty".into()));
    }
    if trimmed.chars().count() > MAX_QUESTION_CHARS {
        return Err(AppError::Validation(format!(
            "question must be at most {} characters",
            MAX_QUESTION_CHARS
        )));
    }
    Ok(trimmed)
}

/// Answer returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub youtube_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<Video>,
}

#[derive(Debug, Clone, PartialEq)]
enum VideoRef {
    Id(i64),
    PlatformId(String),
}

/// A citation as claimed by the answering service, before resolution.
#[derive(Debug, Clone, PartialEq)]
struct ClaimedCitation {
    reference: VideoRef,
    start_time: i64,
    end_time: i64,
}

fn claimed_citation(answer: &QaAnswer) -> Option<ClaimedCitation> {
    let reference = match (answer.video_id, answer.youtube_id.as_deref()) {
        (Some(id), _) => Some(VideoRef::Id(id)),
        (None, Some(pid)) if !pid.trim().is_empty() => {
            Some(VideoRef::PlatformId(pid.trim().to_string()))
        }
        _ => None,
    };

    match (reference, answer.start_time, answer.end_time) {
        (None, None, None) => None,
        (Some(reference), Some(start_time), Some(end_time))
            if start_time >= 0 && start_time <= end_time =>
        {
            Some(ClaimedCitation {
                reference,
                start_time,
                end_time,
            })
        }
        (reference, start_time, end_time) => {
            tracing::warn!(?reference, ?start_time, ?end_time,
                "discarding incomplete or invalid citation");
            None
        }
    }
}

pub struct Retriever {
    store: Arc<dyn Store>,
    answerer: Arc<dyn Answerer>,
    config: Arc<ConfigHandle>,
}

impl Retriever {
    pub fn new(store: Arc<dyn Store>, answerer: Arc<dyn Answerer>, config: Arc<ConfigHandle>) -> Self {
        Self {
            store,
            answerer,
            config,
        }
    }

    async fn resolve(&self, reference: &VideoRef) -> Option<Video> {
        let found = match reference {
            VideoRef::Id(id) => self.store.get_video(*id).await,
            VideoRef::PlatformId(pid) => self.store.find_video_by_platform_id(pid).await,
        };
        match found {
            Ok(Some(video)) => Some(video),
            Ok(None) => {
                tracing::warn!(?reference, "cited video is not registered");
                None
            }
            Err(e) => {
                tracing::warn!(?reference, error = %e, "failed to resolve cited video");
                None
            }
        }
    }

    /// Ask a question. The exchange is persisted once an answer is obtained;
    /// a failed write is logged and does not affect the response.
    pub async fn ask(&self, question: &str) -> Result<ChatResponse, AppError> {
        let question = validate_question(question)?;

        let answer = self.answerer.answer(question).await.map_err(|e| {
            tracing::warn!(error = %e, "question answering failed");
            AppError::from(e)
        })?;

        let claimed = claimed_citation(&answer);
        let video = match &claimed {
            Some(c) => self.resolve(&c.reference).await,
            None => None,
        };

        let (response, citation) = match (claimed, video) {
            (Some(c), Some(video)) => {
                let citation = Citation {
                    video_id: video.id,
                    start_time: c.start_time,
                    end_time: c.end_time,
                };
                let response = ChatResponse {
                    answer: answer.answer.clone(),
                    video_id: Some(video.id),
                    youtube_id: Some(video.platform_id.clone()),
                    start_time: Some(c.start_time),
                    end_time: Some(c.end_time),
                    video: Some(video),
                };
                (response, Some(citation))
            }
            (Some(c), None) => {
                // Echo whichever reference the service gave
                let (video_id, youtube_id) = match c.reference {
                    VideoRef::Id(id) => (Some(id), None),
                    VideoRef::PlatformId(pid) => (None, Some(pid)),
                };
                let response = ChatResponse {
                    answer: answer.answer.clone(),
                    video_id,
                    youtube_id,
                    start_time: Some(c.start_time),
                    end_time: Some(c.end_time),
                    video: None,
                };
                (response, None)
            }
            (None, _) => (
                ChatResponse {
                    answer: answer.answer.clone(),
                    video_id: None,
                    youtube_id: None,
                    start_time: None,
                    end_time: None,
                    video: None,
                },
                None,
            ),
        };

        self.record(NewChatMessage {
            question: question.to_string(),
            answer: answer.answer,
            citation,
        })
        .await;

        Ok(response)
    }

    async fn record(&self, message: NewChatMessage) {
        match self.store.insert_chat_message(&message).await {
            Ok(saved) => {
                tracing::debug!(message_id = saved.id, cited = saved.citation.is_some(),
                    "chat exchange recorded");
            }
            Err(StoreError::MissingVideo { video_id }) => {
                // Cited video was removed after resolution
                tracing::warn!(video_id, "cited video vanished; recording without citation");
                let uncited = NewChatMessage {
                    citation: None,
                    ..message
                };
                if let Err(e) = self.store.insert_chat_message(&uncited).await {
                    tracing::error!(error = %e, "failed to record chat exchange");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to record chat exchange");
            }
        }
    }

    /// Most recent exchanges first. `limit` defaults to `history.default_limit`
    /// and is clamped to `[1, history.max_limit]`.
    pub async fn history(&self, limit: Option<i64>) -> Result<Vec<ChatMessage>, AppError> {
        let limit = self.config.snapshot().history.resolve_limit(limit);
        Ok(self.store.list_chat_messages(limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{CapabilityError, CapabilityResult};
    use crate::config::{Config, DbConfig, HistoryConfig, ServerConfig, ServicesConfig};
    use async_trait::async_trait;
    use ytchat_core::models::{AnalysisRun, NewSegment, NewVideo, Segment};
    use ytchat_core::store::memory::InMemoryStore;
    use ytchat_core::store::StoreResult;

    /// Hands out a video once, removing it right after, so the write that
    /// follows sees it gone.
    struct VanishingStore(Arc<InMemoryStore>);

    #[async_trait]
    impl Store for VanishingStore {
        async fn insert_video(&self, video: &NewVideo) -> StoreResult<Video> {
            self.0.insert_video(video).await
        }
        async fn find_video_by_platform_id(&self, platform_id: &str) -> StoreResult<Option<Video>> {
            self.0.find_video_by_platform_id(platform_id).await
        }
        async fn get_video(&self, id: i64) -> StoreResult<Option<Video>> {
            let found = self.0.get_video(id).await?;
            self.0.delete_video(id).await?;
            Ok(found)
        }
        async fn list_videos(&self) -> StoreResult<Vec<Video>> {
            self.0.list_videos().await
        }
        async fn delete_video(&self, id: i64) -> StoreResult<u64> {
            self.0.delete_video(id).await
        }
        async fn insert_segment(&self, video_id: i64, segment: &NewSegment) -> StoreResult<Segment> {
            self.0.insert_segment(video_id, segment).await
        }
        async fn insert_chat_message(&self, message: &NewChatMessage) -> StoreResult<ChatMessage> {
            self.0.insert_chat_message(message).await
        }
        async fn list_chat_messages(&self, limit: i64) -> StoreResult<Vec<ChatMessage>> {
            self.0.list_chat_messages(limit).await
        }
        async fn count_chat_messages(&self) -> StoreResult<i64> {
            self.0.count_chat_messages().await
        }
        async fn put_analysis_run(&self, run: &AnalysisRun) -> StoreResult<()> {
            self.0.put_analysis_run(run).await
        }
        async fn get_analysis_run(&self, video_id: i64) -> StoreResult<Option<AnalysisRun>> {
            self.0.get_analysis_run(video_id).await
        }
    }

    struct Canned(CapabilityResult<QaAnswer>);

    #[async_trait]
    impl Answerer for Canned {
        async fn answer(&self, _question: &str) -> CapabilityResult<QaAnswer> {
            match &self.0 {
                Ok(a) => Ok(a.clone()),
                Err(_) => Err(CapabilityError::Timeout {
                    capability: "question answering",
                    secs: 60,
                }),
            }
        }
    }

    fn config() -> Arc<ConfigHandle> {
        Arc::new(ConfigHandle::fixed(Config {
            db: DbConfig {
                path: "unused.sqlite".into(),
            },
            server: ServerConfig {
                bind: "127.0.0.1:0".into(),
            },
            services: ServicesConfig {
                base_url: "http://127.0.0.1:1".into(),
                metadata_timeout_secs: 1,
                chat_timeout_secs: 1,
                analysis_timeout_secs: 1,
            },
            analysis: Default::default(),
            history: HistoryConfig {
                default_limit: 2,
                max_limit: 3,
            },
            log: Default::default(),
        }))
    }

    async fn seeded_store() -> (Arc<InMemoryStore>, Video) {
        let store = Arc::new(InMemoryStore::new());
        let video = store
            .insert_video(&NewVideo {
                platform_id: "abc123".into(),
                title: "T".into(),
                description: String::new(),
                thumbnail: String::new(),
                duration: 120,
            })
            .await
            .unwrap();
        store
            .insert_segment(
                video.id,
                &NewSegment {
                    start_time: 0,
                    end_time: 30,
                    content: "intro".into(),
                    summary: "i".into(),
                },
            )
            .await
            .unwrap();
        (store, video)
    }

    fn retriever(store: Arc<InMemoryStore>, answer: QaAnswer) -> Retriever {
        Retriever::new(store, Arc::new(Canned(Ok(answer))), config())
    }

    #[test]
    fn test_validate_question() {
        assert_eq!(validate_question("  hi  ").unwrap(), "hi");
        assert!(validate_question("   ").is_err());
        assert!(validate_question(&"x".repeat(MAX_QUESTION_CHARS)).is_ok());
        assert!(validate_question(&"x".repeat(MAX_QUESTION_CHARS + 1)).is_err());
    }

    #[test]
    fn test_claimed_citation_rules() {
        let base = QaAnswer {
            answer: "a".into(),
            ..Default::default()
        };
        assert_eq!(claimed_citation(&base), None);

        let full = QaAnswer {
            video_id: Some(5),
            start_time: Some(0),
            end_time: Some(30),
            ..base.clone()
        };
        assert_eq!(
            claimed_citation(&full).map(|c| c.reference),
            Some(VideoRef::Id(5))
        );

        let by_platform = QaAnswer {
            youtube_id: Some("abc123".into()),
            start_time: Some(10),
            end_time: Some(20),
            ..base.clone()
        };
        assert_eq!(
            claimed_citation(&by_platform).map(|c| c.reference),
            Some(VideoRef::PlatformId("abc123".into()))
        );

        let partial = QaAnswer {
            video_id: Some(5),
            start_time: Some(0),
            ..base.clone()
        };
        assert_eq!(claimed_citation(&partial), None);

        let reversed = QaAnswer {
            start_time: Some(40),
            end_time: Some(30),
            ..full.clone()
        };
        assert_eq!(claimed_citation(&reversed), None);

        let negative = QaAnswer {
            start_time: Some(-1),
            ..full.clone()
        };
        assert_eq!(claimed_citation(&negative), None);

        let bounds_only = QaAnswer {
            start_time: Some(0),
            end_time: Some(5),
            ..base
        };
        assert_eq!(claimed_citation(&bounds_only), None);
    }

    #[tokio::test]
    async fn test_cited_answer_attaches_video_and_persists() {
        let (store, video) = seeded_store().await;
        let r = retriever(
            store.clone(),
            QaAnswer {
                answer: "intro".into(),
                video_id: Some(video.id),
                start_time: Some(0),
                end_time: Some(30),
                ..Default::default()
            },
        );

        let resp = r.ask("what happens at the start").await.unwrap();
        assert_eq!(resp.answer, "intro");
        let attached = resp.video.unwrap();
        assert_eq!(attached.id, video.id);
        assert_eq!(attached.segments.len(), 1);

        let history = store.list_chat_messages(10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(
            history[0].citation,
            Some(Citation {
                video_id: video.id,
                start_time: 0,
                end_time: 30
            })
        );
    }

    #[tokio::test]
    async fn test_platform_id_citation_resolved() {
        let (store, video) = seeded_store().await;
        let r = retriever(
            store.clone(),
            QaAnswer {
                answer: "a".into(),
                youtube_id: Some("abc123".into()),
                start_time: Some(5),
                end_time: Some(25),
                ..Default::default()
            },
        );

        let resp = r.ask("q").await.unwrap();
        assert_eq!(resp.video_id, Some(video.id));
        assert_eq!(resp.youtube_id.as_deref(), Some("abc123"));
        assert!(resp.video.is_some());
        let history = store.list_chat_messages(10).await.unwrap();
        assert_eq!(history[0].citation.unwrap().video_id, video.id);
    }

    #[tokio::test]
    async fn test_unresolvable_citation_echoed_not_persisted() {
        let (store, _) = seeded_store().await;
        let r = retriever(
            store.clone(),
            QaAnswer {
                answer: "a".into(),
                video_id: Some(404),
                start_time: Some(0),
                end_time: Some(10),
                ..Default::default()
            },
        );

        let resp = r.ask("q").await.unwrap();
        assert_eq!(resp.video_id, Some(404));
        assert_eq!(resp.youtube_id, None);
        assert_eq!(resp.start_time, Some(0));
        assert!(resp.video.is_none());

        let by_platform = retriever(
            store.clone(),
            QaAnswer {
                answer: "x".into(),
                youtube_id: Some("zzz999".into()),
                start_time: Some(10),
                end_time: Some(20),
                ..Default::default()
            },
        );
        let resp = by_platform.ask("q").await.unwrap();
        assert_eq!(resp.video_id, None);
        assert_eq!(resp.youtube_id.as_deref(), Some("zzz999"));
        assert_eq!((resp.start_time, resp.end_time), (Some(10), Some(20)));
        assert!(resp.video.is_none());
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["youtube_id"], "zzz999");
        assert!(json.get("video_id").is_none());

        let history = store.list_chat_messages(10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|m| m.citation.is_none()));
    }

    #[tokio::test]
    async fn test_video_removed_after_resolution_recorded_uncited() {
        let (inner, video) = seeded_store().await;
        let r = Retriever::new(
            Arc::new(VanishingStore(inner.clone())),
            Arc::new(Canned(Ok(QaAnswer {
                answer: "intro".into(),
                video_id: Some(video.id),
                start_time: Some(0),
                end_time: Some(30),
                ..Default::default()
            }))),
            config(),
        );

        let resp = r.ask("what happens at the start").await.unwrap();
        assert_eq!(resp.video_id, Some(video.id));
        assert!(resp.video.is_some());

        assert!(inner.get_video(video.id).await.unwrap().is_none());
        let history = inner.list_chat_messages(10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].question, "what happens at the start");
        assert_eq!(history[0].citation, None);
    }

    #[tokio::test]
    async fn test_partial_citation_dropped() {
        let (store, video) = seeded_store().await;
        let r = retriever(
            store.clone(),
            QaAnswer {
                answer: "a".into(),
                video_id: Some(video.id),
                start_time: Some(3),
                ..Default::default()
            },
        );

        let resp = r.ask("q").await.unwrap();
        assert_eq!(resp.video_id, None);
        assert_eq!(resp.start_time, None);
        let history = store.list_chat_messages(10).await.unwrap();
        assert_eq!(history[0].citation, None);
    }

    #[tokio::test]
    async fn test_upstream_failure_writes_nothing() {
        let (store, _) = seeded_store().await;
        let r = Retriever::new(
            store.clone(),
            Arc::new(Canned(Err(CapabilityError::Timeout {
                capability: "question answering",
                secs: 1,
            }))),
            config(),
        );

        let err = r.ask("q").await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamUnavailable(_)));
        assert_eq!(store.count_chat_messages().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_question_never_reaches_upstream() {
        let (store, _) = seeded_store().await;
        let r = retriever(store.clone(), QaAnswer::default());
        assert!(matches!(r.ask("  ").await, Err(AppError::Validation(_))));
        assert_eq!(store.count_chat_messages().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_history_limit_defaults_and_clamps() {
        let (store, _) = seeded_store().await;
        let r = retriever(
            store.clone(),
            QaAnswer {
                answer: "a".into(),
                ..Default::default()
            },
        );
        for i in 0..5 {
            r.ask(&format!("q{i}")).await.unwrap();
        }

        assert_eq!(r.history(None).await.unwrap().len(), 2);
        assert_eq!(r.history(Some(100)).await.unwrap().len(), 3);
        assert_eq!(r.history(Some(0)).await.unwrap().len(), 1);
        assert_eq!(r.history(Some(1)).await.unwrap()[0].question, "q4");
    }
}
