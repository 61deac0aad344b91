//! In-memory [`Store`] implementation for tests.
//!
//! All tables live behind a single `std::sync::RwLock`, so every operation
//! (including the delete cascade) is atomic with respect to the others.
//! Constraint checks mirror the SQLite schema: unique platform ids,
//! segment spans, and video references.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::models::{
    AnalysisRun, ChatMessage, NewChatMessage, NewSegment, NewVideo, Segment, Video,
};

use super::{Store, StoreError, StoreResult};

#[derive(Default)]
struct Tables {
    videos: BTreeMap<i64, Video>,
    segments: Vec<Segment>,
    messages: Vec<ChatMessage>,
    runs: HashMap<i64, AnalysisRun>,
    next_video_id: i64,
    next_segment_id: i64,
    next_message_id: i64,
}

impl Tables {
    fn with_segments(&self, video: &Video) -> Video {
        let mut segments: Vec<Segment> = self
            .segments
            .iter()
            .filter(|s| s.video_id == video.id)
            .cloned()
            .collect();
        segments.sort_by_key(|s| (s.start_time, s.id));
        Video {
            segments,
            ..video.clone()
        }
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_video(&self, video: &NewVideo) -> StoreResult<Video> {
        let mut t = self.write();
        if t.videos.values().any(|v| v.platform_id == video.platform_id) {
            return Err(StoreError::Conflict {
                platform_id: video.platform_id.clone(),
            });
        }
        t.next_video_id += 1;
        let now = Utc::now();
        let stored = Video {
            id: t.next_video_id,
            platform_id: video.platform_id.clone(),
            title: video.title.clone(),
            description: video.description.clone(),
            thumbnail: video.thumbnail.clone(),
            duration: video.duration,
            created_at: now,
            updated_at: now,
            segments: Vec::new(),
        };
        t.videos.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_video_by_platform_id(&self, platform_id: &str) -> StoreResult<Option<Video>> {
        let t = self.read();
        Ok(t.videos
            .values()
            .find(|v| v.platform_id == platform_id)
            .map(|v| t.with_segments(v)))
    }

    async fn get_video(&self, id: i64) -> StoreResult<Option<Video>> {
        let t = self.read();
        Ok(t.videos.get(&id).map(|v| t.with_segments(v)))
    }

    async fn list_videos(&self) -> StoreResult<Vec<Video>> {
        let t = self.read();
        Ok(t.videos.values().map(|v| t.with_segments(v)).collect())
    }

    async fn delete_video(&self, id: i64) -> StoreResult<u64> {
        let mut t = self.write();
        if t.videos.remove(&id).is_none() {
            return Ok(0);
        }
        t.segments.retain(|s| s.video_id != id);
        t.runs.remove(&id);
        for msg in t.messages.iter_mut() {
            if msg.citation.is_some_and(|c| c.video_id == id) {
                msg.citation = None;
            }
        }
        Ok(1)
    }

    async fn insert_segment(&self, video_id: i64, segment: &NewSegment) -> StoreResult<Segment> {
        let mut t = self.write();
        if !t.videos.contains_key(&video_id) {
            return Err(StoreError::MissingVideo { video_id });
        }
        if !segment.has_valid_span() {
            return Err(StoreError::Constraint(format!(
                "segment span [{}, {}) is empty or negative",
                segment.start_time, segment.end_time
            )));
        }
        t.next_segment_id += 1;
        let stored = Segment {
            id: t.next_segment_id,
            video_id,
            start_time: segment.start_time,
            end_time: segment.end_time,
            content: segment.content.clone(),
            summary: segment.summary.clone(),
            created_at: Utc::now(),
        };
        t.segments.push(stored.clone());
        Ok(stored)
    }

    async fn insert_chat_message(&self, message: &NewChatMessage) -> StoreResult<ChatMessage> {
        let mut t = self.write();
        if let Some(c) = message.citation {
            if !t.videos.contains_key(&c.video_id) {
                return Err(StoreError::MissingVideo {
                    video_id: c.video_id,
                });
            }
        }
        t.next_message_id += 1;
        let stored = ChatMessage {
            id: t.next_message_id,
            question: message.question.clone(),
            answer: message.answer.clone(),
            citation: message.citation,
            created_at: Utc::now(),
            video: None,
        };
        t.messages.push(stored.clone());
        Ok(stored)
    }

    async fn list_chat_messages(&self, limit: i64) -> StoreResult<Vec<ChatMessage>> {
        let t = self.read();
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(t.messages
            .iter()
            .rev()
            .take(limit)
            .map(|m| ChatMessage {
                video: m
                    .citation
                    .and_then(|c| t.videos.get(&c.video_id))
                    .map(|v| t.with_segments(v)),
                ..m.clone()
            })
            .collect())
    }

    async fn count_chat_messages(&self) -> StoreResult<i64> {
        Ok(self.read().messages.len() as i64)
    }

    async fn put_analysis_run(&self, run: &AnalysisRun) -> StoreResult<()> {
        let mut t = self.write();
        if !t.videos.contains_key(&run.video_id) {
            return Err(StoreError::MissingVideo {
                video_id: run.video_id,
            });
        }
        t.runs.insert(run.video_id, run.clone());
        Ok(())
    }

    async fn get_analysis_run(&self, video_id: i64) -> StoreResult<Option<AnalysisRun>> {
        Ok(self.read().runs.get(&video_id).cloned())
    }
}
