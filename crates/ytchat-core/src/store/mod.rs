//! Storage abstraction for ytchat.
//!
//! The [`Store`] trait defines every persistence operation the catalog,
//! analysis, and retrieval paths need, enabling pluggable backends (SQLite
//! in the application crate, [`memory::InMemoryStore`] for tests).
//!
//! Implementations must be `Send + Sync` to work with async runtimes, and
//! must uphold these contracts:
//!
//! - `platform_id` is unique; a duplicate insert fails with
//!   [`StoreError::Conflict`] and leaves the existing row untouched.
//! - Segments reference an existing video and satisfy `0 <= start < end`.
//! - Chat citations reference an existing video.
//! - [`delete_video`](Store::delete_video) removes the video's segments and
//!   analysis record and nulls every chat citation pointing at it, atomically.
//! - Videos are returned with segments attached, sorted by start time.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    AnalysisRun, ChatMessage, NewChatMessage, NewSegment, NewVideo, Segment, Video,
};

/// Errors surfaced by [`Store`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A video with this platform id already exists.
    #[error("video already exists: {platform_id}")]
    Conflict { platform_id: String },

    /// A segment or citation referenced a video that does not exist.
    #[error("video does not exist: {video_id}")]
    MissingVideo { video_id: i64 },

    /// A record violated a storage constraint (e.g. an empty segment span).
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// The backend failed (I/O, connection, corrupt row, ...).
    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Abstract storage backend for ytchat.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_video`](Store::insert_video) | Create a video (rejects duplicate platform ids) |
/// | [`find_video_by_platform_id`](Store::find_video_by_platform_id) | Look up by natural key |
/// | [`get_video`](Store::get_video) | Look up by internal id |
/// | [`list_videos`](Store::list_videos) | All videos with segments |
/// | [`delete_video`](Store::delete_video) | Delete with cascade, returns rows affected |
/// | [`insert_segment`](Store::insert_segment) | Attach one analysed segment |
/// | [`insert_chat_message`](Store::insert_chat_message) | Append a chat exchange |
/// | [`list_chat_messages`](Store::list_chat_messages) | Newest-first chat history |
/// | [`count_chat_messages`](Store::count_chat_messages) | History size |
/// | [`put_analysis_run`](Store::put_analysis_run) | Record analysis progress |
/// | [`get_analysis_run`](Store::get_analysis_run) | Read analysis progress |
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a new video and return it with its assigned id and no segments.
    async fn insert_video(&self, video: &NewVideo) -> StoreResult<Video>;

    /// Find a video by its platform id.
    async fn find_video_by_platform_id(&self, platform_id: &str) -> StoreResult<Option<Video>>;

    /// Find a video by internal id.
    async fn get_video(&self, id: i64) -> StoreResult<Option<Video>>;

    /// List every video, oldest first.
    async fn list_videos(&self) -> StoreResult<Vec<Video>>;

    /// Delete a video and its dependents. Returns the number of video rows
    /// removed (0 or 1).
    async fn delete_video(&self, id: i64) -> StoreResult<u64>;

    /// Attach a segment to a video.
    async fn insert_segment(&self, video_id: i64, segment: &NewSegment) -> StoreResult<Segment>;

    /// Append a chat exchange.
    async fn insert_chat_message(&self, message: &NewChatMessage) -> StoreResult<ChatMessage>;

    /// The most recent `limit` exchanges, newest first, with cited videos attached.
    async fn list_chat_messages(&self, limit: i64) -> StoreResult<Vec<ChatMessage>>;

    async fn count_chat_messages(&self) -> StoreResult<i64>;

    /// Insert or replace the analysis record for `run.video_id`.
    async fn put_analysis_run(&self, run: &AnalysisRun) -> StoreResult<()>;

    async fn get_analysis_run(&self, video_id: i64) -> StoreResult<Option<AnalysisRun>>;
}
