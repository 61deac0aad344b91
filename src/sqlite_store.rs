//! SQLite-backed [`Store`] implementation.
//!
//! Maps each [`Store`] operation to statements against the schema created
//! by [`migrate`](crate::migrate). Constraint failures reported by SQLite
//! are translated into the matching [`StoreError`] variant so callers can
//! tell a duplicate registration from an I/O failure.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::error::ErrorKind;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use ytchat_core::models::{
    AnalysisRun, AnalysisStatus, ChatMessage, Citation, NewChatMessage, NewSegment, NewVideo,
    Segment, Video,
};
use ytchat_core::store::{Store, StoreError, StoreResult};

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn segments_for(&self, video_id: i64) -> StoreResult<Vec<Segment>> {
        let rows = sqlx::query(
            "SELECT id, video_id, start_time, end_time, content, summary, created_at \
             FROM video_segments WHERE video_id = ? ORDER BY start_time ASC, id ASC",
        )
        .bind(video_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        Ok(rows.iter().map(segment_from_row).collect())
    }

    async fn video_where(&self, clause: &str, bind: VideoKey<'_>) -> StoreResult<Option<Video>> {
        let sql = format!(
            "SELECT id, youtube_id, title, description, thumbnail, duration, created_at, updated_at \
             FROM videos WHERE {}",
            clause
        );
        let query = sqlx::query(&sql);
        let query = match bind {
            VideoKey::Id(id) => query.bind(id),
            VideoKey::PlatformId(pid) => query.bind(pid),
        };
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::backend)?;

        match row {
            Some(row) => {
                let mut video = video_from_row(&row);
                video.segments = self.segments_for(video.id).await?;
                Ok(Some(video))
            }
            None => Ok(None),
        }
    }
}

enum VideoKey<'a> {
    Id(i64),
    PlatformId(&'a str),
}

fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn db_error_kind(err: &sqlx::Error) -> Option<ErrorKind> {
    match err {
        sqlx::Error::Database(db) => Some(db.kind()),
        _ => None,
    }
}

fn video_from_row(row: &SqliteRow) -> Video {
    Video {
        id: row.get("id"),
        platform_id: row.get("youtube_id"),
        title: row.get("title"),
        description: row.get("description"),
        thumbnail: row.get("thumbnail"),
        duration: row.get("duration"),
        created_at: ts(row.get("created_at")),
        updated_at: ts(row.get("updated_at")),
        segments: Vec::new(),
    }
}

fn segment_from_row(row: &SqliteRow) -> Segment {
    Segment {
        id: row.get("id"),
        video_id: row.get("video_id"),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        content: row.get("content"),
        summary: row.get("summary"),
        created_at: ts(row.get("created_at")),
    }
}

fn message_from_row(row: &SqliteRow) -> ChatMessage {
    let video_id: Option<i64> = row.get("video_id");
    let start_time: Option<i64> = row.get("start_time");
    let end_time: Option<i64> = row.get("end_time");

    // The schema CHECK keeps these jointly null or jointly set.
    let citation = match (video_id, start_time, end_time) {
        (Some(video_id), Some(start_time), Some(end_time)) => Some(Citation {
            video_id,
            start_time,
            end_time,
        }),
        _ => None,
    };

    ChatMessage {
        id: row.get("id"),
        question: row.get("question"),
        answer: row.get("answer"),
        citation,
        created_at: ts(row.get("created_at")),
        video: None,
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_video(&self, video: &NewVideo) -> StoreResult<Video> {
        let now = Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO videos (youtube_id, title, description, thumbnail, duration,
                                created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&video.platform_id)
        .bind(&video.title)
        .bind(&video.description)
        .bind(&video.thumbnail)
        .bind(video.duration)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match db_error_kind(&e) {
            Some(ErrorKind::UniqueViolation) => StoreError::Conflict {
                platform_id: video.platform_id.clone(),
            },
            Some(ErrorKind::CheckViolation) => StoreError::Constraint(e.to_string()),
            _ => StoreError::backend(e),
        })?;

        Ok(Video {
            id: result.last_insert_rowid(),
            platform_id: video.platform_id.clone(),
            title: video.title.clone(),
            description: video.description.clone(),
            thumbnail: video.thumbnail.clone(),
            duration: video.duration,
            created_at: ts(now),
            updated_at: ts(now),
            segments: Vec::new(),
        })
    }

    async fn find_video_by_platform_id(&self, platform_id: &str) -> StoreResult<Option<Video>> {
        self.video_where("youtube_id = ?", VideoKey::PlatformId(platform_id))
            .await
    }

    async fn get_video(&self, id: i64) -> StoreResult<Option<Video>> {
        self.video_where("id = ?", VideoKey::Id(id)).await
    }

    async fn list_videos(&self) -> StoreResult<Vec<Video>> {
        let video_rows = sqlx::query(
            "SELECT id, youtube_id, title, description, thumbnail, duration, created_at, updated_at \
             FROM videos ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        let segment_rows = sqlx::query(
            "SELECT id, video_id, start_time, end_time, content, summary, created_at \
             FROM video_segments ORDER BY video_id ASC, start_time ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        let mut by_video: HashMap<i64, Vec<Segment>> = HashMap::new();
        for row in &segment_rows {
            let seg = segment_from_row(row);
            by_video.entry(seg.video_id).or_default().push(seg);
        }

        Ok(video_rows
            .iter()
            .map(|row| {
                let mut video = video_from_row(row);
                video.segments = by_video.remove(&video.id).unwrap_or_default();
                video
            })
            .collect())
    }

    async fn delete_video(&self, id: i64) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;

        sqlx::query(
            "UPDATE chat_messages SET video_id = NULL, start_time = NULL, end_time = NULL \
             WHERE video_id = ?",
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::backend)?;

        // Segments and the analysis record cascade
        let result = sqlx::query("DELETE FROM videos WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::backend)?;

        tx.commit().await.map_err(StoreError::backend)?;
        Ok(result.rows_affected())
    }

    async fn insert_segment(&self, video_id: i64, segment: &NewSegment) -> StoreResult<Segment> {
        let now = Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO video_segments (video_id, start_time, end_time, content, summary, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(video_id)
        .bind(segment.start_time)
        .bind(segment.end_time)
        .bind(&segment.content)
        .bind(&segment.summary)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match db_error_kind(&e) {
            Some(ErrorKind::ForeignKeyViolation) => StoreError::MissingVideo { video_id },
            Some(ErrorKind::CheckViolation) => StoreError::Constraint(format!(
                "segment span [{}, {}) is empty or negative",
                segment.start_time, segment.end_time
            )),
            _ => StoreError::backend(e),
        })?;

        Ok(Segment {
            id: result.last_insert_rowid(),
            video_id,
            start_time: segment.start_time,
            end_time: segment.end_time,
            content: segment.content.clone(),
            summary: segment.summary.clone(),
            created_at: ts(now),
        })
    }

    async fn insert_chat_message(&self, message: &NewChatMessage) -> StoreResult<ChatMessage> {
        let now = Utc::now().timestamp();
        let citation = message.citation;

        let result = sqlx::query(
            r#"
            INSERT INTO chat_messages (question, answer, video_id, start_time, end_time, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.question)
        .bind(&message.answer)
        .bind(citation.map(|c| c.video_id))
        .bind(citation.map(|c| c.start_time))
        .bind(citation.map(|c| c.end_time))
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match (db_error_kind(&e), citation) {
            (Some(ErrorKind::ForeignKeyViolation), Some(c)) => StoreError::MissingVideo {
                video_id: c.video_id,
            },
            (Some(ErrorKind::CheckViolation), _) => StoreError::Constraint(e.to_string()),
            _ => StoreError::backend(e),
        })?;

        Ok(ChatMessage {
            id: result.last_insert_rowid(),
            question: message.question.clone(),
            answer: message.answer.clone(),
            citation,
            created_at: ts(now),
            video: None,
        })
    }

    async fn list_chat_messages(&self, limit: i64) -> StoreResult<Vec<ChatMessage>> {
        let rows = sqlx::query(
            "SELECT id, question, answer, video_id, start_time, end_time, created_at \
             FROM chat_messages ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        let mut messages: Vec<ChatMessage> = rows.iter().map(message_from_row).collect();

        let cited: BTreeSet<i64> = messages
            .iter()
            .filter_map(|m| m.citation.map(|c| c.video_id))
            .collect();
        let mut videos: HashMap<i64, Video> = HashMap::new();
        for id in cited {
            if let Some(video) = self.get_video(id).await? {
                videos.insert(id, video);
            }
        }

        for msg in &mut messages {
            msg.video = msg
                .citation
                .and_then(|c| videos.get(&c.video_id))
                .cloned();
        }

        Ok(messages)
    }

    async fn count_chat_messages(&self) -> StoreResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM chat_messages")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::backend)
    }

    async fn put_analysis_run(&self, run: &AnalysisRun) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO analysis_runs (video_id, status, segment_count, error, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(video_id) DO UPDATE SET
                status = excluded.status,
                segment_count = excluded.segment_count,
                error = excluded.error,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(run.video_id)
        .bind(run.status.as_str())
        .bind(run.segment_count)
        .bind(run.error.as_deref())
        .bind(run.updated_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| match db_error_kind(&e) {
            Some(ErrorKind::ForeignKeyViolation) => StoreError::MissingVideo {
                video_id: run.video_id,
            },
            _ => StoreError::backend(e),
        })?;

        Ok(())
    }

    async fn get_analysis_run(&self, video_id: i64) -> StoreResult<Option<AnalysisRun>> {
        let row = sqlx::query(
            "SELECT video_id, status, segment_count, error, updated_at \
             FROM analysis_runs WHERE video_id = ?",
        )
        .bind(video_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: String = row.get("status");
        let status = AnalysisStatus::parse(&status).ok_or_else(|| {
            StoreError::Constraint(format!("unknown analysis status '{}'", status))
        })?;

        Ok(Some(AnalysisRun {
            video_id: row.get("video_id"),
            status,
            segment_count: row.get("segment_count"),
            error: row.get("error"),
            updated_at: ts(row.get("updated_at")),
        }))
    }
}
