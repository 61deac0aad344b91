//! Database schema migrations (idempotent).
//!
//! Every statement is `CREATE ... IF NOT EXISTS`, so running migrations on
//! an existing database is a no-op. `ytchat init` runs them explicitly and
//! `ytchat serve` runs them on startup.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Apply the schema to an open pool.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    // Videos; youtube_id is the platform's natural key
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS videos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            youtube_id TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            thumbnail TEXT NOT NULL DEFAULT '',
            duration INTEGER NOT NULL DEFAULT 0 CHECK (duration >= 0),
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Segments belong to exactly one video and go away with it
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS video_segments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            video_id INTEGER NOT NULL,
            start_time INTEGER NOT NULL,
            end_time INTEGER NOT NULL,
            content TEXT NOT NULL DEFAULT '',
            summary TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            CHECK (start_time >= 0 AND start_time < end_time),
            FOREIGN KEY (video_id) REFERENCES videos(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Chat log; the citation columns are jointly null or jointly set.
    // No ON DELETE action: the store nulls citations before deleting a video.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chat_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            question TEXT NOT NULL CHECK (length(question) > 0),
            answer TEXT NOT NULL,
            video_id INTEGER,
            start_time INTEGER,
            end_time INTEGER,
            created_at INTEGER NOT NULL,
            CHECK (
                (video_id IS NULL AND start_time IS NULL AND end_time IS NULL)
                OR (video_id IS NOT NULL AND start_time IS NOT NULL AND end_time IS NOT NULL)
            ),
            FOREIGN KEY (video_id) REFERENCES videos(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_runs (
            video_id INTEGER PRIMARY KEY,
            status TEXT NOT NULL,
            segment_count INTEGER,
            error TEXT,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY (video_id) REFERENCES videos(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_segments_video_start ON video_segments(video_id, start_time)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chat_messages_created_at ON chat_messages(created_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chat_messages_video_id ON chat_messages(video_id)")
        .execute(pool)
        .await?;

    Ok(())
}
