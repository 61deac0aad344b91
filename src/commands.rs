//! CLI command implementations.
//!
//! Each `run_*` function backs one `ytchat` subcommand. They open the
//! database, wire the same [`AppState`] the server uses, and print
//! human-readable output to stdout.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use ytchat_core::models::{AnalysisStatus, Video};
use ytchat_core::platform::watch_url;
use ytchat_core::store::Store;

use crate::config::ConfigHandle;
use crate::server::AppState;
use crate::sqlite_store::SqliteStore;
use crate::{db, migrate};

async fn open(config: &Arc<ConfigHandle>) -> Result<(AppState, SqlitePool)> {
    let pool = db::connect(&config.snapshot()).await?;
    migrate::migrate(&pool).await?;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool.clone()));
    Ok((AppState::assemble(config.clone(), store), pool))
}

async fn close(state: AppState, pool: SqlitePool) {
    state.analysis_queue().shutdown().await;
    pool.close().await;
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn format_duration(secs: i64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

fn print_video(video: &Video) {
    println!(
        "[{}] {} ({}) {}",
        video.id,
        if video.title.is_empty() {
            "(untitled)"
        } else {
            video.title.as_str()
        },
        format_duration(video.duration),
        watch_url(&video.platform_id)
    );
    for seg in &video.segments {
        println!(
            "    {:>6} - {:<6} {}",
            format_duration(seg.start_time),
            format_duration(seg.end_time),
            seg.summary
        );
    }
}

pub async fn run_videos_list(config: Arc<ConfigHandle>) -> Result<()> {
    let (state, pool) = open(&config).await?;
    let videos = state.catalog.list_videos().await?;

    if videos.is_empty() {
        println!("No videos registered.");
    }
    for video in &videos {
        print_video(video);
    }

    close(state, pool).await;
    Ok(())
}

/// Registers a video and waits for its analysis to finish.
pub async fn run_videos_add(config: Arc<ConfigHandle>, url: &str) -> Result<()> {
    let (state, pool) = open(&config).await?;

    let video = state.catalog.register_video(url).await?;
    println!(
        "Registered video {} ({}). Analyzing...",
        video.id, video.platform_id
    );

    state.analysis_queue().shutdown().await;

    let run = state.catalog.analysis_status(video.id).await?;
    match run.status {
        AnalysisStatus::Analyzed => println!(
            "Analysis complete: {} segments.",
            run.segment_count.unwrap_or(0)
        ),
        AnalysisStatus::Failed => println!(
            "Analysis failed: {}",
            run.error.as_deref().unwrap_or("unknown error")
        ),
        other => println!("Analysis state: {}", other.as_str()),
    }

    pool.close().await;
    Ok(())
}

pub async fn run_videos_remove(config: Arc<ConfigHandle>, id: i64) -> Result<()> {
    let (state, pool) = open(&config).await?;
    state.catalog.remove_video(id).await?;
    println!("Removed video {}.", id);
    close(state, pool).await;
    Ok(())
}

pub async fn run_ask(config: Arc<ConfigHandle>, question: &str) -> Result<()> {
    let (state, pool) = open(&config).await?;
    let response = state.retriever.ask(question).await?;

    println!("{}", response.answer);
    if let (Some(start), Some(end)) = (response.start_time, response.end_time) {
        match &response.video {
            Some(video) => println!(
                "\nSource: {} [{} - {}] {}&t={}s",
                video.title,
                format_duration(start),
                format_duration(end),
                watch_url(&video.platform_id),
                start
            ),
            None => println!(
                "\nSource: unregistered video [{} - {}]",
                format_duration(start),
                format_duration(end)
            ),
        }
    }

    close(state, pool).await;
    Ok(())
}

pub async fn run_history(config: Arc<ConfigHandle>, limit: Option<i64>) -> Result<()> {
    let (state, pool) = open(&config).await?;
    let messages = state.retriever.history(limit).await?;

    if messages.is_empty() {
        println!("No chat history.");
    }
    for msg in &messages {
        println!("--- {} ({}) ---", msg.id, format_ts(msg.created_at));
        println!("Q: {}", msg.question);
        println!("A: {}", msg.answer);
        if let Some(c) = msg.citation {
            let title = msg.video.as_ref().map(|v| v.title.as_str()).unwrap_or("?");
            println!(
                "   cites video {} \"{}\" [{} - {}]",
                c.video_id,
                title,
                format_duration(c.start_time),
                format_duration(c.end_time)
            );
        }
        println!();
    }

    close(state, pool).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(75), "1:15");
        assert_eq!(format_duration(3600), "60:00");
    }
}
