//! Video registration, listing, and removal.
//!
//! Registration is the only entry point into the analysis pipeline: once a
//! video row exists, a job is handed to the [`AnalysisQueue`] and the caller
//! gets the new video back (with no segments) without waiting for analysis.

use std::sync::Arc;

use chrono::Utc;

use ytchat_core::models::{AnalysisRun, AnalysisStatus, NewVideo, Video};
use ytchat_core::platform::extract_video_id;
use ytchat_core::store::Store;

use crate::analysis::{AnalysisJob, AnalysisQueue};
use crate::capabilities::MetadataLookup;
use crate::error::AppError;

pub struct Catalog {
    store: Arc<dyn Store>,
    metadata: Arc<dyn MetadataLookup>,
    analysis: AnalysisQueue,
}

impl Catalog {
    pub fn new(
        store: Arc<dyn Store>,
        metadata: Arc<dyn MetadataLookup>,
        analysis: AnalysisQueue,
    ) -> Self {
        Self {
            store,
            metadata,
            analysis,
        }
    }

    pub fn analysis_queue(&self) -> &AnalysisQueue {
        &self.analysis
    }

    /// Register the video behind `url` and queue it for analysis.
    ///
    /// Fails with `InvalidReference` for unrecognised URLs, `AlreadyExists`
    /// for a known video, and `UpstreamUnavailable` when metadata cannot be
    /// fetched. Nothing is written in any of those cases.
    pub async fn register_video(&self, url: &str) -> Result<Video, AppError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(AppError::Validation("youtube_url must not be empty".into()));
        }
        let platform_id =
            extract_video_id(url).ok_or_else(|| AppError::InvalidReference(url.to_string()))?;

        if self
            .store
            .find_video_by_platform_id(&platform_id)
            .await?
            .is_some()
        {
            return Err(AppError::AlreadyExists(platform_id));
        }

        let meta = self.metadata.lookup(&platform_id).await.map_err(|e| {
            tracing::warn!(platform_id = %platform_id, error = %e, "metadata lookup failed");
            AppError::from(e)
        })?;

        // A concurrent registration of the same id surfaces here as a conflict.
        let video = self
            .store
            .insert_video(&NewVideo {
                platform_id: platform_id.clone(),
                title: meta.title,
                description: meta.description,
                thumbnail: meta.thumbnail,
                duration: meta.duration.max(0),
            })
            .await?;

        tracing::info!(video_id = video.id, platform_id = %platform_id, "video registered");

        let job = AnalysisJob {
            video_id: video.id,
            platform_id,
        };
        if let Err(e) = self.analysis.enqueue(job) {
            tracing::warn!(video_id = video.id, error = %e, "could not queue analysis");
            let mut run = AnalysisRun::registered(video.id, Utc::now());
            run.status = AnalysisStatus::Failed;
            run.error = Some(e.to_string());
            if let Err(e) = self.store.put_analysis_run(&run).await {
                tracing::warn!(video_id = video.id, error = %e, "failed to record analysis state");
            }
        }

        Ok(video)
    }

    /// Every video with its segments, oldest registration first.
    pub async fn list_videos(&self) -> Result<Vec<Video>, AppError> {
        Ok(self.store.list_videos().await?)
    }

    pub async fn remove_video(&self, id: i64) -> Result<(), AppError> {
        let removed = self.store.delete_video(id).await?;
        if removed == 0 {
            return Err(AppError::NotFound(format!("video {} not found", id)));
        }
        tracing::info!(video_id = id, "video removed");
        Ok(())
    }

    /// Where `id` is in its analysis lifecycle. A video that no worker has
    /// picked up yet is reported as `registered`.
    pub async fn analysis_status(&self, id: i64) -> Result<AnalysisRun, AppError> {
        let video = self
            .store
            .get_video(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("video {} not found", id)))?;

        Ok(self
            .store
            .get_analysis_run(id)
            .await?
            .unwrap_or_else(|| AnalysisRun::registered(id, video.created_at)))
    }
}
