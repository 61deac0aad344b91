//! Background analysis of registered videos.
//!
//! Registration enqueues an [`AnalysisJob`] and returns immediately. A
//! dispatcher task pulls jobs off a bounded channel and runs each one on its
//! own task, with at most `analysis.workers` running at once. Per video the
//! lifecycle is:
//!
//! ```text
//! registered ──▶ analyzing ──▶ analyzed
//!                    │
//!                    └───────▶ failed
//! ```
//!
//! Both end states are terminal. A capability failure writes no segments;
//! a single failed segment write is logged and skipped. Nothing is retried.
//!
//! A video has at most one job queued or running: [`AnalysisQueue::enqueue`]
//! rejects a second one until the first finishes.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

use ytchat_core::models::{AnalysisRun, AnalysisStatus};
use ytchat_core::store::{Store, StoreError};

use crate::capabilities::Segmenter;

/// Request to analyse one registered video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisJob {
    pub video_id: i64,
    pub platform_id: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("analysis already queued or running for video {0}")]
    AlreadyInFlight(i64),
    #[error("analysis queue is full")]
    Full,
    #[error("analysis queue is shut down")]
    Closed,
}

type InFlight = Arc<Mutex<HashSet<i64>>>;

/// Removes a video from the in-flight set when the job ends, however it ends.
struct InFlightGuard {
    set: InFlight,
    video_id: i64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.video_id);
    }
}

/// Runs a single analysis job against a store and a segmenter.
pub struct AnalysisWorker {
    store: Arc<dyn Store>,
    segmenter: Arc<dyn Segmenter>,
}

impl AnalysisWorker {
    pub fn new(store: Arc<dyn Store>, segmenter: Arc<dyn Segmenter>) -> Self {
        Self { store, segmenter }
    }

    async fn record(&self, run: &AnalysisRun) -> Result<(), StoreError> {
        self.store.put_analysis_run(run).await.inspect_err(|e| {
            tracing::warn!(video_id = run.video_id, status = run.status.as_str(), error = %e,
                "failed to record analysis state");
        })
    }

    /// Analyse one video and return its final recorded state.
    pub async fn run(&self, job: &AnalysisJob) -> AnalysisRun {
        let mut run = AnalysisRun::registered(job.video_id, Utc::now());
        run.status = AnalysisStatus::Analyzing;
        if let Err(StoreError::MissingVideo { .. }) = self.record(&run).await {
            // Deleted between registration and pickup
            run.status = AnalysisStatus::Failed;
            run.error = Some("video was removed before analysis started".to_string());
            return run;
        }

        tracing::info!(video_id = job.video_id, platform_id = %job.platform_id, "analysis started");

        let descriptors = match self.segmenter.segment(&job.platform_id).await {
            Ok(d) => d,
            Err(e) => {
                tracing::error!(video_id = job.video_id, platform_id = %job.platform_id,
                    capability = e.capability(), error = %e, "analysis failed");
                run.status = AnalysisStatus::Failed;
                run.error = Some(e.to_string());
                run.updated_at = Utc::now();
                let _ = self.record(&run).await;
                return run;
            }
        };

        let mut written: i64 = 0;
        for (index, descriptor) in descriptors.iter().enumerate() {
            if !descriptor.has_valid_span() {
                tracing::warn!(video_id = job.video_id, index,
                    start_time = descriptor.start_time, end_time = descriptor.end_time,
                    "skipping segment with invalid span");
                continue;
            }
            match self.store.insert_segment(job.video_id, descriptor).await {
                Ok(_) => written += 1,
                Err(StoreError::MissingVideo { .. }) => {
                    tracing::warn!(video_id = job.video_id, "video removed during analysis");
                    run.status = AnalysisStatus::Failed;
                    run.error = Some("video was removed during analysis".to_string());
                    run.segment_count = Some(written);
                    return run;
                }
                Err(e) => {
                    tracing::error!(video_id = job.video_id, index, error = %e,
                        "failed to save segment");
                }
            }
        }

        run.status = AnalysisStatus::Analyzed;
        run.segment_count = Some(written);
        run.updated_at = Utc::now();
        let _ = self.record(&run).await;

        tracing::info!(video_id = job.video_id, platform_id = %job.platform_id,
            segments = written, received = descriptors.len(), "analysis completed");
        run
    }
}

/// Handle to the analysis job queue. Cheap to clone.
#[derive(Clone)]
pub struct AnalysisQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    sender: Mutex<Option<mpsc::Sender<QueuedJob>>>,
    in_flight: InFlight,
    dispatcher: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl AnalysisQueue {
    /// Spawns the dispatcher. Must be called from within a tokio runtime.
    pub fn start(worker: AnalysisWorker, workers: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let in_flight: InFlight = Arc::default();
        let permits = Arc::new(Semaphore::new(workers.max(1)));

        let dispatcher = tokio::spawn(dispatch(rx, Arc::new(worker), permits));

        tracing::debug!(workers, capacity, "analysis queue started");

        Self {
            inner: Arc::new(QueueInner {
                sender: Mutex::new(Some(tx)),
                in_flight,
                dispatcher: tokio::sync::Mutex::new(Some(dispatcher)),
            }),
        }
    }

    /// Queues a job without waiting.
    pub fn enqueue(&self, job: AnalysisJob) -> Result<(), EnqueueError> {
        let sender = self
            .inner
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(EnqueueError::Closed)?;

        let video_id = job.video_id;
        if !self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(video_id)
        {
            return Err(EnqueueError::AlreadyInFlight(video_id));
        }
        let guard = InFlightGuard {
            set: self.inner.in_flight.clone(),
            video_id,
        };

        sender
            .try_send(QueuedJob { job, _guard: guard })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
                mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
            })
    }

    /// Whether a job for `video_id` is queued or running.
    pub fn is_in_flight(&self, video_id: i64) -> bool {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&video_id)
    }

    /// Stops accepting jobs and waits for queued and running ones to finish.
    pub async fn shutdown(&self) {
        self.inner
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let handle = self.inner.dispatcher.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "analysis dispatcher panicked");
            }
        }
    }
}

/// A job travelling through the channel together with its in-flight
/// reservation.
struct QueuedJob {
    job: AnalysisJob,
    _guard: InFlightGuard,
}

async fn dispatch(
    mut rx: mpsc::Receiver<QueuedJob>,
    worker: Arc<AnalysisWorker>,
    permits: Arc<Semaphore>,
) {
    let mut tasks = JoinSet::new();

    while let Some(queued) = rx.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let worker = worker.clone();
        tasks.spawn(async move {
            worker.run(&queued.job).await;
            drop(queued);
            drop(permit);
        });

        while let Some(done) = tasks.try_join_next() {
            if let Err(e) = done {
                tracing::error!(error = %e, "analysis task panicked");
            }
        }
    }

    while let Some(done) = tasks.join_next().await {
        if let Err(e) = done {
            tracing::error!(error = %e, "analysis task panicked");
        }
    }
    tracing::debug!("analysis queue drained");
}
