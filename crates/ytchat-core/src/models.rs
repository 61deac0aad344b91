//! Core data models used throughout ytchat.
//!
//! These types represent the videos, segments, chat exchanges, and analysis
//! records that flow between the catalog, the analysis pipeline, and the
//! question-answering path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered video with its derived segments.
///
/// `platform_id` is the natural key assigned by the hosting platform and is
/// unique across the store. `segments` is empty until analysis completes and
/// is always ordered by `start_time` ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: i64,
    #[serde(rename = "youtube_id")]
    pub platform_id: String,
    pub title: String,
    pub description: String,
    pub thumbnail: String,
    /// Duration in seconds.
    pub duration: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub segments: Vec<Segment>,
}

/// Fields needed to create a [`Video`]. Timestamps and the id are assigned
/// by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVideo {
    pub platform_id: String,
    pub title: String,
    pub description: String,
    pub thumbnail: String,
    pub duration: i64,
}

/// A contiguous `[start_time, end_time)` range of a video, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: i64,
    pub video_id: i64,
    pub start_time: i64,
    pub end_time: i64,
    pub content: String,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

/// A segment descriptor as produced by the segmentation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSegment {
    pub start_time: i64,
    pub end_time: i64,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub summary: String,
}

impl NewSegment {
    /// `0 <= start < end`.
    pub fn has_valid_span(&self) -> bool {
        is_valid_span(self.start_time, self.end_time)
    }
}

/// Returns `true` when `0 <= start < end`.
pub fn is_valid_span(start: i64, end: i64) -> bool {
    start >= 0 && start < end
}

/// A violation found by [`check_timeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineViolation {
    /// The segment at `index` has `start >= end` or a negative start.
    InvalidSpan { index: usize },
    /// The segment at `index` starts before its predecessor.
    Unordered { index: usize },
    /// The segment at `index` overlaps its predecessor.
    Overlap { index: usize },
}

/// Checks that a video's segment list is sorted by start time, that every
/// span is valid, and that no two spans overlap in `[start, end)`.
pub fn check_timeline(segments: &[Segment]) -> Result<(), TimelineViolation> {
    for (index, seg) in segments.iter().enumerate() {
        if !is_valid_span(seg.start_time, seg.end_time) {
            return Err(TimelineViolation::InvalidSpan { index });
        }
        if index == 0 {
            continue;
        }
        let prev = &segments[index - 1];
        if seg.start_time < prev.start_time {
            return Err(TimelineViolation::Unordered { index });
        }
        if seg.start_time < prev.end_time {
            return Err(TimelineViolation::Overlap { index });
        }
    }
    Ok(())
}

/// The (video, time range) an answer refers to.
///
/// Modelled as a single optional value so a time range can never exist
/// without the video it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub video_id: i64,
    pub start_time: i64,
    pub end_time: i64,
}

/// One persisted question/answer exchange.
///
/// Serializes flat: `video_id`, `start_time`, and `end_time` appear together
/// or not at all. `video` is attached on reads when the citation resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub question: String,
    pub answer: String,
    #[serde(flatten)]
    pub citation: Option<Citation>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<Video>,
}

/// Fields needed to append a [`ChatMessage`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewChatMessage {
    pub question: String,
    pub answer: String,
    pub citation: Option<Citation>,
}

/// Where a video is in its analysis lifecycle.
///
/// `Registered → Analyzing → Analyzed | Failed`. The last two are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Registered,
    Analyzing,
    Analyzed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Analyzing => "analyzing",
            Self::Analyzed => "analyzed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "registered" => Some(Self::Registered),
            "analyzing" => Some(Self::Analyzing),
            "analyzed" => Some(Self::Analyzed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// The recorded outcome of the analysis run for one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRun {
    pub video_id: i64,
    pub status: AnalysisStatus,
    /// Segments written by a completed run.
    pub segment_count: Option<i64>,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisRun {
    /// The state of a video that has never been picked up by a worker.
    pub fn registered(video_id: i64, at: DateTime<Utc>) -> Self {
        Self {
            video_id,
            status: AnalysisStatus::Registered,
            segment_count: None,
            error: None,
            updated_at: at,
        }
    }
}
