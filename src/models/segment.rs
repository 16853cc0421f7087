use chrono::{DateTime, Utc};
use serde::Serialize;

/// A virtual slice of an Episode's audio. `duration` is derived, never
/// stored. See `crate::segment::state` for the legal transitions between
/// `status` values.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct AudioSegment {
    pub id: i64,
    pub episode_id: i64,
    pub segment_index: i32,
    pub segment_id: String,
    pub start_time: f64,
    pub end_time: f64,
    pub status: String,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub temp_clip_path: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub recognized_at: Option<DateTime<Utc>>,
}

impl AudioSegment {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    pub fn status_enum(&self) -> Option<SegmentStatus> {
        SegmentStatus::parse(&self.status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SegmentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SegmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentStatus::Pending => "pending",
            SegmentStatus::Processing => "processing",
            SegmentStatus::Completed => "completed",
            SegmentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SegmentStatus::Pending),
            "processing" => Some(SegmentStatus::Processing),
            "completed" => Some(SegmentStatus::Completed),
            "failed" => Some(SegmentStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for SegmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A new segment row before it has an id, as produced by virtual
/// segmentation (`Orchestrator::start_episode`).
#[derive(Debug, Clone)]
pub struct NewSegment {
    pub episode_id: i64,
    pub segment_index: i32,
    pub segment_id: String,
    pub start_time: f64,
    pub end_time: f64,
}

/// Splits `duration` into contiguous `[start, end)` slices of at most
/// `segment_duration` seconds, per spec §4.6.2 / invariant 1. The last
/// slice is clipped to `duration`, so it may be shorter than the rest.
pub fn plan_segments(episode_id: i64, duration: f64, segment_duration: f64) -> Vec<NewSegment> {
    if duration <= 0.0 {
        return Vec::new();
    }
    let total = (duration / segment_duration).ceil() as i32;
    (0..total)
        .map(|i| {
            let start_time = i as f64 * segment_duration;
            let end_time = ((i + 1) as f64 * segment_duration).min(duration);
            NewSegment {
                episode_id,
                segment_index: i,
                segment_id: format!("segment_{:03}", i),
                start_time,
                end_time,
            }
        })
        .collect()
}
