use chrono::{DateTime, Utc};
use serde::Serialize;

/// The unit of ingestion. Status is the only mutable field the core writes
/// directly; `total_segments`, `needs_segmentation`,
/// `transcription_started_at` and `transcription_completed_at` are derived
/// (see `crate::projector`), never stored.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Episode {
    pub id: i64,
    pub file_hash: String,
    pub original_filename: String,
    pub audio_path: String,
    pub byte_size: i64,
    pub duration_seconds: f64,
    pub language: Option<String>,
    pub transcription_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Enumerates the five legal values of `Episode::transcription_status`.
/// Kept as a plain string column (matching the source system) rather than
/// a Postgres enum type, so recovery queries can `IN (...)` freely without
/// a cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EpisodeStatus {
    Pending,
    Processing,
    Completed,
    PartialFailed,
    Failed,
}

impl EpisodeStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EpisodeStatus::Pending),
            "processing" => Some(EpisodeStatus::Processing),
            "completed" => Some(EpisodeStatus::Completed),
            "partial_failed" => Some(EpisodeStatus::PartialFailed),
            "failed" => Some(EpisodeStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EpisodeStatus::Pending => "pending",
            EpisodeStatus::Processing => "processing",
            EpisodeStatus::Completed => "completed",
            EpisodeStatus::PartialFailed => "partial_failed",
            EpisodeStatus::Failed => "failed",
        }
    }

    pub fn display_label(&self) -> &'static str {
        match self {
            EpisodeStatus::Pending => "Queued",
            EpisodeStatus::Processing => "Transcribing",
            EpisodeStatus::Completed => "Completed",
            EpisodeStatus::PartialFailed => "Completed with errors",
            EpisodeStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for EpisodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Episode {
    /// `⌈duration / SEGMENT_DURATION⌉`.
    pub fn total_segments(&self, segment_duration: f64) -> i64 {
        (self.duration_seconds / segment_duration).ceil() as i64
    }

    pub fn needs_segmentation(&self, segment_duration: f64) -> bool {
        self.duration_seconds > segment_duration
    }

    pub fn language_or_default(&self, default_language: &str) -> String {
        self.language
            .clone()
            .unwrap_or_else(|| default_language.to_string())
    }
}
