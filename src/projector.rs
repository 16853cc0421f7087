//! Derives display-only episode/segment views from stored rows. Nothing
//! here is persisted (spec §4.8, §9 "derived entity fields ... map to pure
//! functions, keep them uncached").

use crate::models::{AudioSegment, Episode, EpisodeStatus, SegmentStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SegmentStats {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EpisodeView {
    pub episode_id: i64,
    pub status: String,
    pub status_display: String,
    pub total_segments: i64,
    pub progress_percent: f64,
    pub estimated_remaining_seconds: f64,
    pub stats: SegmentStats,
    pub transcription_started_at: Option<DateTime<Utc>>,
    pub transcription_completed_at: Option<DateTime<Utc>>,
}

fn count_by_status(segments: &[AudioSegment]) -> SegmentStats {
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for s in segments {
        *counts.entry(s.status.as_str()).or_insert(0) += 1;
    }
    SegmentStats {
        pending: *counts.get("pending").unwrap_or(&0),
        processing: *counts.get("processing").unwrap_or(&0),
        completed: *counts.get("completed").unwrap_or(&0),
        failed: *counts.get("failed").unwrap_or(&0),
    }
}

/// `(completed / total) * 100`, rounded to 2 decimals.
pub fn progress_percent(segments: &[AudioSegment]) -> f64 {
    if segments.is_empty() {
        return 0.0;
    }
    let completed = segments
        .iter()
        .filter(|s| s.status_enum() == Some(SegmentStatus::Completed))
        .count();
    let raw = (completed as f64 / segments.len() as f64) * 100.0;
    (raw * 100.0).round() / 100.0
}

/// `(pending + processing) * SEGMENT_DURATION * TRANSCRIBE_SPEED_FACTOR`.
pub fn estimated_remaining_seconds(
    segments: &[AudioSegment],
    segment_duration: f64,
    transcribe_speed_factor: f64,
) -> f64 {
    let outstanding = segments
        .iter()
        .filter(|s| {
            matches!(
                s.status_enum(),
                Some(SegmentStatus::Pending) | Some(SegmentStatus::Processing)
            )
        })
        .count();
    outstanding as f64 * segment_duration * transcribe_speed_factor
}

/// `min` over segment `started_at`s, or `None` if no segment has started.
pub fn transcription_started_at(segments: &[AudioSegment]) -> Option<DateTime<Utc>> {
    segments.iter().filter_map(|s| s.started_at).min()
}

/// `max` over `recognized_at`, defined only when every segment is
/// `completed` (invariant 5).
pub fn transcription_completed_at(segments: &[AudioSegment]) -> Option<DateTime<Utc>> {
    if segments.is_empty() || !segments.iter().all(|s| s.status_enum() == Some(SegmentStatus::Completed)) {
        return None;
    }
    segments.iter().filter_map(|s| s.recognized_at).max()
}

/// Computes the final episode status from its segments' terminal states,
/// per the aggregate rule in spec §4.6.6.
pub fn aggregate_status(segments: &[AudioSegment]) -> EpisodeStatus {
    let completed = segments
        .iter()
        .filter(|s| s.status_enum() == Some(SegmentStatus::Completed))
        .count();
    let failed = segments
        .iter()
        .filter(|s| s.status_enum() == Some(SegmentStatus::Failed))
        .count();

    if completed == segments.len() && !segments.is_empty() {
        EpisodeStatus::Completed
    } else if completed > 0 && failed > 0 {
        EpisodeStatus::PartialFailed
    } else if failed == segments.len() && !segments.is_empty() {
        EpisodeStatus::Failed
    } else {
        EpisodeStatus::Processing
    }
}

pub fn project(episode: &Episode, segments: &[AudioSegment], segment_duration: f64, transcribe_speed_factor: f64) -> EpisodeView {
    let status = EpisodeStatus::parse(&episode.transcription_status).unwrap_or(EpisodeStatus::Pending);
    EpisodeView {
        episode_id: episode.id,
        status: episode.transcription_status.clone(),
        status_display: status.display_label().to_string(),
        total_segments: segments.len() as i64,
        progress_percent: progress_percent(segments),
        estimated_remaining_seconds: estimated_remaining_seconds(segments, segment_duration, transcribe_speed_factor),
        stats: count_by_status(segments),
        transcription_started_at: transcription_started_at(segments),
        transcription_completed_at: transcription_completed_at(segments),
    }
}
