use serde::Serialize;

/// A persisted utterance span. Ids are stable once assigned; annotations
/// (out of scope for this core) reference them directly.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct TranscriptCue {
    pub id: i64,
    pub episode_id: i64,
    pub segment_id: Option<i64>,
    pub start_time: f64,
    pub end_time: f64,
    pub speaker: String,
    pub text: String,
}

/// One cue as returned by the ASR Adapter, with timestamps relative to the
/// clip (0-based). Translated to absolute time by the Cue Store.
#[derive(Debug, Clone)]
pub struct RawCue {
    pub start: f64,
    pub end: f64,
    pub speaker: String,
    pub text: String,
}

impl RawCue {
    pub fn new(start: f64, end: f64, speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            speaker: speaker.into(),
            text: text.into(),
        }
    }
}
