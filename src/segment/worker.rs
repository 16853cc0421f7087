use super::state::is_claimable;
use crate::asr::AsrAdapter;
use crate::clip::ClipExtractor;
use crate::config::Config;
use crate::error::{AppError, StateSnapshot};
use crate::models::{AudioSegment, Episode, EpisodeStatus};
use crate::store::{CueRepository, EpisodeRepository, SegmentRepository};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Outcome of one `SegmentWorker` run. Never an `Err` for ordinary ASR/clip
/// failures — those are captured as `Failed` and written to the segment
/// row; workers are independent, per spec §4.5.6.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerOutcome {
    AlreadyCompleted { cue_count: i64 },
    AlreadyProcessing,
    Cancelled,
    Completed { cue_count: usize },
    Failed { error: String },
}

/// Drives exactly one segment through `extract → transcribe → persist →
/// finalize` (spec §4.5). Every collaborator is injected as a trait object
/// so the pipeline is testable without a live database, ffmpeg, or model.
pub struct SegmentWorker {
    clip_extractor: Arc<dyn ClipExtractor>,
    asr: Arc<AsrAdapter>,
    segments: Arc<dyn SegmentRepository>,
    cues: Arc<dyn CueRepository>,
    episodes: Arc<dyn EpisodeRepository>,
    config: Arc<Config>,
}

impl SegmentWorker {
    pub fn new(
        clip_extractor: Arc<dyn ClipExtractor>,
        asr: Arc<AsrAdapter>,
        segments: Arc<dyn SegmentRepository>,
        cues: Arc<dyn CueRepository>,
        episodes: Arc<dyn EpisodeRepository>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            clip_extractor,
            asr,
            segments,
            cues,
            episodes,
            config,
        }
    }

    #[tracing::instrument(skip(self, episode), fields(episode_id = episode.id, segment_id))]
    pub async fn run_segment(
        &self,
        episode: &Episode,
        segment_id: i64,
        enable_diarization: bool,
    ) -> Result<WorkerOutcome, AppError> {
        let segment = self
            .segments
            .find(segment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("segment {} not found", segment_id)))?;

        let status = segment.status_enum().ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("segment {} has unknown status {}", segment.id, segment.status))
        })?;

        if let Some(outcome) = self.check_preconditions(&segment, status).await? {
            return Ok(outcome);
        }

        // A cancel is only a real cancel if this run started out as part of
        // an active `processing` episode. `Orchestrator::run_segment` (the
        // on-demand entry point) never flips `episode.status` itself, so a
        // freshly created episode sitting in `pending` must not be mistaken
        // for one that was cancelled mid-flight.
        let cancellable = episode.transcription_status == EpisodeStatus::Processing.as_str();

        if self.is_cancelled(episode.id, cancellable).await? {
            return Ok(WorkerOutcome::Cancelled);
        }

        let clip_path = match self.ready_clip(episode, &segment).await {
            Ok(path) => path,
            Err(e) => {
                self.segments.mark_failed(segment.id, &e).await?;
                return Ok(WorkerOutcome::Failed { error: e });
            }
        };

        if self.is_cancelled(episode.id, cancellable).await? {
            // Cancel landed after the clip step but before we committed
            // `processing` — leave the segment in `pending`, the clip is
            // retained for a future attempt to reuse.
            return Ok(WorkerOutcome::Cancelled);
        }

        let clip_path_str = clip_path.to_string_lossy().into_owned();
        let segment = self
            .segments
            .mark_processing(segment.id, Some(&clip_path_str))
            .await?;

        let language = normalize_language(&episode.language_or_default(&self.config.default_language));

        let asr_timeout = Duration::from_secs_f64(segment.duration() * self.config.asr_timeout_factor);
        let raw_cues = match tokio::time::timeout(
            asr_timeout,
            self.asr.transcribe(&clip_path, Some(&language), enable_diarization),
        )
        .await
        {
            Ok(Ok(cues)) => cues,
            Ok(Err(e)) => {
                self.segments.mark_failed(segment.id, &e.to_string()).await?;
                return Ok(WorkerOutcome::Failed { error: e.to_string() });
            }
            Err(_) => {
                let message = format!("ASR call exceeded {:?} timeout", asr_timeout);
                self.segments.mark_failed(segment.id, &message).await?;
                return Ok(WorkerOutcome::Failed { error: message });
            }
        };

        if self.is_cancelled(episode.id, cancellable).await? {
            // Finish-and-discard: the ASR call already ran to completion
            // (it is not interruptible), but we never write its cues, per
            // the chosen cancellation resolution in spec §9.
            return Ok(WorkerOutcome::Cancelled);
        }

        let inserted = match self.cues.replace_segment_cues(&segment, raw_cues).await {
            Ok(n) => n,
            Err(e) => {
                self.segments.mark_failed(segment.id, &e.to_string()).await?;
                return Ok(WorkerOutcome::Failed { error: e.to_string() });
            }
        };

        self.segments.mark_completed(segment.id).await?;

        if let Err(e) = tokio::fs::remove_file(&clip_path).await {
            tracing::warn!(clip_path = %clip_path.display(), "failed to delete temp clip (ignored): {}", e);
        }

        Ok(WorkerOutcome::Completed { cue_count: inserted })
    }

    async fn check_preconditions(
        &self,
        segment: &AudioSegment,
        status: crate::models::SegmentStatus,
    ) -> Result<Option<WorkerOutcome>, AppError> {
        use crate::models::SegmentStatus::*;
        match status {
            Completed => {
                let cue_count = self.cues.count_by_segment(segment.id).await?;
                Ok(Some(WorkerOutcome::AlreadyCompleted { cue_count }))
            }
            Processing => Ok(Some(WorkerOutcome::AlreadyProcessing)),
            Failed if !is_claimable(status, segment.retry_count, self.config.max_retries) => {
                Err(AppError::PreconditionedRejection {
                    message: "segment has reached MAX_RETRIES".to_string(),
                    state: StateSnapshot {
                        status: segment.status.clone(),
                        retry_count: Some(segment.retry_count),
                    },
                })
            }
            _ => Ok(None),
        }
    }

    async fn ready_clip(&self, episode: &Episode, segment: &AudioSegment) -> Result<PathBuf, String> {
        if let Some(existing) = &segment.temp_clip_path {
            let path = PathBuf::from(existing);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Ok(path);
            }
        }
        let source = Path::new(&episode.audio_path);
        self.clip_extractor
            .extract(source, segment.start_time, segment.duration())
            .await
            .map_err(|e| e.to_string())
    }

    async fn is_cancelled(&self, episode_id: i64, cancellable: bool) -> Result<bool, AppError> {
        if !cancellable {
            return Ok(false);
        }
        let episode = self
            .episodes
            .find(episode_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("episode {} not found", episode_id)))?;
        Ok(episode.transcription_status == EpisodeStatus::Pending.as_str())
    }
}

/// Reduces a language tag (e.g. `"en-US"`) to the 2-letter prefix the ASR
/// Adapter expects, per spec §4.5.3.
pub fn normalize_language(tag: &str) -> String {
    tag.split(['-', '_'])
        .next()
        .unwrap_or(tag)
        .to_lowercase()
}
