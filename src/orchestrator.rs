use crate::asr::AsrAdapter;
use crate::config::Config;
use crate::error::{AppError, StateSnapshot};
use crate::models::{plan_segments, Episode, EpisodeStatus, SegmentStatus};
use crate::projector;
use crate::segment::{SegmentWorker, WorkerOutcome};
use crate::store::{CueRepository, EpisodeRepository, SegmentRepository};
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Debug, Clone, Copy, Default)]
pub struct StartEpisodeOptions {
    pub enable_diarization: bool,
}

/// Creates virtual segments for a new episode, schedules the worker pool,
/// and aggregates per-segment outcomes into the episode's final status
/// (spec §4.6).
pub struct Orchestrator {
    episodes: Arc<dyn EpisodeRepository>,
    segments: Arc<dyn SegmentRepository>,
    #[allow(dead_code)]
    cues: Arc<dyn CueRepository>,
    asr: Arc<AsrAdapter>,
    worker: Arc<SegmentWorker>,
    config: Arc<Config>,
}

impl Orchestrator {
    pub fn new(
        episodes: Arc<dyn EpisodeRepository>,
        segments: Arc<dyn SegmentRepository>,
        cues: Arc<dyn CueRepository>,
        asr: Arc<AsrAdapter>,
        worker: Arc<SegmentWorker>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            episodes,
            segments,
            cues,
            asr,
            worker,
            config,
        }
    }

    #[tracing::instrument(skip(self, opts), fields(episode_id))]
    pub async fn start_episode(
        &self,
        episode_id: i64,
        opts: StartEpisodeOptions,
    ) -> Result<EpisodeStatus, AppError> {
        let mut episode = self
            .episodes
            .find(episode_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("episode {} not found", episode_id)))?;

        // Idempotence: a second StartEpisode call while one is already in
        // flight returns the current status rather than starting a
        // concurrent run.
        if episode.transcription_status == EpisodeStatus::Processing.as_str() {
            return Ok(EpisodeStatus::Processing);
        }

        let existing = self.segments.list_by_episode(episode_id).await?;
        if existing.is_empty() {
            let planned = plan_segments(episode_id, episode.duration_seconds, self.config.segment_duration);
            self.segments.create_all(planned).await?;
        }

        self.episodes
            .set_status(episode_id, EpisodeStatus::Processing)
            .await?;
        // Keep the in-memory snapshot in sync with the write above — it's
        // what `dispatch` hands each worker, and workers use it to decide
        // whether a later read back to `pending` is a real cancel signal.
        episode.transcription_status = EpisodeStatus::Processing.as_str().to_string();

        let diarization_loaded = if opts.enable_diarization {
            match self.asr.load_diarization().await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("diarization pre-load failed, downgrading to no-diarization: {}", e);
                    false
                }
            }
        } else {
            false
        };

        let segments = self.segments.list_by_episode(episode_id).await?;
        self.dispatch(&episode, &segments, diarization_loaded).await;

        if diarization_loaded {
            self.asr.release_diarization().await;
        }

        self.finalize(episode_id).await
    }

    /// Submits every segment not already `completed` to the worker pool,
    /// in index order, and waits for them all to finish (or be
    /// cancelled). Submission order matches spec §4.6.5; concurrency
    /// within that order is bounded by `worker_pool_size`, which may
    /// exceed the effective parallelism set by the ASR mutex.
    async fn dispatch(&self, episode: &Episode, segments: &[crate::models::AudioSegment], enable_diarization: bool) {
        let semaphore = Arc::new(Semaphore::new(self.config.worker_pool_size.max(1)));
        let mut handles = Vec::with_capacity(segments.len());

        for segment in segments {
            if segment.status_enum() == Some(SegmentStatus::Completed) {
                continue;
            }
            let permit = semaphore.clone();
            let worker = self.worker.clone();
            let episode = episode.clone();
            let segment_id = segment.id;

            handles.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore never closed");
                worker.run_segment(&episode, segment_id, enable_diarization).await
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(Ok(outcome)) => tracing::debug!(?outcome, "segment worker finished"),
                Ok(Err(e)) => tracing::warn!("segment worker returned an error: {}", e),
                Err(e) => tracing::error!("segment worker task panicked: {}", e),
            }
        }
    }

    async fn finalize(&self, episode_id: i64) -> Result<EpisodeStatus, AppError> {
        let episode = self
            .episodes
            .find(episode_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("episode {} not found", episode_id)))?;

        // A cancel signal observed during dispatch takes priority over the
        // segment aggregate: the episode's status field was already set
        // back to `pending` by whoever cancelled it, and workers that
        // observed the cancel left their segments untouched or `pending`.
        if episode.transcription_status == EpisodeStatus::Pending.as_str() {
            return Ok(EpisodeStatus::Pending);
        }

        let segments = self.segments.list_by_episode(episode_id).await?;
        let status = projector::aggregate_status(&segments);
        self.episodes.set_status(episode_id, status).await?;
        Ok(status)
    }

    /// On-demand single-segment entry point. Never mutates
    /// `episode.status` synchronously (spec §4.6, final paragraph).
    #[tracing::instrument(skip(self))]
    pub async fn run_segment(
        &self,
        episode_id: i64,
        segment_index: i32,
    ) -> Result<WorkerOutcome, AppError> {
        let episode = self
            .episodes
            .find(episode_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("episode {} not found", episode_id)))?;

        let segment = self
            .segments
            .find_by_index(episode_id, segment_index)
            .await?
            .ok_or_else(|| AppError::Validation(format!("segment index {} out of range", segment_index)))?;

        if let Some(SegmentStatus::Failed) = segment.status_enum() {
            if segment.retry_count >= self.config.max_retries {
                return Err(AppError::PreconditionedRejection {
                    message: "segment has reached MAX_RETRIES".to_string(),
                    state: StateSnapshot {
                        status: segment.status.clone(),
                        retry_count: Some(segment.retry_count),
                    },
                });
            }
        }

        self.worker.run_segment(&episode, segment.id, false).await
    }
}
