use crate::config::Config;
use crate::error::AppError;
use crate::models::EpisodeStatus;
use crate::orchestrator::{Orchestrator, StartEpisodeOptions};
use crate::projector;
use crate::store::{EpisodeRepository, SegmentRepository};
use chrono::{Duration, Utc};
use std::sync::Arc;

/// Boot-time and on-demand reconciliation of stuck segments (spec §4.7).
/// Holds no state of its own beyond its collaborators; every call is
/// idempotent and safe to run concurrently with the orchestrator.
pub struct Recovery {
    episodes: Arc<dyn EpisodeRepository>,
    segments: Arc<dyn SegmentRepository>,
    config: Arc<Config>,
}

impl Recovery {
    pub fn new(
        episodes: Arc<dyn EpisodeRepository>,
        segments: Arc<dyn SegmentRepository>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            episodes,
            segments,
            config,
        }
    }

    /// Runs once at process startup. Any segment left `processing` with a
    /// `started_at` older than `orphan_staleness_seconds` had its owning
    /// worker die without a chance to finalize it — no live process can
    /// still hold it, since a fresh boot implies every prior worker is
    /// gone. Demotes those rows to `failed` (counted against
    /// `retry_count`) and recomputes the owning episode's aggregate
    /// status.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile_orphans_at_boot(&self) -> Result<usize, AppError> {
        let cutoff = Utc::now() - Duration::seconds(self.config.orphan_staleness_seconds);
        let orphans = self.segments.find_orphaned_processing(cutoff).await?;

        let mut affected_episodes = std::collections::BTreeSet::new();
        for segment in &orphans {
            self.segments
                .mark_failed(segment.id, "orphaned at restart")
                .await?;
            affected_episodes.insert(segment.episode_id);
            tracing::warn!(
                segment_id = segment.id,
                episode_id = segment.episode_id,
                "demoted orphaned processing segment to failed"
            );
        }

        for episode_id in affected_episodes {
            let segments = self.segments.list_by_episode(episode_id).await?;
            let status = projector::aggregate_status(&segments);
            self.episodes.set_status(episode_id, status).await?;
        }

        Ok(orphans.len())
    }

    /// On-demand recovery for a single episode: re-dispatches every
    /// `pending` segment and every `failed` segment still under
    /// `max_retries` (spec §4.7). Dispatch and the episode-level
    /// `processing` transition are delegated to `Orchestrator::
    /// start_episode`, which already skips `completed` rows and claims
    /// each segment via its own `mark_processing` — a second concurrent
    /// `RecoverEpisode` call converges on the same outcome rather than
    /// double-submitting, since both calls' workers read the segment
    /// fresh immediately before claiming it.
    #[tracing::instrument(skip(self, orchestrator))]
    pub async fn recover_episode(
        &self,
        episode_id: i64,
        orchestrator: &Orchestrator,
    ) -> Result<EpisodeStatus, AppError> {
        self.episodes
            .find(episode_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("episode {} not found", episode_id)))?;

        let recoverable = self
            .segments
            .find_recoverable(episode_id, self.config.max_retries)
            .await?;

        if recoverable.is_empty() {
            let segments = self.segments.list_by_episode(episode_id).await?;
            let status = projector::aggregate_status(&segments);
            self.episodes.set_status(episode_id, status).await?;
            return Ok(status);
        }

        orchestrator
            .start_episode(episode_id, StartEpisodeOptions::default())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::mock::MockAsrEngine;
    use crate::asr::AsrAdapter;
    use crate::clip::{ClipError, ClipExtractor};
    use crate::models::{AudioSegment, Episode, NewSegment};
    use crate::segment::SegmentWorker;
    use crate::store::CueRepository;
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex as StdMutex;

    struct FakeClipExtractor;

    #[async_trait]
    impl ClipExtractor for FakeClipExtractor {
        async fn extract(&self, source: &Path, start: f64, duration: f64) -> Result<PathBuf, ClipError> {
            Ok(PathBuf::from(format!("/tmp/{}_{:.0}_{:.0}.wav", source.display(), start, duration)))
        }
    }

    #[derive(Default)]
    struct FakeSegmentStore {
        rows: StdMutex<HashMap<i64, AudioSegment>>,
        next_id: AtomicI64,
    }

    impl FakeSegmentStore {
        fn new() -> Self {
            Self {
                rows: StdMutex::new(HashMap::new()),
                next_id: AtomicI64::new(1),
            }
        }

        fn insert(&self, mut segment: AudioSegment) -> i64 {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            segment.id = id;
            self.rows.lock().unwrap().insert(id, segment);
            id
        }
    }

    #[async_trait]
    impl SegmentRepository for FakeSegmentStore {
        async fn list_by_episode(&self, episode_id: i64) -> Result<Vec<AudioSegment>, sqlx::Error> {
            let mut out: Vec<_> = self
                .rows
                .lock()
                .unwrap()
                .values()
                .filter(|s| s.episode_id == episode_id)
                .cloned()
                .collect();
            out.sort_by_key(|s| s.segment_index);
            Ok(out)
        }

        async fn find(&self, id: i64) -> Result<Option<AudioSegment>, sqlx::Error> {
            Ok(self.rows.lock().unwrap().get(&id).cloned())
        }

        async fn find_by_index(&self, episode_id: i64, segment_index: i32) -> Result<Option<AudioSegment>, sqlx::Error> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .values()
                .find(|s| s.episode_id == episode_id && s.segment_index == segment_index)
                .cloned())
        }

        async fn create_all(&self, segments: Vec<NewSegment>) -> Result<(), sqlx::Error> {
            for s in segments {
                self.insert(AudioSegment {
                    id: 0,
                    episode_id: s.episode_id,
                    segment_index: s.segment_index,
                    segment_id: s.segment_id,
                    start_time: s.start_time,
                    end_time: s.end_time,
                    status: "pending".to_string(),
                    retry_count: 0,
                    error_message: None,
                    temp_clip_path: None,
                    started_at: None,
                    recognized_at: None,
                });
            }
            Ok(())
        }

        async fn mark_processing(&self, id: i64, clip_path: Option<&str>) -> Result<AudioSegment, sqlx::Error> {
            let mut rows = self.rows.lock().unwrap();
            let segment = rows.get_mut(&id).expect("segment exists");
            segment.status = "processing".to_string();
            if segment.started_at.is_none() {
                segment.started_at = Some(Utc::now());
            }
            if let Some(p) = clip_path {
                segment.temp_clip_path = Some(p.to_string());
            }
            segment.error_message = None;
            Ok(segment.clone())
        }

        async fn mark_completed(&self, id: i64) -> Result<(), sqlx::Error> {
            let mut rows = self.rows.lock().unwrap();
            let segment = rows.get_mut(&id).expect("segment exists");
            segment.status = "completed".to_string();
            segment.recognized_at = Some(Utc::now());
            segment.temp_clip_path = None;
            Ok(())
        }

        async fn mark_failed(&self, id: i64, error_message: &str) -> Result<(), sqlx::Error> {
            let mut rows = self.rows.lock().unwrap();
            let segment = rows.get_mut(&id).expect("segment exists");
            segment.status = "failed".to_string();
            segment.retry_count += 1;
            segment.error_message = Some(error_message.to_string());
            Ok(())
        }

        async fn mark_cancelled_to_pending(&self, id: i64) -> Result<(), sqlx::Error> {
            let mut rows = self.rows.lock().unwrap();
            rows.get_mut(&id).expect("segment exists").status = "pending".to_string();
            Ok(())
        }

        async fn find_orphaned_processing(&self, older_than: DateTime<Utc>) -> Result<Vec<AudioSegment>, sqlx::Error> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .values()
                .filter(|s| s.status == "processing" && s.started_at.map(|t| t < older_than).unwrap_or(false))
                .cloned()
                .collect())
        }

        async fn find_recoverable(&self, episode_id: i64, max_retries: i32) -> Result<Vec<AudioSegment>, sqlx::Error> {
            let mut out: Vec<_> = self
                .rows
                .lock()
                .unwrap()
                .values()
                .filter(|s| {
                    s.episode_id == episode_id
                        && (s.status == "pending" || (s.status == "failed" && s.retry_count < max_retries))
                })
                .cloned()
                .collect();
            out.sort_by_key(|s| s.segment_index);
            Ok(out)
        }
    }

    #[derive(Default)]
    struct FakeCueStore {
        rows: StdMutex<Vec<crate::models::TranscriptCue>>,
        next_id: AtomicI64,
    }

    #[async_trait]
    impl CueRepository for FakeCueStore {
        async fn replace_segment_cues(
            &self,
            segment: &AudioSegment,
            raw_cues: Vec<crate::models::RawCue>,
        ) -> Result<usize, sqlx::Error> {
            let mut rows = self.rows.lock().unwrap();
            rows.retain(|c| c.segment_id != Some(segment.id));
            let mut inserted = 0;
            for raw in raw_cues {
                let text = raw.text.trim();
                if text.is_empty() {
                    continue;
                }
                rows.push(crate::models::TranscriptCue {
                    id: self.next_id.fetch_add(1, Ordering::SeqCst),
                    episode_id: segment.episode_id,
                    segment_id: Some(segment.id),
                    start_time: segment.start_time + raw.start,
                    end_time: segment.start_time + raw.end,
                    speaker: raw.speaker,
                    text: text.to_string(),
                });
                inserted += 1;
            }
            Ok(inserted)
        }

        async fn count_by_segment(&self, segment_id: i64) -> Result<i64, sqlx::Error> {
            Ok(self.rows.lock().unwrap().iter().filter(|c| c.segment_id == Some(segment_id)).count() as i64)
        }

        async fn range_by_episode(&self, episode_id: i64) -> Result<Vec<crate::models::TranscriptCue>, sqlx::Error> {
            let mut out: Vec<_> = self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.episode_id == episode_id)
                .cloned()
                .collect();
            out.sort_by(|a, b| a.start_time.partial_cmp(&b.start_time).unwrap());
            Ok(out)
        }
    }

    #[derive(Default)]
    struct FakeEpisodeStore {
        rows: StdMutex<HashMap<i64, Episode>>,
    }

    impl FakeEpisodeStore {
        fn new(episode: Episode) -> Self {
            let mut rows = HashMap::new();
            rows.insert(episode.id, episode);
            Self { rows: StdMutex::new(rows) }
        }
    }

    #[async_trait]
    impl EpisodeRepository for FakeEpisodeStore {
        async fn find(&self, id: i64) -> Result<Option<Episode>, sqlx::Error> {
            Ok(self.rows.lock().unwrap().get(&id).cloned())
        }

        async fn set_status(&self, id: i64, status: EpisodeStatus) -> Result<(), sqlx::Error> {
            if let Some(e) = self.rows.lock().unwrap().get_mut(&id) {
                e.transcription_status = status.as_str().to_string();
            }
            Ok(())
        }

        async fn find_by_status(&self, status: EpisodeStatus) -> Result<Vec<Episode>, sqlx::Error> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .values()
                .filter(|e| e.transcription_status == status.as_str())
                .cloned()
                .collect())
        }
    }

    fn test_episode(status: &str) -> Episode {
        Episode {
            id: 1,
            file_hash: "a".repeat(32),
            original_filename: "ep.mp3".to_string(),
            audio_path: "/audio/ep.mp3".to_string(),
            byte_size: 1000,
            duration_seconds: 120.0,
            language: Some("en-US".to_string()),
            transcription_status: status.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn test_config() -> Arc<Config> {
        Arc::new(Config {
            database_url: "postgres://unused".to_string(),
            server_host: "0.0.0.0".to_string(),
            server_port: 8080,
            segment_duration: 60.0,
            max_retries: 3,
            default_language: "en-US".to_string(),
            transcribe_model_name: "base".to_string(),
            audio_storage_path: "/data/audio".to_string(),
            temp_clip_dir: "/data/audio/tmp".to_string(),
            asr_auth_token: None,
            transcribe_speed_factor: 0.4,
            orphan_staleness_seconds: 600,
            clip_sweep_interval_seconds: 600,
            clip_sweep_age_seconds: 1800,
            ffmpeg_timeout_seconds: 30,
            asr_timeout_factor: 10.0,
            worker_pool_size: 4,
        })
    }

    #[tokio::test]
    async fn reconcile_orphans_demotes_stale_processing_rows_and_recomputes_episode() {
        let segments = Arc::new(FakeSegmentStore::new());
        let stale_start = Utc::now() - Duration::seconds(3600);
        segments.insert(AudioSegment {
            id: 0,
            episode_id: 1,
            segment_index: 0,
            segment_id: "segment_000".to_string(),
            start_time: 0.0,
            end_time: 60.0,
            status: "processing".to_string(),
            retry_count: 0,
            error_message: None,
            temp_clip_path: Some("/tmp/leftover.wav".to_string()),
            started_at: Some(stale_start),
            recognized_at: None,
        });
        segments.insert(AudioSegment {
            id: 0,
            episode_id: 1,
            segment_index: 1,
            segment_id: "segment_001".to_string(),
            start_time: 60.0,
            end_time: 120.0,
            status: "completed".to_string(),
            retry_count: 0,
            error_message: None,
            temp_clip_path: None,
            started_at: Some(stale_start),
            recognized_at: Some(Utc::now()),
        });
        let episodes = Arc::new(FakeEpisodeStore::new(test_episode("processing")));

        let recovery = Recovery::new(episodes.clone(), segments.clone(), test_config());
        let count = recovery.reconcile_orphans_at_boot().await.unwrap();

        assert_eq!(count, 1);
        let segment = segments.find_by_index(1, 0).await.unwrap().unwrap();
        assert_eq!(segment.status, "failed");
        assert_eq!(segment.retry_count, 1);
        assert_eq!(segment.error_message.as_deref(), Some("orphaned at restart"));

        let episode = episodes.find(1).await.unwrap().unwrap();
        assert_eq!(episode.transcription_status, "partial_failed");
    }

    #[tokio::test]
    async fn recover_episode_resubmits_pending_and_under_cap_failed_segments() {
        let segments = Arc::new(FakeSegmentStore::new());
        segments.insert(AudioSegment {
            id: 0,
            episode_id: 1,
            segment_index: 0,
            segment_id: "segment_000".to_string(),
            start_time: 0.0,
            end_time: 60.0,
            status: "pending".to_string(),
            retry_count: 0,
            error_message: None,
            temp_clip_path: None,
            started_at: None,
            recognized_at: None,
        });
        let cues = Arc::new(FakeCueStore::default());
        let episodes = Arc::new(FakeEpisodeStore::new(test_episode("failed")));

        let asr_engine = Arc::new(MockAsrEngine::new());
        asr_engine.ensure_loaded().await.unwrap();
        asr_engine
            .script_success(
                "/tmp//audio/ep.mp3_0_60.wav",
                vec![crate::models::RawCue::new(0.0, 1.0, "Unknown", "hi")],
            )
            .await;
        let asr = Arc::new(AsrAdapter::new(asr_engine));
        let clip = Arc::new(FakeClipExtractor);
        let worker = Arc::new(SegmentWorker::new(
            clip,
            asr.clone(),
            segments.clone(),
            cues.clone(),
            episodes.clone(),
            test_config(),
        ));
        let orchestrator = Orchestrator::new(
            episodes.clone(),
            segments.clone(),
            cues,
            asr,
            worker,
            test_config(),
        );

        let recovery = Recovery::new(episodes.clone(), segments.clone(), test_config());
        let status = recovery.recover_episode(1, &orchestrator).await.unwrap();

        assert_eq!(status, EpisodeStatus::Completed);
        let segment = segments.find_by_index(1, 0).await.unwrap().unwrap();
        assert_eq!(segment.status, "completed");
    }
}
