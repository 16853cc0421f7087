use crate::models::{AudioSegment, NewSegment};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

#[async_trait]
pub trait SegmentRepository: Send + Sync {
    async fn list_by_episode(&self, episode_id: i64) -> Result<Vec<AudioSegment>, sqlx::Error>;
    async fn find(&self, id: i64) -> Result<Option<AudioSegment>, sqlx::Error>;
    async fn find_by_index(
        &self,
        episode_id: i64,
        segment_index: i32,
    ) -> Result<Option<AudioSegment>, sqlx::Error>;

    /// Idempotent: relies on the `(episode_id, segment_index)` unique
    /// constraint so concurrent callers never produce duplicate rows. The
    /// caller is expected to check `list_by_episode` first per spec
    /// §4.6.2 ("if any segment exists for the episode, reuse as-is").
    async fn create_all(&self, segments: Vec<NewSegment>) -> Result<(), sqlx::Error>;

    /// pending|failed → processing. Sets `started_at` only if it was null
    /// (earliest-wins monotonicity, invariant 4) and clears
    /// `error_message`. `clip_path` is set only when a fresh extraction
    /// happened; pass `None` to reuse the existing `temp_clip_path`.
    async fn mark_processing(
        &self,
        id: i64,
        clip_path: Option<&str>,
    ) -> Result<AudioSegment, sqlx::Error>;

    /// processing → completed. Clears `temp_clip_path` and
    /// `error_message`, stamps `recognized_at`.
    async fn mark_completed(&self, id: i64) -> Result<(), sqlx::Error>;

    /// processing → failed. Increments `retry_count`, records the error,
    /// retains `temp_clip_path` for replay.
    async fn mark_failed(&self, id: i64, error_message: &str) -> Result<(), sqlx::Error>;

    /// processing → pending (cooperative cancellation). Leaves
    /// `temp_clip_path`, `started_at`, `retry_count` untouched.
    async fn mark_cancelled_to_pending(&self, id: i64) -> Result<(), sqlx::Error>;

    /// `processing` rows whose `started_at` predates `older_than` — no
    /// active worker could still own them (spec §4.7).
    async fn find_orphaned_processing(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<AudioSegment>, sqlx::Error>;

    /// `pending` ∪ `{failed, retry_count < max_retries}` for one episode,
    /// ordered by `segment_index` (spec §4.7 `RecoverEpisode`).
    async fn find_recoverable(
        &self,
        episode_id: i64,
        max_retries: i32,
    ) -> Result<Vec<AudioSegment>, sqlx::Error>;
}

pub struct PgSegmentRepository {
    pool: PgPool,
}

impl PgSegmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SELECT_COLUMNS: &str = r#"
    id, episode_id, segment_index, segment_id, start_time, end_time,
    status, retry_count, error_message, temp_clip_path, started_at, recognized_at
"#;

#[async_trait]
impl SegmentRepository for PgSegmentRepository {
    async fn list_by_episode(&self, episode_id: i64) -> Result<Vec<AudioSegment>, sqlx::Error> {
        sqlx::query_as::<_, AudioSegment>(&format!(
            "SELECT {SELECT_COLUMNS} FROM audio_segments WHERE episode_id = $1 ORDER BY segment_index ASC"
        ))
        .bind(episode_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn find(&self, id: i64) -> Result<Option<AudioSegment>, sqlx::Error> {
        sqlx::query_as::<_, AudioSegment>(&format!(
            "SELECT {SELECT_COLUMNS} FROM audio_segments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_by_index(
        &self,
        episode_id: i64,
        segment_index: i32,
    ) -> Result<Option<AudioSegment>, sqlx::Error> {
        sqlx::query_as::<_, AudioSegment>(&format!(
            "SELECT {SELECT_COLUMNS} FROM audio_segments WHERE episode_id = $1 AND segment_index = $2"
        ))
        .bind(episode_id)
        .bind(segment_index)
        .fetch_optional(&self.pool)
        .await
    }

    async fn create_all(&self, segments: Vec<NewSegment>) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for segment in segments {
            sqlx::query(
                r#"
                INSERT INTO audio_segments
                    (episode_id, segment_index, segment_id, start_time, end_time,
                     status, retry_count, error_message, temp_clip_path, started_at, recognized_at)
                VALUES ($1, $2, $3, $4, $5, 'pending', 0, NULL, NULL, NULL, NULL)
                ON CONFLICT (episode_id, segment_index) DO NOTHING
                "#,
            )
            .bind(segment.episode_id)
            .bind(segment.segment_index)
            .bind(&segment.segment_id)
            .bind(segment.start_time)
            .bind(segment.end_time)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await
    }

    async fn mark_processing(
        &self,
        id: i64,
        clip_path: Option<&str>,
    ) -> Result<AudioSegment, sqlx::Error> {
        sqlx::query_as::<_, AudioSegment>(&format!(
            r#"
            UPDATE audio_segments
            SET status = 'processing',
                started_at = COALESCE(started_at, NOW()),
                temp_clip_path = COALESCE($2, temp_clip_path),
                error_message = NULL
            WHERE id = $1
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(clip_path)
        .fetch_one(&self.pool)
        .await
    }

    async fn mark_completed(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE audio_segments
            SET status = 'completed',
                recognized_at = NOW(),
                temp_clip_path = NULL,
                error_message = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: i64, error_message: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE audio_segments
            SET status = 'failed',
                retry_count = retry_count + 1,
                error_message = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_cancelled_to_pending(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE audio_segments SET status = 'pending' WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_orphaned_processing(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<AudioSegment>, sqlx::Error> {
        sqlx::query_as::<_, AudioSegment>(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM audio_segments
            WHERE status = 'processing' AND started_at < $1
            ORDER BY episode_id, segment_index
            "#
        ))
        .bind(older_than)
        .fetch_all(&self.pool)
        .await
    }

    async fn find_recoverable(
        &self,
        episode_id: i64,
        max_retries: i32,
    ) -> Result<Vec<AudioSegment>, sqlx::Error> {
        sqlx::query_as::<_, AudioSegment>(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM audio_segments
            WHERE episode_id = $1
              AND (status = 'pending' OR (status = 'failed' AND retry_count < $2))
            ORDER BY segment_index ASC
            "#
        ))
        .bind(episode_id)
        .bind(max_retries)
        .fetch_all(&self.pool)
        .await
    }
}
