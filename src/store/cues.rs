use crate::models::{AudioSegment, RawCue, TranscriptCue};
use async_trait::async_trait;
use sqlx::PgPool;

#[async_trait]
pub trait CueRepository: Send + Sync {
    /// Atomic per spec §4.3: delete all cues for the segment, translate
    /// and insert the new ones, all within one transaction so a crash
    /// mid-retry never leaves a mixed old/new cue set (invariant 6).
    /// Returns the number of cues actually inserted (after trimming and
    /// dropping empty text).
    async fn replace_segment_cues(
        &self,
        segment: &AudioSegment,
        raw_cues: Vec<RawCue>,
    ) -> Result<usize, sqlx::Error>;

    async fn count_by_segment(&self, segment_id: i64) -> Result<i64, sqlx::Error>;

    async fn range_by_episode(&self, episode_id: i64) -> Result<Vec<TranscriptCue>, sqlx::Error>;
}

pub struct PgCueRepository {
    pool: PgPool,
}

impl PgCueRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CueRepository for PgCueRepository {
    async fn replace_segment_cues(
        &self,
        segment: &AudioSegment,
        raw_cues: Vec<RawCue>,
    ) -> Result<usize, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM transcript_cues WHERE segment_id = $1")
            .bind(segment.id)
            .execute(&mut *tx)
            .await?;

        let mut inserted = 0usize;
        for raw in raw_cues {
            let text = raw.text.trim();
            if text.is_empty() {
                continue;
            }
            let absolute_start = segment.start_time + raw.start;
            let absolute_end = segment.start_time + raw.end;
            if !(absolute_start < absolute_end) {
                continue;
            }

            sqlx::query(
                r#"
                INSERT INTO transcript_cues (episode_id, segment_id, start_time, end_time, speaker, text)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(segment.episode_id)
            .bind(segment.id)
            .bind(absolute_start)
            .bind(absolute_end)
            .bind(&raw.speaker)
            .bind(text)
            .execute(&mut *tx)
            .await?;
            inserted += 1;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn count_by_segment(&self, segment_id: i64) -> Result<i64, sqlx::Error> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM transcript_cues WHERE segment_id = $1")
                .bind(segment_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }

    async fn range_by_episode(&self, episode_id: i64) -> Result<Vec<TranscriptCue>, sqlx::Error> {
        sqlx::query_as::<_, TranscriptCue>(
            r#"
            SELECT id, episode_id, segment_id, start_time, end_time, speaker, text
            FROM transcript_cues
            WHERE episode_id = $1
            ORDER BY start_time ASC
            "#,
        )
        .bind(episode_id)
        .fetch_all(&self.pool)
        .await
    }
}
