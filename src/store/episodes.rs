use crate::models::{Episode, EpisodeStatus};
use async_trait::async_trait;
use sqlx::PgPool;

#[async_trait]
pub trait EpisodeRepository: Send + Sync {
    async fn find(&self, id: i64) -> Result<Option<Episode>, sqlx::Error>;
    async fn set_status(&self, id: i64, status: EpisodeStatus) -> Result<(), sqlx::Error>;
    async fn find_by_status(&self, status: EpisodeStatus) -> Result<Vec<Episode>, sqlx::Error>;
}

pub struct PgEpisodeRepository {
    pool: PgPool,
}

impl PgEpisodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EpisodeRepository for PgEpisodeRepository {
    async fn find(&self, id: i64) -> Result<Option<Episode>, sqlx::Error> {
        sqlx::query_as::<_, Episode>(
            r#"
            SELECT id, file_hash, original_filename, audio_path, byte_size,
                   duration_seconds, language, transcription_status,
                   created_at, updated_at
            FROM episodes
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn set_status(&self, id: i64, status: EpisodeStatus) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE episodes SET transcription_status = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(status.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_status(&self, status: EpisodeStatus) -> Result<Vec<Episode>, sqlx::Error> {
        sqlx::query_as::<_, Episode>(
            r#"
            SELECT id, file_hash, original_filename, audio_path, byte_size,
                   duration_seconds, language, transcription_status,
                   created_at, updated_at
            FROM episodes
            WHERE transcription_status = $1
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
    }
}
