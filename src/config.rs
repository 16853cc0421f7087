use std::env;

/// Process-wide tunables. Every magic number from the source system's
/// Design Notes (retry cap, speed factor, segment length) lives here, not
/// sprinkled through the orchestration code.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,

    /// Slice length in seconds for virtual segmentation.
    pub segment_duration: f64,
    /// Cap on `retry_count` before a segment becomes terminally failed.
    pub max_retries: i32,
    /// Language tag used when an episode's language is unset.
    pub default_language: String,
    /// Identifier passed to the ASR Adapter at load time.
    pub transcribe_model_name: String,
    /// Root directory for ingested audio files.
    pub audio_storage_path: String,
    /// Root for segment-clip temp files.
    pub temp_clip_dir: String,
    /// Required credential for diarization model download. Absence is
    /// fatal only at first diarization load, not at process boot, since a
    /// no-diarization deployment has no use for it.
    pub asr_auth_token: Option<String>,

    /// Empirical ratio of wall-clock transcription time to audio duration.
    pub transcribe_speed_factor: f64,
    /// How long a `processing` segment with no owner is tolerated before
    /// Recovery demotes it at boot.
    pub orphan_staleness_seconds: i64,
    /// Cadence of the background orphan-clip sweep.
    pub clip_sweep_interval_seconds: u64,
    /// Minimum age before an orphan clip is eligible for sweep deletion.
    pub clip_sweep_age_seconds: i64,
    /// Wall-clock bound on a single ffmpeg invocation.
    pub ffmpeg_timeout_seconds: u64,
    /// Wall-clock bound on a single ASR call, expressed as a multiple of
    /// the segment's duration.
    pub asr_timeout_factor: f64,
    /// Upper bound on concurrently in-flight segment workers per episode.
    /// The effective parallelism is usually lower, capped by the ASR
    /// serialization mutex (spec §5) -- a larger pool just means more
    /// workers queued on clip extraction at once.
    pub worker_pool_size: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable must be set"))?;

        Ok(Config {
            database_url,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),

            segment_duration: parse_env_or("SEGMENT_DURATION", 180.0),
            max_retries: parse_env_or("MAX_RETRIES", 3),
            default_language: env::var("DEFAULT_LANGUAGE").unwrap_or_else(|_| "en-US".to_string()),
            transcribe_model_name: env::var("TRANSCRIBE_MODEL_NAME")
                .unwrap_or_else(|_| "base".to_string()),
            audio_storage_path: env::var("AUDIO_STORAGE_PATH")
                .unwrap_or_else(|_| "./data/audio".to_string()),
            temp_clip_dir: env::var("TEMP_CLIP_DIR")
                .unwrap_or_else(|_| "./data/audio/tmp_clips".to_string()),
            asr_auth_token: env::var("ASR_AUTH_TOKEN").ok(),

            transcribe_speed_factor: parse_env_or("TRANSCRIBE_SPEED_FACTOR", 0.4),
            orphan_staleness_seconds: parse_env_or("ORPHAN_STALENESS_SECONDS", 600),
            clip_sweep_interval_seconds: parse_env_or("CLIP_SWEEP_INTERVAL_SECONDS", 600),
            clip_sweep_age_seconds: parse_env_or("CLIP_SWEEP_AGE_SECONDS", 1800),
            ffmpeg_timeout_seconds: parse_env_or("FFMPEG_TIMEOUT_SECONDS", 30),
            asr_timeout_factor: parse_env_or("ASR_TIMEOUT_FACTOR", 10.0),
            worker_pool_size: parse_env_or("WORKER_POOL_SIZE", 4),
        })
    }
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
