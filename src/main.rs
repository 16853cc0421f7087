mod api;
mod asr;
mod clip;
mod config;
mod error;
mod models;
mod orchestrator;
mod projector;
mod recovery;
mod segment;
mod store;

use crate::api::AppState;
use crate::asr::AsrAdapter;
use crate::clip::FfmpegClipExtractor;
use crate::config::Config;
use crate::orchestrator::Orchestrator;
use crate::recovery::Recovery;
use crate::segment::SegmentWorker;
use crate::store::{PgCueRepository, PgEpisodeRepository, PgSegmentRepository};
use axum::{
    http::{header, Method},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "local-whisper")]
use crate::asr::whisper::WhisperAsrEngine;
#[cfg(not(feature = "local-whisper"))]
use crate::asr::mock::MockAsrEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cuetrack=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env()?);
    tracing::info!("configuration loaded");

    let db = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await?;
    tracing::info!("connected to database");

    sqlx::migrate!("./migrations").run(&db).await?;
    tracing::info!("database migrations completed");

    let episodes: Arc<dyn store::EpisodeRepository> = Arc::new(PgEpisodeRepository::new(db.clone()));
    let segments: Arc<dyn store::SegmentRepository> = Arc::new(PgSegmentRepository::new(db.clone()));
    let cues: Arc<dyn store::CueRepository> = Arc::new(PgCueRepository::new(db.clone()));

    let clip_extractor = Arc::new(FfmpegClipExtractor::new(
        config.temp_clip_dir.clone(),
        config.ffmpeg_timeout_seconds,
    ));

    #[cfg(feature = "local-whisper")]
    let asr_engine: Arc<dyn asr::AsrEngine> =
        Arc::new(WhisperAsrEngine::new(config.transcribe_model_name.clone()));
    #[cfg(not(feature = "local-whisper"))]
    let asr_engine: Arc<dyn asr::AsrEngine> = Arc::new(MockAsrEngine::new());

    asr_engine.ensure_loaded().await.map_err(|e| anyhow::anyhow!(e))?;
    tracing::info!(engine = asr_engine.name(), "ASR engine loaded");

    let asr = Arc::new(AsrAdapter::new(asr_engine));

    let worker = Arc::new(SegmentWorker::new(
        clip_extractor,
        asr.clone(),
        segments.clone(),
        cues.clone(),
        episodes.clone(),
        config.clone(),
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        episodes.clone(),
        segments.clone(),
        cues.clone(),
        asr.clone(),
        worker,
        config.clone(),
    ));

    let recovery = Arc::new(Recovery::new(episodes.clone(), segments.clone(), config.clone()));

    match recovery.reconcile_orphans_at_boot().await {
        Ok(n) if n > 0 => tracing::warn!(count = n, "reconciled orphaned processing segments at boot"),
        Ok(_) => tracing::info!("no orphaned segments found at boot"),
        Err(e) => tracing::error!("orphan reconciliation failed: {}", e),
    }

    spawn_clip_sweep(config.clone());

    let app_state = Arc::new(AppState {
        episodes,
        segments,
        cues,
        asr,
        orchestrator,
        recovery,
        config: config.clone(),
    });

    let app = Router::new()
        .nest("/api/v1", api::episode_routes())
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE]),
        );

    let addr = format!("{}:{}", config.server_host, config.server_port);
    tracing::info!("starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Background sweep for orphaned temp clips: a crash between extraction and
/// `mark_processing` can leave a clip file on disk with no owning row.
/// Runs forever at `clip_sweep_interval_seconds` cadence; failures are
/// logged, never fatal (spec §4.7 "clip sweep").
fn spawn_clip_sweep(config: Arc<Config>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(config.clip_sweep_interval_seconds));
        loop {
            interval.tick().await;
            if let Err(e) = sweep_orphaned_clips(&config).await {
                tracing::warn!("clip sweep pass failed: {}", e);
            }
        }
    });
}

async fn sweep_orphaned_clips(config: &Config) -> anyhow::Result<()> {
    let cutoff = std::time::SystemTime::now() - Duration::from_secs(config.clip_sweep_age_seconds as u64);
    let mut dir = match tokio::fs::read_dir(&config.temp_clip_dir).await {
        Ok(dir) => dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let mut swept = 0u32;
    while let Some(entry) = dir.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        if metadata.modified()? < cutoff {
            if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                tracing::warn!(path = ?entry.path(), "failed to remove stale clip: {}", e);
            } else {
                swept += 1;
            }
        }
    }
    if swept > 0 {
        tracing::debug!(count = swept, "swept stale temp clips");
    }
    Ok(())
}
