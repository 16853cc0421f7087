use crate::api::state::AppState;
use crate::error::{AppError, Result};
use crate::models::TranscriptCue;
use crate::orchestrator::StartEpisodeOptions;
use crate::projector::{self, EpisodeView};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

pub fn episode_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/episodes/:id/start", post(start_episode))
        .route("/episodes/:id/recover", post(recover_episode))
        .route("/episodes/:id/status", get(get_status))
        .route("/episodes/:id/cues", get(get_cues))
        .route("/episodes/:id/segments/:index/run", post(run_segment))
}

#[derive(Debug, Deserialize, Default)]
pub struct StartEpisodeRequest {
    #[serde(default)]
    pub enable_diarization: bool,
}

async fn start_episode(
    State(state): State<Arc<AppState>>,
    Path(episode_id): Path<i64>,
    body: Option<Json<StartEpisodeRequest>>,
) -> Result<Json<serde_json::Value>> {
    let opts = body.map(|Json(b)| b).unwrap_or_default();
    let status = state
        .orchestrator
        .start_episode(
            episode_id,
            StartEpisodeOptions {
                enable_diarization: opts.enable_diarization,
            },
        )
        .await?;
    Ok(Json(serde_json::json!({ "status": status.as_str() })))
}

async fn recover_episode(
    State(state): State<Arc<AppState>>,
    Path(episode_id): Path<i64>,
) -> Result<Json<serde_json::Value>> {
    let status = state
        .recovery
        .recover_episode(episode_id, &state.orchestrator)
        .await?;
    Ok(Json(serde_json::json!({ "status": status.as_str() })))
}

async fn run_segment(
    State(state): State<Arc<AppState>>,
    Path((episode_id, segment_index)): Path<(i64, i32)>,
) -> Result<Json<serde_json::Value>> {
    let outcome = state
        .orchestrator
        .run_segment(episode_id, segment_index)
        .await?;
    Ok(Json(serde_json::json!({ "outcome": format!("{:?}", outcome) })))
}

async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(episode_id): Path<i64>,
) -> Result<Json<EpisodeView>> {
    let episode = state
        .episodes
        .find(episode_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("episode {} not found", episode_id)))?;
    let segments = state.segments.list_by_episode(episode_id).await?;
    Ok(Json(projector::project(
        &episode,
        &segments,
        state.config.segment_duration,
        state.config.transcribe_speed_factor,
    )))
}

async fn get_cues(
    State(state): State<Arc<AppState>>,
    Path(episode_id): Path<i64>,
) -> Result<Json<Vec<TranscriptCue>>> {
    let cues = state.cues.range_by_episode(episode_id).await?;
    Ok(Json(cues))
}
