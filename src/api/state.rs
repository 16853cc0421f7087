use crate::asr::AsrAdapter;
use crate::config::Config;
use crate::orchestrator::Orchestrator;
use crate::recovery::Recovery;
use crate::store::{CueRepository, EpisodeRepository, SegmentRepository};
use std::sync::Arc;

/// Shared handles reachable from every request handler. Construction
/// happens once at boot in `main`; everything here is already `Arc`-wrapped
/// so cloning `AppState` out of extractors is cheap.
pub struct AppState {
    pub episodes: Arc<dyn EpisodeRepository>,
    pub segments: Arc<dyn SegmentRepository>,
    pub cues: Arc<dyn CueRepository>,
    pub asr: Arc<AsrAdapter>,
    pub orchestrator: Arc<Orchestrator>,
    pub recovery: Arc<Recovery>,
    pub config: Arc<Config>,
}
