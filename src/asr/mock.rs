use super::{AsrEngine, AsrError};
use crate::models::RawCue;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// In-process test/mock engine, compiled in whenever `local-whisper` is
/// off and used throughout the worker/orchestrator unit tests. Results are
/// scripted per clip path so a test can assert exact cue output without a
/// real model.
pub struct MockAsrEngine {
    loaded: AtomicBool,
    diarization_loaded: AtomicBool,
    scripted: Mutex<HashMap<PathBuf, Result<Vec<RawCue>, String>>>,
    default_cues: Vec<RawCue>,
}

impl MockAsrEngine {
    pub fn new() -> Self {
        Self {
            loaded: AtomicBool::new(false),
            diarization_loaded: AtomicBool::new(false),
            scripted: Mutex::new(HashMap::new()),
            default_cues: vec![RawCue::new(0.0, 2.0, "Unknown", "mock transcription")],
        }
    }

    pub async fn script_success(&self, clip_path: impl Into<PathBuf>, cues: Vec<RawCue>) {
        self.scripted.lock().await.insert(clip_path.into(), Ok(cues));
    }

    pub async fn script_failure(&self, clip_path: impl Into<PathBuf>, message: impl Into<String>) {
        self.scripted
            .lock()
            .await
            .insert(clip_path.into(), Err(message.into()));
    }

    pub fn is_diarization_loaded(&self) -> bool {
        self.diarization_loaded.load(Ordering::SeqCst)
    }
}

impl Default for MockAsrEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AsrEngine for MockAsrEngine {
    async fn ensure_loaded(&self) -> Result<(), AsrError> {
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn load_diarization(&self) -> Result<(), AsrError> {
        self.diarization_loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn release_diarization(&self) -> Result<(), AsrError> {
        self.diarization_loaded.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn transcribe(
        &self,
        clip_path: &Path,
        _language_hint: Option<&str>,
        _enable_diarization: bool,
    ) -> Result<Vec<RawCue>, AsrError> {
        if !self.loaded.load(Ordering::SeqCst) {
            return Err(AsrError::NotLoaded);
        }
        let scripted = self.scripted.lock().await;
        match scripted.get(clip_path) {
            Some(Ok(cues)) => Ok(cues.clone()),
            Some(Err(message)) => Err(AsrError::EngineFailed(message.clone())),
            None => Ok(self.default_cues.clone()),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
