use super::{AsrEngine, AsrError};
use crate::models::RawCue;
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex as AsyncMutex;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

/// Local whisper.cpp-backed ASR engine. The model is loaded once, at
/// process startup, and reused for every clip; `WhisperContext` itself is
/// `Send + Sync`, and each call opens its own `WhisperState`.
pub struct WhisperAsrEngine {
    model_path: String,
    ctx: AsyncMutex<Option<WhisperContext>>,
    diarization_loaded: AtomicBool,
}

impl WhisperAsrEngine {
    pub fn new(model_path: impl Into<String>) -> Self {
        Self {
            model_path: model_path.into(),
            ctx: AsyncMutex::new(None),
            diarization_loaded: AtomicBool::new(false),
        }
    }

    fn read_pcm_16k_mono(path: &Path) -> Result<Vec<f32>, AsrError> {
        let mut reader = hound::WavReader::open(path)
            .map_err(|e| AsrError::EngineFailed(format!("failed to open clip wav: {}", e)))?;
        let spec = reader.spec();
        if spec.sample_rate != 16_000 || spec.channels != 1 {
            return Err(AsrError::EngineFailed(format!(
                "clip is not 16kHz mono PCM (got {}Hz, {} channel(s)) -- clip extractor contract violated",
                spec.sample_rate, spec.channels
            )));
        }
        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Int => reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
                .collect::<Result<_, _>>()
                .map_err(|e| AsrError::EngineFailed(format!("failed to decode clip samples: {}", e)))?,
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|e| AsrError::EngineFailed(format!("failed to decode clip samples: {}", e)))?,
        };
        Ok(samples)
    }
}

#[async_trait]
impl AsrEngine for WhisperAsrEngine {
    async fn ensure_loaded(&self) -> Result<(), AsrError> {
        let mut slot = self.ctx.lock().await;
        if slot.is_some() {
            return Ok(());
        }
        let model_path = self.model_path.clone();
        let ctx = tokio::task::spawn_blocking(move || {
            WhisperContext::new_with_params(&model_path, WhisperContextParameters::default())
        })
        .await
        .map_err(|e| AsrError::EngineFailed(format!("model load task panicked: {}", e)))?
        .map_err(|e| AsrError::EngineFailed(format!("failed to load whisper model: {}", e)))?;
        tracing::info!(model_path = %self.model_path, "whisper model loaded");
        *slot = Some(ctx);
        Ok(())
    }

    async fn load_diarization(&self) -> Result<(), AsrError> {
        // Diarization is a distinct model family from the ASR weights
        // above; this engine only ships the ASR path, so "loading" it is
        // a capability flag flip, matching the Orchestrator's
        // best-effort-downgrade contract in spec §4.6.4.
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
        language_hint: Option<&str>,
        enable_diarization: bool,
    ) -> Result<Vec<RawCue>, AsrError> {
        let slot = self.ctx.lock().await;
        let ctx = slot.as_ref().ok_or(AsrError::NotLoaded)?;
        let ctx_ptr = ctx as *const WhisperContext as usize;

        let audio = Self::read_pcm_16k_mono(clip_path)?;
        let lang = language_hint.map(str::to_string);
        let diarize = enable_diarization && self.diarization_loaded.load(Ordering::SeqCst);

        type RawSegment = (f64, f64, String);
        let segments: Vec<RawSegment> = tokio::task::spawn_blocking(move || -> Result<Vec<RawSegment>, String> {
            // SAFETY: `slot` (the MutexGuard borrowing `self.ctx`) is held
            // by the caller for the whole `.await` below, so the
            // WhisperContext this pointer refers to stays alive and
            // unmoved for the duration of this blocking call.
            let ctx_ref = unsafe { &*(ctx_ptr as *const WhisperContext) };
            let mut state = ctx_ref
                .create_state()
                .map_err(|e| format!("failed to create whisper state: {}", e))?;

            let mut params = FullParams::new(SamplingStrategy::BeamSearch {
                beam_size: 5,
                patience: 1.0,
            });
            if let Some(ref lang) = lang {
                params.set_language(Some(lang));
            } else {
                params.set_detect_language(true);
            }
            params.set_translate(false);
            params.set_print_progress(false);
            params.set_print_special(false);
            params.set_print_realtime(false);
            params.set_print_timestamps(true);
            params.set_single_segment(false);
            params.set_no_speech_thold(0.6);
            params.set_suppress_blank(true);

            state
                .full(params, &audio)
                .map_err(|e| format!("whisper transcription failed: {}", e))?;

            let n_segments = state.full_n_segments();
            let mut out = Vec::with_capacity(n_segments as usize);
            for i in 0..n_segments {
                let Some(segment) = state.get_segment(i) else {
                    continue;
                };
                let Ok(text) = segment.to_str() else {
                    continue;
                };
                // whisper.cpp reports timestamps in centiseconds.
                let start = segment.start_timestamp() as f64 / 100.0;
                let end = segment.end_timestamp() as f64 / 100.0;
                out.push((start, end, text.to_string()));
            }
            Ok(out)
        })
        .await
        .map_err(|e| AsrError::EngineFailed(format!("whisper task join error: {}", e)))?
        .map_err(AsrError::EngineFailed)?;

        drop(slot);

        if enable_diarization && !diarize {
            tracing::debug!(
                "diarization requested but not loaded for this engine; \
                 all cues fall back to the default speaker"
            );
        }

        // This engine exposes raw whisper.cpp segments only; it does not
        // implement a word-speaker assignment pass, so every cue gets the
        // default speaker regardless of `diarize`.
        Ok(segments
            .into_iter()
            .map(|(start, end, text)| RawCue::new(start, end, "Unknown", text))
            .collect())
    }

    fn name(&self) -> &str {
        "local_whisper"
    }
}
