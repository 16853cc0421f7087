use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

#[derive(Debug, thiserror::Error)]
pub enum ClipError {
    #[error("ffmpeg binary not found on PATH")]
    ToolMissing,

    #[error("source audio file vanished: {0}")]
    SourceMissing(PathBuf),

    #[error("ffmpeg exited with status {status}: {stderr}")]
    ToolFailed { status: String, stderr: String },

    #[error("clip extraction timed out after {0:?}")]
    TimedOut(Duration),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Produces a 16 kHz mono PCM WAV slice of a source audio file, bit-exact
/// per spec: compressed containers can only be cut at keyframes, so every
/// clip is re-encoded, never stream-copied.
#[async_trait]
pub trait ClipExtractor: Send + Sync {
    async fn extract(
        &self,
        source: &Path,
        start_seconds: f64,
        duration_seconds: f64,
    ) -> Result<PathBuf, ClipError>;
}

/// Invokes the system `ffmpeg` binary as a sub-process. The output
/// filename encodes `(start, duration, source_stem)` for operator
/// debugging only — callers must treat `AudioSegment.temp_clip_path` as
/// the sole authoritative pointer, per spec §4.1.
pub struct FfmpegClipExtractor {
    output_dir: PathBuf,
    timeout: Duration,
}

impl FfmpegClipExtractor {
    pub fn new(output_dir: impl Into<PathBuf>, timeout_seconds: u64) -> Self {
        Self {
            output_dir: output_dir.into(),
            timeout: Duration::from_secs(timeout_seconds),
        }
    }

    fn output_path(&self, source: &Path, start: f64, duration: f64) -> PathBuf {
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("clip");
        self.output_dir
            .join(format!("segment_{:.2}_{:.2}_{}.wav", start, duration, stem))
    }
}

#[async_trait]
impl ClipExtractor for FfmpegClipExtractor {
    async fn extract(
        &self,
        source: &Path,
        start_seconds: f64,
        duration_seconds: f64,
    ) -> Result<PathBuf, ClipError> {
        if !source.exists() {
            return Err(ClipError::SourceMissing(source.to_path_buf()));
        }

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let output = self.output_path(source, start_seconds, duration_seconds);

        let mut command = Command::new("ffmpeg");
        command
            .arg("-y")
            .arg("-i")
            .arg(source)
            .arg("-ss")
            .arg(start_seconds.to_string())
            .arg("-t")
            .arg(duration_seconds.to_string())
            .arg("-ar")
            .arg("16000")
            .arg("-ac")
            .arg("1")
            .arg("-c:a")
            .arg("pcm_s16le")
            .arg(&output);

        let run = async {
            command
                .output()
                .await
                .map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        ClipError::ToolMissing
                    } else {
                        ClipError::Io(e)
                    }
                })
        };

        let result = timeout(self.timeout, run)
            .await
            .map_err(|_| ClipError::TimedOut(self.timeout))??;

        if !result.status.success() {
            return Err(ClipError::ToolFailed {
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).into_owned(),
            });
        }

        Ok(output)
    }
}
