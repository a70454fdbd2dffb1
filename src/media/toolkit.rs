use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;

use super::{
    EmbeddedTags, MediaError, TranscodeJob, TranscodeSettings, cover, probe, tags,
    transcode::FfmpegInvoker,
};

/// Media operations the session pipeline depends on.
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    fn settings(&self) -> &TranscodeSettings;

    /// Cuts the ceiling-sized window starting at `start` out of `source`
    /// into `dest` and returns the clip length in seconds. Zero means the
    /// offset lies past the end of the track.
    async fn cut_audio(&self, source: &Path, start: u32, dest: &Path) -> Result<f64, MediaError>;

    async fn read_tags(&self, audio: &Path) -> EmbeddedTags;

    async fn extract_cover(&self, audio: &Path, dest_base: &Path) -> Option<PathBuf>;

    async fn normalize_cover(&self, image: &Path, dest: &Path) -> Result<PathBuf, MediaError>;

    async fn transcode(&self, job: &TranscodeJob) -> Result<Vec<u8>, MediaError>;
}

/// ffmpeg/ffprobe for process work, `image` and `symphonia` for the rest.
pub struct FfmpegToolkit {
    invoker: FfmpegInvoker,
    ffprobe_bin: String,
    probe_timeout: Duration,
}

impl FfmpegToolkit {
    pub fn new(invoker: FfmpegInvoker, ffprobe_bin: impl Into<String>) -> Self {
        Self {
            invoker,
            ffprobe_bin: ffprobe_bin.into(),
            probe_timeout: Duration::from_secs(30),
        }
    }
}

async fn blocking<T, F>(f: F) -> Result<T, MediaError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| MediaError::Invalid(format!("blocking media task failed: {e}")))
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    fn settings(&self) -> &TranscodeSettings {
        self.invoker.settings()
    }

    async fn cut_audio(&self, source: &Path, start: u32, dest: &Path) -> Result<f64, MediaError> {
        self.invoker.cut_audio(source, start, dest).await?;

        if tokio::fs::metadata(dest).await.map(|m| m.len()).unwrap_or(0) == 0 {
            return Ok(0.0);
        }
        match probe::duration_secs(&self.ffprobe_bin, dest, self.probe_timeout).await {
            Ok(secs) => Ok(secs),
            Err(e @ MediaError::ToolUnavailable(_)) => Err(e),
            Err(e) => {
                log::warn!("Clip {} has no readable duration: {e}", dest.display());
                Ok(0.0)
            }
        }
    }

    async fn read_tags(&self, audio: &Path) -> EmbeddedTags {
        let audio = audio.to_owned();
        blocking(move || tags::read_tags(&audio))
            .await
            .unwrap_or_default()
    }

    async fn extract_cover(&self, audio: &Path, dest_base: &Path) -> Option<PathBuf> {
        let (audio, dest_base) = (audio.to_owned(), dest_base.to_owned());
        blocking(move || cover::extract_embedded_cover(&audio, &dest_base))
            .await
            .ok()
            .flatten()
    }

    async fn normalize_cover(&self, image: &Path, dest: &Path) -> Result<PathBuf, MediaError> {
        let (image, dest) = (image.to_owned(), dest.to_owned());
        let size = self.settings().size;
        blocking(move || cover::normalize_to_square(&image, size, &dest)).await?
    }

    async fn transcode(&self, job: &TranscodeJob) -> Result<Vec<u8>, MediaError> {
        self.invoker.invoke(job).await
    }
}
