use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    time::Duration,
};

use tokio::fs;

use super::{
    MediaError,
    process::{ensure_tool, run_tool},
};
use crate::temp_file::TempFile;

/// Fixed encoding parameters of a video note.
#[derive(Debug, Clone)]
pub struct TranscodeSettings {
    /// Maximum clip length in seconds.
    pub ceiling_secs: u32,
    /// Side of the square output in pixels.
    pub size: u32,
    pub fade_in_secs: u32,
    pub fade_out_secs: u32,
    /// Passed to ffmpeg as `-fs`.
    pub max_output_bytes: u64,
    pub audio_bitrate: String,
    /// Cover rotation speed in radians per second.
    pub rotation_speed: f32,
    pub frame_rate: u32,
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            ceiling_secs: 60,
            size: 512,
            fade_in_secs: 3,
            fade_out_secs: 3,
            max_output_bytes: 7 * 1024 * 1024,
            audio_bitrate: "128k".to_owned(),
            rotation_speed: 0.5,
            frame_rate: 25,
        }
    }
}

/// One video-note render: a looped square cover spinning over an audio clip.
///
/// `audio` is the trimmed clip, which already starts at `trim_start` of the
/// uploaded track. Rendering `[0, duration)` of the clip therefore covers
/// `[trim_start, trim_start + duration)` of the track.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeJob {
    pub audio: PathBuf,
    pub cover: PathBuf,
    pub trim_start: u32,
    pub duration: u32,
    pub size: u32,
    pub fade_in: u32,
    pub fade_out: u32,
}

impl TranscodeJob {
    /// `clip_secs` is the measured length of the trimmed clip. The render
    /// length is that, rounded up, capped at the ceiling.
    pub fn new(
        audio: impl Into<PathBuf>,
        cover: impl Into<PathBuf>,
        trim_start: u32,
        clip_secs: f64,
        settings: &TranscodeSettings,
    ) -> Result<Self, MediaError> {
        if !clip_secs.is_finite() || clip_secs <= 0.0 {
            return Err(MediaError::Invalid(format!(
                "clip starting at {trim_start}s is empty"
            )));
        }
        let duration = (clip_secs.ceil() as u32).min(settings.ceiling_secs).max(1);

        Ok(Self {
            audio: audio.into(),
            cover: cover.into(),
            trim_start,
            duration,
            size: settings.size,
            fade_in: settings.fade_in_secs.min(duration),
            fade_out: settings.fade_out_secs.min(duration),
        })
    }

    pub fn fade_out_start(&self) -> u32 {
        self.duration - self.fade_out
    }

    pub fn video_filter(&self, rotation_speed: f32) -> String {
        let s = self.size;
        format!(
            "scale={s}:{s}:force_original_aspect_ratio=decrease,\
             pad={s}:{s}:(ow-iw)/2:(oh-ih)/2,\
             rotate={rotation_speed}*t:ow={s}:oh={s},\
             format=yuv420p,\
             fade=t=in:st=0:d={fi},\
             fade=t=out:st={fos}:d={fo}",
            fi = self.fade_in,
            fos = self.fade_out_start(),
            fo = self.fade_out,
        )
    }

    pub fn audio_filter(&self) -> String {
        format!(
            "apad=whole_dur={d},afade=t=in:st=0:d={fi},afade=t=out:st={fos}:d={fo}",
            d = self.duration,
            fi = self.fade_in,
            fos = self.fade_out_start(),
            fo = self.fade_out,
        )
    }
}

/// Builds and runs ffmpeg command lines. One process per call.
#[derive(Debug, Clone)]
pub struct FfmpegInvoker {
    bin: String,
    work_dir: PathBuf,
    settings: TranscodeSettings,
    timeout: Duration,
}

impl FfmpegInvoker {
    pub fn new(
        bin: impl Into<String>,
        work_dir: impl Into<PathBuf>,
        settings: TranscodeSettings,
        timeout: Duration,
    ) -> Self {
        Self {
            bin: bin.into(),
            work_dir: work_dir.into(),
            settings,
            timeout,
        }
    }

    pub fn settings(&self) -> &TranscodeSettings {
        &self.settings
    }

    pub fn build_args(&self, job: &TranscodeJob, output: &Path) -> Vec<OsString> {
        let d = job.duration.to_string();
        let fps = self.settings.frame_rate.to_string();
        let vf = job.video_filter(self.settings.rotation_speed);
        let af = job.audio_filter();
        let max_size = self.settings.max_output_bytes.to_string();

        let mut args = os_args(&["-y", "-hide_banner", "-loglevel", "error"]);
        args.extend(os_args(&["-t", d.as_str(), "-i"]));
        args.push(job.audio.clone().into_os_string());
        args.extend(os_args(&["-loop", "1", "-framerate", fps.as_str(), "-t", d.as_str(), "-i"]));
        args.push(job.cover.clone().into_os_string());
        args.extend(os_args(&["-map", "1:v:0", "-map", "0:a:0"]));
        args.extend(os_args(&["-vf", vf.as_str(), "-af", af.as_str()]));
        args.extend(os_args(&["-c:v", "libx264", "-preset", "medium"]));
        args.extend(os_args(&["-profile:v", "baseline", "-level", "3.0", "-pix_fmt", "yuv420p"]));
        args.extend(os_args(&["-c:a", "aac", "-b:a", self.settings.audio_bitrate.as_str()]));
        args.extend(os_args(&[
            "-t",
            d.as_str(),
            "-fs",
            max_size.as_str(),
            "-movflags",
            "+faststart",
            "-f",
            "mp4",
        ]));
        args.push(output.as_os_str().to_owned());

        args
    }

    /// Renders `job` and returns the whole mp4. The intermediate output file
    /// is removed on every path.
    pub async fn invoke(&self, job: &TranscodeJob) -> Result<Vec<u8>, MediaError> {
        ensure_tool(&self.bin)?;

        if job.duration == 0 {
            return Err(MediaError::Invalid("duration must be positive".into()));
        }
        for input in [&job.audio, &job.cover] {
            if !fs::try_exists(input).await? {
                return Err(MediaError::Invalid(format!(
                    "input {} does not exist",
                    input.display()
                )));
            }
        }

        fs::create_dir_all(&self.work_dir).await?;
        let output = TempFile::new(
            self.work_dir
                .join(format!("video_{}.mp4", uuid::Uuid::new_v4().simple())),
        );

        log::info!(
            "Rendering video note: start={}s duration={}s cover={}",
            job.trim_start,
            job.duration,
            job.cover.display()
        );
        run_tool(&self.bin, self.build_args(job, output.path()), self.timeout).await?;

        let bytes = fs::read(output.path()).await?;
        if bytes.is_empty() {
            return Err(MediaError::Invalid("ffmpeg produced an empty file".into()));
        }
        Ok(bytes)
    }

    pub fn cut_args(&self, source: &Path, start: u32, dest: &Path) -> Vec<OsString> {
        let ss = start.to_string();
        let t = self.settings.ceiling_secs.to_string();

        let mut args = os_args(&["-y", "-hide_banner", "-loglevel", "error", "-ss", ss.as_str(), "-i"]);
        args.push(source.as_os_str().to_owned());
        args.extend(os_args(&["-t", t.as_str(), "-map", "0:a:0", "-c", "copy"]));
        args.push(dest.as_os_str().to_owned());
        args
    }

    /// Cuts `[start, start + ceiling)` out of `source` without re-encoding.
    pub async fn cut_audio(&self, source: &Path, start: u32, dest: &Path) -> Result<(), MediaError> {
        ensure_tool(&self.bin)?;
        run_tool(&self.bin, self.cut_args(source, start, dest), self.timeout).await?;
        Ok(())
    }
}

fn os_args(items: &[&str]) -> Vec<OsString> {
    items.iter().map(OsString::from).collect()
}
