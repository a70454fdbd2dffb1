//! Everything that touches audio/image bytes or the external ffmpeg tools.

pub mod cover;
pub mod probe;
pub mod process;
pub mod tags;
pub mod toolkit;
pub mod transcode;

use std::process::ExitStatus;

use thiserror::Error;

pub use tags::EmbeddedTags;
pub use toolkit::{FfmpegToolkit, MediaToolkit};
pub use transcode::{TranscodeJob, TranscodeSettings};

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0} is not installed or not on PATH")]
    ToolUnavailable(String),
    #[error("{tool} exited with {status} - stderr: {stderr}")]
    ToolFailed {
        tool: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("{tool} did not finish within {secs}s")]
    TimedOut { tool: String, secs: u64 },
    #[error("failed to run media tool: {0}")]
    Io(#[from] std::io::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("{0}")]
    Invalid(String),
}
