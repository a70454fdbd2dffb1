//! Per-user conversational pipeline: audio, trim point, cover, render.

mod event;
mod machine;
mod tracker;

use std::path::{Path, PathBuf};

pub use event::{Event, IncomingFile, parse_callback};
pub use machine::Pipeline;
pub use tracker::EphemeralTracker;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingAudio,
    AwaitingTrimChoice,
    AwaitingCoverChoice,
    AwaitingCustomCover,
    Finalizing,
}

/// Where the cover of the video note comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverSource {
    Embedded(PathBuf),
    Uploaded(PathBuf),
    Default,
}

impl CoverSource {
    pub fn resolve<'a>(&'a self, default: &'a Path) -> &'a Path {
        match self {
            CoverSource::Embedded(path) | CoverSource::Uploaded(path) => path,
            CoverSource::Default => default,
        }
    }
}

/// State of one user's conversation. In memory only.
#[derive(Debug)]
pub struct Session {
    pub state: SessionState,
    /// The file as uploaded.
    pub source_path: Option<PathBuf>,
    /// The audio that gets rendered: the upload, replaced by the clip
    /// once a trim offset is chosen.
    pub audio_path: Option<PathBuf>,
    pub embedded_cover: Option<PathBuf>,
    pub cover: Option<CoverSource>,
    pub trim_start: u32,
    pub clip_secs: f64,
    pub track_label: String,
    pub tracker: EphemeralTracker,
}

impl Session {
    pub fn new(default_cover: &Path) -> Self {
        Self {
            state: SessionState::Idle,
            source_path: None,
            audio_path: None,
            embedded_cover: None,
            cover: None,
            trim_start: 0,
            clip_secs: 0.0,
            track_label: String::new(),
            tracker: EphemeralTracker::new(default_cover),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state != SessionState::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cover_source_resolves_default_last() {
        let default = Path::new("assets/default_cover.jpg");
        let embedded = CoverSource::Embedded("temp/cover_1.png".into());

        assert_eq!(embedded.resolve(default), Path::new("temp/cover_1.png"));
        assert_eq!(CoverSource::Default.resolve(default), default);
    }
}
