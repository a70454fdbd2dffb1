use crate::keyboards::{self, CoverChoice, TRIM_OFFSETS, TRIM_PREFIX};

/// A file the user sent, with whatever the platform told us about it.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingFile {
    pub file_id: String,
    pub mime: Option<String>,
    pub file_name: Option<String>,
    pub performer: Option<String>,
    pub title: Option<String>,
}

impl IncomingFile {
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            mime: None,
            file_name: None,
            performer: None,
            title: None,
        }
    }

    /// "Performer - Title" from the platform's audio metadata.
    pub fn platform_label(&self) -> Option<String> {
        let clean = |s: &Option<String>| {
            s.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        };
        match (clean(&self.performer), clean(&self.title)) {
            (Some(p), Some(t)) => Some(format!("{p} - {t}")),
            (None, Some(t)) => Some(t),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Start,
    AudioUploaded(IncomingFile),
    TrimChosen(u32),
    CoverChosen(CoverChoice),
    ImageUploaded(IncomingFile),
    BackToCover,
    Cancel,
}

/// Maps a pipeline button tag to its event. Other tags yield `None`.
pub fn parse_callback(data: &str) -> Option<Event> {
    match data {
        keyboards::CREATE_CIRCLE => return Some(Event::Start),
        keyboards::COVER_BACK => return Some(Event::BackToCover),
        keyboards::CANCEL => return Some(Event::Cancel),
        _ => {}
    }

    if let Some(secs) = data.strip_prefix(TRIM_PREFIX) {
        return secs
            .parse::<u32>()
            .ok()
            .filter(|secs| TRIM_OFFSETS.contains(secs))
            .map(Event::TrimChosen);
    }

    CoverChoice::from_tag(data).map(Event::CoverChosen)
}
