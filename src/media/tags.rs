use std::{fs::File, path::Path};

use symphonia::core::{
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::{MetadataOptions, MetadataRevision, StandardTagKey, StandardVisualKey},
    probe::Hint,
};

/// Metadata embedded in an audio container (ID3v2 for mp3, Vorbis comments
/// and PICTURE blocks for flac/ogg, `ilst` atoms for m4a).
#[derive(Debug, Default, Clone)]
pub struct EmbeddedTags {
    pub artist: Option<String>,
    pub title: Option<String>,
    /// Raw bytes of the picture tag, front cover preferred. Not validated.
    pub picture: Option<Vec<u8>>,
}

impl EmbeddedTags {
    /// "Artist - Title", or whichever of the two is present.
    pub fn label(&self) -> Option<String> {
        match (&self.artist, &self.title) {
            (Some(artist), Some(title)) => Some(format!("{artist} - {title}")),
            (None, Some(title)) => Some(title.clone()),
            (Some(artist), None) => Some(artist.clone()),
            (None, None) => None,
        }
    }

    fn absorb(&mut self, revision: &MetadataRevision) {
        for tag in revision.tags() {
            let value = tag.value.to_string();
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match tag.std_key {
                Some(StandardTagKey::Artist) if self.artist.is_none() => {
                    self.artist = Some(value.to_owned())
                }
                Some(StandardTagKey::TrackTitle) if self.title.is_none() => {
                    self.title = Some(value.to_owned())
                }
                _ => {}
            }
        }

        if self.picture.is_some() {
            return;
        }
        let visuals = revision.visuals();
        let chosen = visuals
            .iter()
            .find(|v| v.usage == Some(StandardVisualKey::FrontCover))
            .or_else(|| visuals.first());
        if let Some(visual) = chosen {
            if !visual.data.is_empty() {
                self.picture = Some(visual.data.to_vec());
            }
        }
    }
}

/// Reads tags from `path`. Blocking; unreadable or unknown containers
/// yield empty tags.
pub fn read_tags(path: &Path) -> EmbeddedTags {
    let mut tags = EmbeddedTags::default();

    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            log::warn!("Cannot open {} for tag reading: {e}", path.display());
            return tags;
        }
    };
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let mut probed = match symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    ) {
        Ok(p) => p,
        Err(e) => {
            log::debug!("Tag probe failed for {}: {e}", path.display());
            return tags;
        }
    };

    // Tags placed in front of the stream (ID3v2) end up in the probe result,
    // container-native tags in the format reader.
    if let Some(metadata) = probed.metadata.get() {
        if let Some(revision) = metadata.current() {
            tags.absorb(revision);
        }
    }
    if let Some(revision) = probed.format.metadata().current() {
        tags.absorb(revision);
    }

    tags
}
