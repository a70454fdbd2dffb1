use std::sync::Arc;

use teloxide::prelude::*;

use crate::{
    errors::HandlerResult,
    session::{Event, IncomingFile, Pipeline},
    utils::is_image,
};

/// Turns an uploaded audio, photo or document into a pipeline event.
pub fn incoming_event(msg: &Message) -> Option<Event> {
    if let Some(audio) = msg.audio() {
        return Some(Event::AudioUploaded(IncomingFile {
            file_id: audio.file.id.clone(),
            mime: audio.mime_type.as_ref().map(|m| m.to_string()),
            file_name: audio.file_name.clone(),
            performer: audio.performer.clone(),
            title: audio.title.clone(),
        }));
    }

    if let Some(largest) = msg.photo().and_then(|sizes| sizes.last()) {
        let mut file = IncomingFile::new(largest.file.id.clone());
        file.mime = Some("image/jpeg".to_owned());
        return Some(Event::ImageUploaded(file));
    }

    let document = msg.document()?;
    let mut file = IncomingFile::new(document.file.id.clone());
    file.mime = document.mime_type.as_ref().map(|m| m.to_string());
    file.file_name = document.file_name.clone();
    if is_image(file.mime.as_deref()) {
        Some(Event::ImageUploaded(file))
    } else {
        Some(Event::AudioUploaded(file))
    }
}

pub async fn media_received(msg: Message, event: Event, pipeline: Arc<Pipeline>) -> HandlerResult {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    pipeline.handle(user.id, msg.chat.id, event).await
}
