use std::path::Path;

use teloxide::types::User;

use crate::errors::BotResult;

pub const ACCEPTED_AUDIO_MIME: &[&str] = &[
    "audio/mpeg",
    "audio/mp3",
    "audio/flac",
    "audio/x-flac",
    "audio/mp4",
    "audio/x-m4a",
    "audio/m4a",
    "audio/aac",
    "audio/ogg",
];

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "m4a", "mp4", "aac", "ogg", "oga"];

fn extension_of(file_name: Option<&str>) -> Option<String> {
    file_name
        .and_then(|name| Path::new(name).extension())
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

fn normalized_mime(mime: Option<&str>) -> Option<String> {
    mime.map(|m| {
        m.split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase()
    })
    .filter(|m| !m.is_empty())
}

/// MIME type wins when the platform sent one; otherwise the file name
/// extension decides.
pub fn is_accepted_audio(mime: Option<&str>, file_name: Option<&str>) -> bool {
    match normalized_mime(mime) {
        Some(mime) => ACCEPTED_AUDIO_MIME.contains(&mime.as_str()),
        None => extension_of(file_name).is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str())),
    }
}

/// Extension for the saved upload. Keeps the container recognizable for the
/// stream-copy cut.
pub fn audio_extension(mime: Option<&str>, file_name: Option<&str>) -> String {
    if let Some(ext) = extension_of(file_name).filter(|e| AUDIO_EXTENSIONS.contains(&e.as_str())) {
        return ext;
    }
    let ext = match normalized_mime(mime).as_deref() {
        Some("audio/flac" | "audio/x-flac") => "flac",
        Some("audio/mp4" | "audio/x-m4a" | "audio/m4a") => "m4a",
        Some("audio/aac") => "aac",
        Some("audio/ogg") => "ogg",
        _ => "mp3",
    };
    ext.to_owned()
}

pub fn is_image(mime: Option<&str>) -> bool {
    normalized_mime(mime).is_some_and(|m| m.starts_with("image/"))
}

pub fn image_extension(mime: Option<&str>) -> &'static str {
    match normalized_mime(mime).as_deref() {
        Some("image/png") => "png",
        Some("image/webp") => "webp",
        Some("image/gif") => "gif",
        Some("image/bmp") => "bmp",
        _ => "jpg",
    }
}

/// `<prefix>_<user>_<8 hex chars>.<ext>`
pub fn unique_file_name(prefix: &str, user_id: u64, ext: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}_{user_id}_{}.{ext}", &id[..8])
}

pub fn display_name(user: &User) -> String {
    user.username
        .clone()
        .unwrap_or_else(|| user.full_name())
}

/// Creates `dir` and deletes the files left in it by a previous run.
pub async fn clear_dir(dir: &Path) -> BotResult<()> {
    tokio::fs::create_dir_all(dir).await?;

    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => log::warn!("Failed to remove file {:?}: {}", entry.path(), e),
            }
        }
    }
    if removed > 0 {
        log::info!("Removed {} leftover files from {}", removed, dir.display());
    }
    Ok(())
}
