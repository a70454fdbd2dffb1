use std::{
    env,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use teloxide::types::ChatId;

use crate::errors::{BotError, BotResult};

const DEFAULT_DATABASE_URL: &str = "sqlite://winyl.db?mode=rwc";
const DEFAULT_WORK_DIR: &str = "temp";
const DEFAULT_COVER: &str = "assets/default_cover.jpg";
const DEFAULT_TRANSCODE_TIMEOUT_SECS: u64 = 180;

/// Runtime configuration, read once from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Channel the user must be a member of. `None` disables the check.
    pub required_channel: Option<ChatId>,
    pub channel_link: Option<String>,
    pub work_dir: PathBuf,
    pub default_cover: PathBuf,
    pub admin_id: Option<u64>,
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    pub transcode_timeout: Duration,
    pub support_url: Option<String>,
}

impl Config {
    pub fn from_env() -> BotResult<Self> {
        Ok(Self {
            database_url: var_or("DATABASE_URL", DEFAULT_DATABASE_URL),
            required_channel: parse_var::<i64>("REQUIRED_CHANNEL")?.map(ChatId),
            channel_link: optional_var("CHANNEL_LINK"),
            work_dir: PathBuf::from(var_or("WORK_DIR", DEFAULT_WORK_DIR)),
            default_cover: PathBuf::from(var_or("DEFAULT_COVER", DEFAULT_COVER)),
            admin_id: parse_var::<u64>("ADMIN_ID")?,
            ffmpeg_bin: var_or("FFMPEG_BIN", "ffmpeg"),
            ffprobe_bin: var_or("FFPROBE_BIN", "ffprobe"),
            transcode_timeout: Duration::from_secs(
                parse_var::<u64>("TRANSCODE_TIMEOUT_SECS")?
                    .unwrap_or(DEFAULT_TRANSCODE_TIMEOUT_SECS),
            ),
            support_url: optional_var("SUPPORT_URL"),
        })
    }

    pub fn is_admin(&self, user_id: u64) -> bool {
        self.admin_id == Some(user_id)
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn var_or(key: &str, default: &str) -> String {
    optional_var(key).unwrap_or_else(|| default.to_owned())
}

fn parse_var<T: FromStr>(key: &str) -> BotResult<Option<T>> {
    match optional_var(key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| BotError::config(format!("{key} has invalid value '{raw}'"))),
        None => Ok(None),
    }
}

/// Makes sure the fallback cover exists. If the asset was never deployed a
/// plain dark square is generated in its place.
pub async fn ensure_default_cover(path: &Path, size: u32) -> BotResult<()> {
    if tokio::fs::try_exists(path).await? {
        return Ok(());
    }

    log::warn!(
        "Default cover not found at {}, generating a plain one",
        path.display()
    );
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let path = path.to_owned();
    tokio::task::spawn_blocking(move || {
        let canvas = image::RgbImage::from_pixel(size, size, image::Rgb([24, 24, 32]));
        canvas.save_with_format(&path, image::ImageFormat::Jpeg)
    })
    .await
    .map_err(|e| BotError::general(format!("Cover generation task failed: {e}")))?
    .map_err(|e| BotError::general(format!("Failed to write default cover: {e}")))?;

    Ok(())
}
