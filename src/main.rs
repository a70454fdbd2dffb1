mod access;
mod commands;
mod config;
mod errors;
mod handlers;
mod keyboards;
mod media;
mod migrations;
mod schema;
mod session;
mod temp_file;
mod transport;
mod utils;

use std::sync::Arc;

use teloxide::prelude::*;

use crate::{
    access::{AccessStore, SqliteAccessStore},
    config::{Config, ensure_default_cover},
    errors::BotResult,
    media::{
        FfmpegToolkit, MediaToolkit, TranscodeSettings, process::ensure_tool,
        transcode::FfmpegInvoker,
    },
    schema::{public_commands, schema},
    session::Pipeline,
    transport::{ChatTransport, TeloxideTransport},
    utils::clear_dir,
};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    pretty_env_logger::init();
    log::info!("Starting winyl bot...");

    if let Err(e) = run().await {
        log::error!("Bot stopped: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> BotResult<()> {
    let config = Arc::new(Config::from_env()?);
    let settings = TranscodeSettings::default();

    clear_dir(&config.work_dir).await?;
    ensure_default_cover(&config.default_cover, settings.size).await?;

    for tool in [&config.ffmpeg_bin, &config.ffprobe_bin] {
        if let Err(e) = ensure_tool(tool) {
            // the bot still answers; renders fail with a notice until it is installed
            log::error!("{}", e);
        }
    }

    let access: Arc<dyn AccessStore> =
        Arc::new(SqliteAccessStore::connect(&config.database_url).await?);
    log::info!("Access store ready at {}", config.database_url);

    let bot = Bot::from_env();
    if let Err(e) = bot.set_my_commands(public_commands()).await {
        log::warn!("Failed to register bot commands: {}", e);
    }

    let transport: Arc<dyn ChatTransport> = Arc::new(TeloxideTransport::new(bot.clone()));
    let invoker = FfmpegInvoker::new(
        config.ffmpeg_bin.clone(),
        config.work_dir.clone(),
        settings,
        config.transcode_timeout,
    );
    let media: Arc<dyn MediaToolkit> =
        Arc::new(FfmpegToolkit::new(invoker, config.ffprobe_bin.clone()));
    let pipeline = Arc::new(Pipeline::new(
        transport.clone(),
        access.clone(),
        media,
        config.clone(),
    ));

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![pipeline, access, transport, config.clone()])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    clear_dir(&config.work_dir).await?;
    Ok(())
}
