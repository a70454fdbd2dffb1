use std::path::Path;

use async_trait::async_trait;
use teloxide::{
    net::Download,
    prelude::*,
    types::{InlineKeyboardMarkup, InputFile, MessageId, ParseMode},
};

use crate::{
    errors::{BotError, BotResult},
    keyboards::Keyboard,
};

/// The chat operations the session pipeline needs.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Sends an HTML message and returns its id.
    async fn send_text(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> BotResult<MessageId>;

    /// Replaces the text of a sent message; the keyboard is dropped.
    async fn edit_text(&self, chat: ChatId, message: MessageId, text: &str) -> BotResult<()>;

    async fn send_video_note(&self, chat: ChatId, video: Vec<u8>, length: u32) -> BotResult<()>;

    async fn delete_message(&self, chat: ChatId, message: MessageId) -> BotResult<()>;

    /// Saves the platform file `file_id` to `dest`.
    async fn download_file(&self, file_id: &str, dest: &Path) -> BotResult<()>;

    async fn is_channel_member(&self, channel: ChatId, user: UserId) -> BotResult<bool>;

    /// Stops the loading spinner on a pressed inline button.
    async fn answer_action(&self, query: &CallbackQuery) -> BotResult<()>;
}

pub struct TeloxideTransport {
    bot: Bot,
}

impl TeloxideTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChatTransport for TeloxideTransport {
    async fn send_text(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> BotResult<MessageId> {
        let request = self
            .bot
            .send_message(chat, text)
            .parse_mode(ParseMode::Html);
        let sent = match keyboard {
            Some(keyboard) => {
                request
                    .reply_markup(InlineKeyboardMarkup::from(keyboard))
                    .await?
            }
            None => request.await?,
        };
        Ok(sent.id)
    }

    async fn edit_text(&self, chat: ChatId, message: MessageId, text: &str) -> BotResult<()> {
        self.bot
            .edit_message_text(chat, message, text)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }

    async fn send_video_note(&self, chat: ChatId, video: Vec<u8>, length: u32) -> BotResult<()> {
        self.bot
            .send_video_note(chat, InputFile::memory(video))
            .length(length)
            .await?;
        Ok(())
    }

    async fn delete_message(&self, chat: ChatId, message: MessageId) -> BotResult<()> {
        self.bot.delete_message(chat, message).await?;
        Ok(())
    }

    async fn download_file(&self, file_id: &str, dest: &Path) -> BotResult<()> {
        let file = self
            .bot
            .get_file(file_id.to_owned())
            .await
            .map_err(|e| BotError::download_failed(format!("get_file: {e}")))?;

        let mut out = tokio::fs::File::create(dest).await?;
        self.bot
            .download_file(&file.path, &mut out)
            .await
            .map_err(|e| BotError::download_failed(e.to_string()))?;

        log::debug!("Downloaded {} bytes to {}", file.meta.size, dest.display());
        Ok(())
    }

    async fn is_channel_member(&self, channel: ChatId, user: UserId) -> BotResult<bool> {
        let member = self.bot.get_chat_member(channel, user).await?;
        Ok(member.kind.is_present())
    }

    async fn answer_action(&self, query: &CallbackQuery) -> BotResult<()> {
        self.bot.answer_callback_query(query.id.clone()).await?;
        Ok(())
    }
}
