use std::sync::Arc;

use teloxide::{prelude::*, types::MaybeInaccessibleMessage};

use crate::{
    access::AccessStore,
    commands::{PROMO_USAGE, send_access_invoice},
    errors::{BotError, HandlerResult},
    keyboards,
    session::{Pipeline, parse_callback},
    transport::ChatTransport,
    utils::display_name,
};

/// Inline button presses: menu actions and pipeline steps.
pub async fn callback_received(
    bot: Bot,
    query: CallbackQuery,
    pipeline: Arc<Pipeline>,
    access: Arc<dyn AccessStore>,
    transport: Arc<dyn ChatTransport>,
) -> HandlerResult {
    transport.answer_action(&query).await?;

    let data = query
        .data
        .as_deref()
        .ok_or_else(|| BotError::general("No callback data"))?;

    let chat_id = match &query.message {
        Some(MaybeInaccessibleMessage::Regular(m)) => m.chat.id,
        Some(MaybeInaccessibleMessage::Inaccessible(m)) => m.chat.id,
        None => return Err(BotError::general("Couldn't find message")),
    };
    let user = &query.from;

    match data {
        keyboards::PROMO => {
            bot.send_message(chat_id, PROMO_USAGE).await?;
        }
        keyboards::BUY_ACCESS => {
            access.register(user.id.0, &display_name(user)).await?;
            send_access_invoice(&bot, chat_id, user.id).await?;
        }
        _ => match parse_callback(data) {
            Some(event) => pipeline.handle(user.id, chat_id, event).await?,
            None => log::warn!("Unknown callback data from user {}: {}", user.id.0, data),
        },
    }
    Ok(())
}
