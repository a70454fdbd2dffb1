use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardMarkup, ParseMode},
};

use crate::{
    access::AccessStore, errors::HandlerResult, session::Pipeline, utils::display_name,
};

const WELCOME: &str = "👋 Привет! Я превращаю трек в <b>кружок</b> с вращающейся обложкой.\n\n\
    Нажмите «Создать кружок», отправьте аудиофайл, выберите момент начала и обложку.";

pub async fn start(
    bot: Bot,
    msg: Message,
    pipeline: Arc<Pipeline>,
    access: Arc<dyn AccessStore>,
) -> HandlerResult {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    pipeline.reset(user.id, msg.chat.id).await;

    let text = if pipeline.refresh_subscription(user.id).await? {
        access.register(user.id.0, &display_name(user)).await?;
        WELCOME.to_owned()
    } else {
        pipeline.denial_text(user.id)
    };

    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(InlineKeyboardMarkup::from(pipeline.main_menu()))
        .await?;
    Ok(())
}
