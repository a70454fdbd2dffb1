use std::sync::Arc;

use teloxide::{prelude::*, types::LabeledPrice};

use crate::{
    access::{ACCESS_DAYS, ACCESS_PRICE_STARS, AccessStore, PAYMENT_PAYLOAD_PREFIX},
    errors::HandlerResult,
    utils::display_name,
};

pub async fn pay(bot: Bot, msg: Message, access: Arc<dyn AccessStore>) -> HandlerResult {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    access.register(user.id.0, &display_name(user)).await?;
    send_access_invoice(&bot, msg.chat.id, user.id).await
}

/// Telegram Stars invoice for one paid period.
pub async fn send_access_invoice(bot: &Bot, chat_id: ChatId, user_id: UserId) -> HandlerResult {
    let payload = format!("{}{}", PAYMENT_PAYLOAD_PREFIX, user_id.0);
    let prices = vec![LabeledPrice::new("Доступ к боту", ACCESS_PRICE_STARS)];

    bot.send_invoice(
        chat_id,
        "Доступ к Winyl",
        format!("Создание кружков без ограничений на {} дней", ACCESS_DAYS),
        payload,
        "XTR", // Telegram Stars currency
        prices,
    )
    .await?;

    log::info!("Invoice sent to user {}", user_id.0);
    Ok(())
}
