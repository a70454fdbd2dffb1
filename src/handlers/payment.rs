use std::sync::Arc;

use teloxide::prelude::*;

use crate::{
    access::{ACCESS_DAYS, AccessStore, PAYMENT_PAYLOAD_PREFIX},
    errors::HandlerResult,
};

/// Handle pre-checkout query - approve only our own invoices
pub async fn handle_pre_checkout_query(bot: Bot, query: PreCheckoutQuery) -> HandlerResult {
    if query.invoice_payload.starts_with(PAYMENT_PAYLOAD_PREFIX) {
        bot.answer_pre_checkout_query(query.id.clone(), true).await?;
    } else {
        log::warn!("Rejecting unknown payment payload {}", query.invoice_payload);
        bot.answer_pre_checkout_query(query.id.clone(), false)
            .error_message("Unknown payment type")
            .await?;
    }
    Ok(())
}

fn payer_from_payload(payload: &str) -> Option<u64> {
    payload.strip_prefix(PAYMENT_PAYLOAD_PREFIX)?.parse().ok()
}

/// Handle successful payment - extend the paid period
pub async fn handle_successful_payment(
    bot: Bot,
    msg: Message,
    access: Arc<dyn AccessStore>,
) -> HandlerResult {
    let Some(payment) = msg.successful_payment() else {
        return Ok(());
    };
    let Some(user_id) = payer_from_payload(&payment.invoice_payload) else {
        log::error!("Payment with unexpected payload {}", payment.invoice_payload);
        return Ok(());
    };

    match access.extend_access(user_id, ACCESS_DAYS).await {
        Ok(until) => {
            let text = format!(
                "Спасибо за покупку!\n\n\
                Доступ к созданию кружков открыт.\n\
                Действует до: {}",
                until.format("%d.%m.%Y %H:%M UTC")
            );
            bot.send_message(msg.chat.id, text).await?;
        }
        Err(e) => {
            log::error!("Failed to extend access for user {}: {}", user_id, e);
            bot.send_message(
                msg.chat.id,
                "Произошла ошибка при активации доступа. Обратитесь в поддержку.",
            )
            .await?;
        }
    }
    Ok(())
}
