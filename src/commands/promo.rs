use std::sync::Arc;

use teloxide::prelude::*;

use super::command_args;
use crate::{access::AccessStore, errors::HandlerResult, utils::display_name};

pub const PROMO_USAGE: &str = "🎟 Отправьте промокод командой:\n/promo КОД";

/// Usage: /promo <CODE>
pub async fn promo(bot: Bot, msg: Message, access: Arc<dyn AccessStore>) -> HandlerResult {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };

    let args = command_args(msg.text());
    let [code] = args.as_slice() else {
        bot.send_message(msg.chat.id, PROMO_USAGE).await?;
        return Ok(());
    };

    access.register(user.id.0, &display_name(user)).await?;
    let outcome = access.redeem_promo(user.id.0, code).await?;
    log::info!("Promo {} for user {}: {:?}", code, user.id.0, outcome);

    bot.send_message(msg.chat.id, outcome.message()).await?;
    Ok(())
}
