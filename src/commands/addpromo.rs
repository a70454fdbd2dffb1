use std::sync::Arc;

use teloxide::prelude::*;

use super::command_args;
use crate::{
    access::{AccessStore, NewPromo},
    config::Config,
    errors::HandlerResult,
};

const USAGE: &str = "Usage: /addpromo <CODE> <days> <max_uses> [unlimited]\n\
    Example: /addpromo SUMMER 7 100";

fn parse_promo(args: &[&str]) -> Option<NewPromo> {
    let (code, days, max_uses, rest) = match args {
        [code, days, max_uses, rest @ ..] => (*code, *days, *max_uses, rest),
        _ => return None,
    };
    let unlimited = match rest {
        [] => false,
        ["unlimited"] => true,
        _ => return None,
    };

    Some(NewPromo {
        code: code.to_owned(),
        days: days.parse().ok().filter(|d: &i64| *d >= 0)?,
        max_uses: max_uses.parse().ok().filter(|m: &i64| *m >= 0)?,
        unlimited,
    })
}

/// Handle /addpromo command - admin only
pub async fn addpromo(
    bot: Bot,
    msg: Message,
    access: Arc<dyn AccessStore>,
    config: Arc<Config>,
) -> HandlerResult {
    let from_user_id = msg.from.as_ref().map(|u| u.id.0).unwrap_or(0);
    if !config.is_admin(from_user_id) {
        return Ok(());
    }

    let Some(promo) = parse_promo(&command_args(msg.text())) else {
        bot.send_message(msg.chat.id, USAGE).await?;
        return Ok(());
    };

    let text = if access.add_promo(&promo).await? {
        log::info!("Promo code {} created: {:?}", promo.code, promo);
        format!("Promo code {} created.", promo.code)
    } else {
        format!("Promo code {} already exists.", promo.code)
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}
