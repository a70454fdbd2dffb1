use std::sync::Arc;

use teloxide::prelude::*;

use super::command_args;
use crate::{access::AccessStore, config::Config, errors::HandlerResult};

/// Handle /grant command - admin only
/// Usage: /grant <user_id> <days>
pub async fn grant(
    bot: Bot,
    msg: Message,
    access: Arc<dyn AccessStore>,
    config: Arc<Config>,
) -> HandlerResult {
    let from_user_id = msg.from.as_ref().map(|u| u.id.0).unwrap_or(0);
    if !config.is_admin(from_user_id) {
        // Silently ignore for non-admins
        return Ok(());
    }

    let args = command_args(msg.text());
    let parsed = match args.as_slice() {
        [user, days] => user.parse::<u64>().ok().zip(days.parse::<i64>().ok()),
        _ => None,
    };
    let Some((target_user_id, days)) = parsed.filter(|(_, days)| *days > 0) else {
        bot.send_message(
            msg.chat.id,
            "Usage: /grant <user_id> <days>\nExample: /grant 578503618 30",
        )
        .await?;
        return Ok(());
    };

    let until = access.extend_access(target_user_id, days).await?;
    let text = format!(
        "Access granted!\n\nUser: {}\nDays: {}\nUntil: {}",
        target_user_id,
        days,
        until.format("%d.%m.%Y %H:%M UTC")
    );
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}
