use std::sync::Arc;

use chrono::Utc;
use teloxide::{prelude::*, types::ParseMode};

use crate::{
    access::{AccessRecord, AccessStore},
    errors::HandlerResult,
};

fn describe(record: Option<&AccessRecord>) -> String {
    let Some(record) = record else {
        return "<b>Вы ещё не зарегистрированы</b>\n\nНажмите /start.".to_owned();
    };

    let now = Utc::now();
    let mut lines = vec![if record.has_access(now) {
        "<b>✅ Доступ открыт</b>".to_owned()
    } else {
        "<b>❌ Доступа нет</b>".to_owned()
    }];
    lines.push(String::new());
    if record.unlimited {
        lines.push("♾ Безлимитный доступ".to_owned());
    }
    lines.push(format!(
        "Подписка на канал: {}",
        if record.subscribed { "да" } else { "нет" }
    ));
    match record.free_until {
        Some(until) if until > now => lines.push(format!(
            "Доступ до: {} (осталось дней: {})",
            until.format("%d.%m.%Y %H:%M UTC"),
            (until - now).num_days()
        )),
        Some(until) => lines.push(format!("Доступ истёк: {}", until.format("%d.%m.%Y %H:%M UTC"))),
        None => {}
    }
    lines.join("\n")
}

pub async fn status(bot: Bot, msg: Message, access: Arc<dyn AccessStore>) -> HandlerResult {
    let user_id = msg.from.as_ref().map(|u| u.id.0).unwrap_or(0);
    let record = access.get_access(user_id).await?;

    bot.send_message(msg.chat.id, describe(record.as_ref()))
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn describes_expired_trial() {
        let record = AccessRecord {
            user_id: 1,
            subscribed: false,
            free_until: Some(Utc::now() - Duration::days(2)),
            unlimited: false,
        };
        let text = describe(Some(&record));
        assert!(text.contains("Доступа нет"));
        assert!(text.contains("Доступ истёк"));
    }

    #[test]
    fn describes_unlimited_access() {
        let record = AccessRecord {
            user_id: 1,
            subscribed: false,
            free_until: None,
            unlimited: true,
        };
        assert!(describe(Some(&record)).contains("Безлимитный"));
        assert!(describe(None).contains("/start"));
    }
}
