use teloxide::{
    dispatching::UpdateHandler, prelude::*, types::BotCommand, utils::command::BotCommands,
};

use crate::{
    commands::*,
    errors::BotError,
    handlers::{
        callback_received, handle_pre_checkout_query, handle_successful_payment, incoming_event,
        media_received,
    },
};

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
pub enum Command {
    /// Главное меню
    Start,
    /// Отменить создание кружка
    Cancel,
    /// Купить доступ
    Pay,
    /// Активировать промокод: /promo КОД
    Promo,
    /// Статус доступа
    Status,
    /// Выдать доступ (админ)
    Grant,
    /// Создать промокод (админ)
    Addpromo,
}

/// Commands shown in the client menu. Admin commands are left out.
pub fn public_commands() -> Vec<BotCommand> {
    Command::bot_commands()
        .into_iter()
        .filter(|c| !matches!(c.command.as_str(), "/grant" | "/addpromo" | "grant" | "addpromo"))
        .collect()
}

pub fn schema() -> UpdateHandler<BotError> {
    use dptree::case;

    let commands = teloxide::filter_command::<Command, _>()
        .branch(case![Command::Start].endpoint(start))
        .branch(case![Command::Cancel].endpoint(cancel))
        .branch(case![Command::Pay].endpoint(pay))
        .branch(case![Command::Promo].endpoint(promo))
        .branch(case![Command::Status].endpoint(status))
        .branch(case![Command::Grant].endpoint(grant))
        .branch(case![Command::Addpromo].endpoint(addpromo));

    dptree::entry()
        .branch(
            // Filter for messages
            Update::filter_message()
                .branch(commands)
                .branch(Message::filter_successful_payment().endpoint(handle_successful_payment))
                .branch(
                    dptree::filter_map(|msg: Message| incoming_event(&msg)).endpoint(media_received),
                ),
        )
        .branch(Update::filter_callback_query().endpoint(callback_received))
        .branch(Update::filter_pre_checkout_query().endpoint(handle_pre_checkout_query))
}
