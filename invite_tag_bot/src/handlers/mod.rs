pub mod callbacks;
pub mod commands;
pub mod invites;
pub mod search;
pub mod tags;

use std::sync::Arc;

use bot_commons::useful_methods::*;
use teloxide::{
    prelude::*,
    types::{Me, User},
    RequestError,
};

use crate::{config::Config, database::Database, interactive::Sessions, invites::checker::InviteChecker};

pub use self::{
    callbacks::handle_callback_query,
    commands::{generate_bot_commands, CommandParams},
    invites::ReportRegistry,
};

/// Everything handlers need besides the bot and the update itself.
#[derive(Clone)]
pub struct Deps {
    pub database: Arc<Database>,
    pub config: Arc<Config>,
    pub sessions: Arc<Sessions>,
    pub checker: Arc<InviteChecker>,
    pub reports: Arc<ReportRegistry>,
}

/// Check if this user may edit tags and run invite reports: either listed
/// in the config, or a member of the control chat.
pub async fn authenticate_privileged(
    bot: &Bot,
    config: &Config,
    user: &User,
) -> Result<bool, RequestError> {
    if config.privileged_users.contains(&user.id) {
        return Ok(true);
    }

    let privileged = match config.control_chat_id {
        Some(control_chat) => bot
            .get_chat_member(control_chat, user.id)
            .await?
            .is_present(),
        None => false,
    };

    if !privileged {
        log::info!(
            "Unprivileged user tried a privileged command: {}",
            crate::misc::user_name_prettyprint(user, true, false)
        );
    }

    Ok(privileged)
}

#[allow(clippy::too_many_arguments)]
pub async fn handle_message(
    bot: Bot,
    me: Me,
    message: Message,
    database: Arc<Database>,
    config: Arc<Config>,
    sessions: Arc<Sessions>,
    checker: Arc<InviteChecker>,
    reports: Arc<ReportRegistry>,
) -> Result<(), RequestError> {
    // Bots, including this one, are ignored.
    if message.from.as_ref().is_some_and(|user| user.is_bot) {
        return Ok(());
    }

    let deps = Deps {
        database,
        config,
        sessions,
        checker,
        reports,
    };

    if let Some(params) = CommandParams::new(&bot, &me, &message, &deps) {
        if let Some(command) = params.make_command() {
            return command.await;
        }
        // Unknown command, or one for another bot.
        return Ok(());
    }

    // "@Our_Bot kawa" in any chat.
    if let Some(query) = message.text_after_mention_of(&me) {
        return search::handle_search(&bot, &message, &deps, query).await;
    }

    // Anything else in private is a search too.
    if message.chat.is_private() {
        if let Some(query) = message.text() {
            return search::handle_search(&bot, &message, &deps, query).await;
        }
    }

    Ok(())
}
