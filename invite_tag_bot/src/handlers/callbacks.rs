use std::sync::Arc;

use bot_commons::teloxide_retry;
use teloxide::{
    prelude::*,
    sugar::request::RequestLinkPreviewExt,
    types::{InlineKeyboardMarkup, ParseMode},
    ApiError, RequestError,
};

use crate::{
    config::Config,
    database::Database,
    interactive::{
        MessageKey, SessionError, Sessions, CONFIRM_NO, CONFIRM_YES, FACE_PREFIX, NEXT_PAGE,
        PREV_PAGE,
    },
    invites::checker::InviteChecker,
};

use super::{search::face_listing, tags::handle_confirmation, Deps, ReportRegistry};

/// What a button press asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Press<'a> {
    Page { forward: bool },
    Face(&'a str),
    Confirm(bool),
}

impl<'a> Press<'a> {
    fn parse(data: &'a str) -> Option<Self> {
        match data {
            PREV_PAGE => Some(Press::Page { forward: false }),
            NEXT_PAGE => Some(Press::Page { forward: true }),
            CONFIRM_YES => Some(Press::Confirm(true)),
            CONFIRM_NO => Some(Press::Confirm(false)),
            _ => data.strip_prefix(FACE_PREFIX).map(Press::Face),
        }
    }
}

fn session_error_text(error: SessionError) -> &'static str {
    match error {
        SessionError::Gone => "These results have expired. Search again!",
        SessionError::NotOwner => "Only whoever searched can use these buttons.",
    }
}

/// Edit a paged message to show its current page.
async fn show_page(
    bot: &Bot,
    key: MessageKey,
    text: String,
    keyboard: InlineKeyboardMarkup,
) -> Result<(), RequestError> {
    match teloxide_retry!(
        bot.edit_message_text(key.0, key.1, &text)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard.clone())
            .disable_link_preview(true)
            .await
    ) {
        Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => Ok(()),
        Err(e) => Err(e),
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn handle_callback_query(
    bot: Bot,
    query: CallbackQuery,
    database: Arc<Database>,
    config: Arc<Config>,
    sessions: Arc<Sessions>,
    checker: Arc<InviteChecker>,
    reports: Arc<ReportRegistry>,
) -> Result<(), RequestError> {
    macro_rules! goodbye {
        ($text:expr) => {
            bot.answer_callback_query(query.id.clone()).text($text).await?;
            return Ok(());
        };
        () => {
            bot.answer_callback_query(query.id.clone()).await?;
            return Ok(());
        };
    }

    let Some(press) = query.data.as_deref().and_then(Press::parse) else {
        goodbye!("Unknown button.");
    };

    let Some(message) = &query.message else {
        // Too old to have been sent this run anyway.
        goodbye!("This message is too old.");
    };
    let key: MessageKey = (message.chat().id, message.id());
    let user = query.from.id;

    let deps = Deps {
        database,
        config,
        sessions,
        checker,
        reports,
    };

    match press {
        Press::Page { forward } => {
            let page = deps
                .sessions
                .with_pages(key, user, |list| {
                    list.turn(forward)
                        .then(|| (list.render(), list.keyboard()))
                })
                .await;
            match page {
                Ok(Some((text, keyboard))) => show_page(&bot, key, text, keyboard).await?,
                Ok(None) => {
                    goodbye!("No more pages that way.");
                }
                Err(e) => {
                    goodbye!(session_error_text(e));
                }
            }
        }
        Press::Face(face) => {
            let (title, entries) = face_listing(&deps.database, face).await;
            if entries.is_empty() {
                goodbye!("No tags with that face.");
            }
            let page = deps
                .sessions
                .with_pages(key, user, |list| {
                    list.replace_entries(title, entries);
                    (list.render(), list.keyboard())
                })
                .await;
            match page {
                Ok((text, keyboard)) => show_page(&bot, key, text, keyboard).await?,
                Err(e) => {
                    goodbye!(session_error_text(e));
                }
            }
        }
        Press::Confirm(confirmed) => {
            if let Some(text) = handle_confirmation(&bot, &deps, key, user, confirmed).await? {
                goodbye!(text);
            }
        }
    }

    goodbye!();
}
