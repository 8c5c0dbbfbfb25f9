use bot_commons::teloxide_retry;
use html_escape::encode_text;
use teloxide::{
    prelude::*,
    sugar::request::{RequestLinkPreviewExt, RequestReplyExt},
    types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode, UserId},
    RequestError,
};

use crate::{
    interactive::{MessageKey, PendingAction, SessionError, CONFIRM_NO, CONFIRM_YES},
    invites::checker::normalize_invite_link,
};

use super::{
    commands::{CommandParams, Ret},
    Deps,
};

/// `"name, link"` into the name and the normalized link.
fn parse_addtag(params: &str) -> Option<(&str, String)> {
    let (name, link) = params.split_once(',')?;
    let (name, link) = (name.trim(), link.trim());
    if name.is_empty() || link.is_empty() {
        return None;
    }
    Some((name, normalize_invite_link(link)))
}

/// A single link, allowing a stray comma in front of it.
fn parse_link(params: &str) -> Option<String> {
    let link = params.trim().trim_start_matches(',').trim();
    if link.is_empty() || link.contains(char::is_whitespace) {
        return None;
    }
    Some(normalize_invite_link(link))
}

/// Two links, separated by spaces or a comma.
fn parse_replacelink(params: &str) -> Option<(String, String)> {
    let mut links = params
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|link| !link.is_empty());
    let old = links.next()?;
    let new = links.next()?;
    if links.next().is_some() {
        return None;
    }
    Some((normalize_invite_link(old), normalize_invite_link(new)))
}

fn confirmation_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[
        InlineKeyboardButton::callback("✅ Yes", CONFIRM_YES),
        InlineKeyboardButton::callback("❌ No", CONFIRM_NO),
    ]])
}

pub async fn addtag(tp: CommandParams<'_>) -> Ret {
    if tp.privileged_sender().await?.is_none() {
        return Ok(());
    }

    let Some((name, link)) = parse_addtag(tp.get_params()) else {
        return tp
            .reply("Usage: <code>/addtag name, link</code>\nThe link can be a bare invite code.")
            .await;
    };

    let database = &tp.deps.database;
    if let Some(existing) = database.find_tag_by_link(&link).await {
        return tp
            .reply(&format!(
                "ℹ️ That link is already stored as <b>{}</b>.",
                encode_text(&existing.name)
            ))
            .await;
    }

    match database.add_tag(name, link).await {
        Ok(tag) => {
            tp.reply(&format!(
                "✅ Added <b>{}</b>\n{}",
                encode_text(&tag.name),
                encode_text(&tag.link)
            ))
            .await
        }
        Err(e) => {
            log::error!("Failed to save a new tag: {e}");
            tp.reply("Failed to save the tag. Try again later.").await
        }
    }
}

/// Ask the sender to confirm `action` with buttons under `question`.
async fn ask_confirmation(tp: &CommandParams<'_>, question: String, action: PendingAction) -> Ret {
    let Some(user) = tp.sender() else {
        return Ok(());
    };

    let sent = teloxide_retry!(
        tp.bot
            .send_message(tp.chat_id(), &question)
            .parse_mode(ParseMode::Html)
            .reply_markup(confirmation_keyboard())
            .reply_to(tp.message.id)
            .disable_link_preview(true)
            .await
    )?;

    tp.deps
        .sessions
        .insert_confirmation((sent.chat.id, sent.id), user.id, action)
        .await;
    Ok(())
}

pub async fn deltag(tp: CommandParams<'_>) -> Ret {
    if tp.privileged_sender().await?.is_none() {
        return Ok(());
    }

    let Some(link) = parse_link(tp.get_params()) else {
        return tp.reply("Usage: <code>/deltag link</code>").await;
    };

    let Some(tag) = tp.deps.database.find_tag_by_link(&link).await else {
        return tp.reply("❌ No tag has that link.").await;
    };

    let question = format!(
        "Delete this tag?\n\n<b>{}</b>\n{}",
        encode_text(&tag.name),
        encode_text(&tag.link)
    );
    ask_confirmation(&tp, question, PendingAction::DeleteTag { link }).await
}

pub async fn replacelink(tp: CommandParams<'_>) -> Ret {
    if tp.privileged_sender().await?.is_none() {
        return Ok(());
    }

    let Some((old, new)) = parse_replacelink(tp.get_params()) else {
        return tp
            .reply("Usage: <code>/replacelink old_link new_link</code>")
            .await;
    };

    let Some(tag) = tp.deps.database.find_tag_by_link(&old).await else {
        return tp.reply("❌ No tag has that link.").await;
    };

    let question = format!(
        "Replace the link of <b>{}</b>?\n\n{}\n➡️\n{}",
        encode_text(&tag.name),
        encode_text(&old),
        encode_text(&new)
    );
    ask_confirmation(&tp, question, PendingAction::ReplaceLink { old, new }).await
}

/// Carry out or cancel the action waiting on a confirmation message.
///
/// Returns text to show to whoever pressed the button, if the press
/// didn't go anywhere.
pub async fn handle_confirmation(
    bot: &Bot,
    deps: &Deps,
    key: MessageKey,
    user: UserId,
    confirmed: bool,
) -> Result<Option<&'static str>, RequestError> {
    let action = match deps.sessions.take_confirmation(key, user).await {
        Ok(action) => action,
        Err(SessionError::NotOwner) => return Ok(Some("This isn't yours to answer.")),
        Err(SessionError::Gone) => {
            // Drop the dead buttons. Whatever happens, it's expired anyway.
            let _ = bot.edit_message_reply_markup(key.0, key.1).await;
            return Ok(Some("This confirmation has expired."));
        }
    };

    let database = &deps.database;
    let text = match (confirmed, action) {
        (false, _) => "Cancelled.".to_string(),
        (true, PendingAction::DeleteTag { link }) => match database.delete_tag_by_link(&link).await
        {
            Ok(Some(tag)) => format!("🗑️ Deleted <b>{}</b>.", encode_text(&tag.name)),
            Ok(None) => "ℹ️ That tag is already gone.".to_string(),
            Err(e) => {
                log::error!("Failed to delete a tag: {e}");
                "Failed to save the change. Try again later.".to_string()
            }
        },
        (true, PendingAction::ReplaceLink { old, new }) => {
            match database.replace_link(&old, &new).await {
                Ok(Some(tag)) => format!(
                    "✅ <b>{}</b> now links to\n{}",
                    encode_text(&tag.name),
                    encode_text(&tag.link)
                ),
                Ok(None) => "ℹ️ No tag has the old link anymore.".to_string(),
                Err(e) => {
                    log::error!("Failed to replace a link: {e}");
                    "Failed to save the change. Try again later.".to_string()
                }
            }
        }
    };

    teloxide_retry!(
        bot.edit_message_text(key.0, key.1, &text)
            .parse_mode(ParseMode::Html)
            .disable_link_preview(true)
            .await
    )?;

    Ok(None)
}
