use std::{borrow::Cow, fmt::Write};

use bot_commons::{teloxide_retry, useful_methods::*};
use html_escape::encode_text;
use teloxide::{
    prelude::*,
    sugar::request::{RequestLinkPreviewExt, RequestReplyExt},
    types::ParseMode,
    ApiError, RequestError,
};

use crate::{
    database::Database,
    interactive::{Entry, PagedList},
    search::{self, SearchOutcome},
    types::{Language, Tag, TagRef, TagSource},
};

use super::{
    commands::{CommandParams, Ret, SEARCH_TIPS},
    Deps,
};

const SEARCH_PAGE_SIZE: usize = 5;
const FUZZY_PAGE_SIZE: usize = 3;
const LANGUAGE_PAGE_SIZE: usize = 5;
const SYMBOLS_PAGE_SIZE: usize = 6;

/// How many face filter buttons the symbols listing gets.
const FACE_BUTTONS: usize = 6;

/// How many queries the log chat leaderboard shows.
const LEADERBOARD_SHOWN: usize = 50;

/// Longest tag name or link shown in a listing, in UTF-16 units as Telegram
/// counts them. Keeps a full page of the largest size under the message
/// length limit.
const MAX_FIELD_LEN: usize = 250;

/// Longest query echoed back in a listing title.
const MAX_QUERY_LEN: usize = 200;

/// Cut `text` down to `max` UTF-16 units, marking the cut with an ellipsis.
fn shorten(text: &str, max: usize) -> Cow<'_, str> {
    if text.encode_utf16().count() <= max {
        return Cow::Borrowed(text);
    }

    let mut len = 0;
    let end = text
        .char_indices()
        .find(|(_, c)| {
            len += c.len_utf16();
            len > max - 1
        })
        .map_or(text.len(), |(i, _)| i);

    Cow::Owned(format!("{}…", &text[..end]))
}

fn section_of(source: TagSource) -> &'static str {
    match source {
        TagSource::Fonted => "Results from Fonted.json:",
        TagSource::Db => "Results from DBTag.json:",
    }
}

fn entry_of(tag: TagRef) -> Entry {
    Entry {
        section: Some(section_of(tag.source)),
        text: format!(
            "<b>{}</b>\n{}",
            encode_text(&shorten(tag.name, MAX_FIELD_LEN)),
            encode_text(&shorten(tag.link, MAX_FIELD_LEN))
        ),
    }
}

fn entries_of<'a>(tags: impl IntoIterator<Item = TagRef<'a>>) -> Vec<Entry> {
    tags.into_iter().map(entry_of).collect()
}

/// Send the first page of a list, and remember it so its buttons work.
async fn send_paged(bot: &Bot, message: &Message, deps: &Deps, list: PagedList) -> Ret {
    let sent = teloxide_retry!(
        bot.send_message(message.chat.id, list.render())
            .parse_mode(ParseMode::Html)
            .reply_markup(list.keyboard())
            .reply_to(message.id)
            .disable_link_preview(true)
            .await
    )?;

    deps.sessions
        .insert_pages((sent.chat.id, sent.id), list)
        .await;
    Ok(())
}

/// Look up `query` and reply with what was found.
pub async fn handle_search(bot: &Bot, message: &Message, deps: &Deps, query: &str) -> Ret {
    let query = query.trim();
    if query.is_empty() {
        return Ok(());
    }
    let Some(user) = message.from.as_ref() else {
        return Ok(());
    };
    let chat = message.chat.id;
    let database = &deps.database;

    if database.is_chat_disabled(chat).await {
        bot.archsendmsg(
            chat,
            "Searching is disabled in this chat. Message me in private instead!",
            message.id,
        )
        .await?;
        return Ok(());
    }

    if database.first_search(user.id).await {
        bot.archsendmsg(chat, SEARCH_TIPS, message.id).await?;
    }

    bot.typing(chat).await?;

    let tags = database.tags().await;
    let outcome = search::search(query, &tags, database.fonted_tags());

    let first_tag_name = outcome.tags().first().map(|tag| tag.name.to_string());
    let found = outcome.is_found();
    let shown_query = shorten(query, MAX_QUERY_LEN);

    match &outcome {
        SearchOutcome::Found { .. } => {
            let title = format!("Search results for \"{}\"", encode_text(&shown_query));
            let list = PagedList::new(user.id, title, entries_of(outcome.tags()), SEARCH_PAGE_SIZE);
            send_paged(bot, message, deps, list).await?;
        }
        SearchOutcome::Fuzzy(close) => {
            let title = format!(
                "No exact match for \"{}\", closest tags",
                encode_text(&shown_query)
            );
            let entries = close
                .iter()
                .map(|&tag| Entry::new(entry_of(TagRef::from(tag)).text))
                .collect();
            let list = PagedList::new(user.id, title, entries, FUZZY_PAGE_SIZE);
            send_paged(bot, message, deps, list).await?;
        }
        SearchOutcome::NotFound => {
            let response = if query.chars().count() > 4 {
                "No match found, try 4 letters."
            } else {
                "No match found, try to be more specific."
            };
            bot.archsendmsg(chat, response, message.id).await?;

            match database.record_not_found(query).await {
                Ok(true) => update_leaderboard(bot, deps).await,
                Ok(false) => (),
                Err(e) => log::error!("Failed to save a not found query: {e}"),
            }
        }
    }

    if let Err(e) = database
        .record_search(user.id, query, found, first_tag_name.as_deref())
        .await
    {
        log::error!("Failed to save search history: {e}");
    }

    Ok(())
}

/// The not-found leaderboard as HTML, or [`None`] if it's empty.
pub fn render_not_found_board(board: &[(String, u64)]) -> Option<String> {
    if board.is_empty() {
        return None;
    }

    let mut text = String::from("<b>Not found leaderboard:</b>\n\n");
    for (i, (query, count)) in board.iter().enumerate() {
        let _ = writeln!(
            text,
            "<b>{}.</b> <code>{}</code> - {} time{}",
            i + 1,
            encode_text(query),
            count,
            if *count == 1 { "" } else { "s" }
        );
    }
    text.truncate(text.trim_end().len());
    Some(text)
}

/// Edit the leaderboard message in the log chat, or post a new one if it
/// can't be edited. Failures are only logged.
async fn update_leaderboard(bot: &Bot, deps: &Deps) {
    let Some(log_chat) = deps.config.log_chat_id else {
        return;
    };

    let mut board = deps.database.not_found_board().await;
    board.truncate(LEADERBOARD_SHOWN);
    let Some(text) = render_not_found_board(&board) else {
        return;
    };

    if let Some(message_id) = deps.database.leaderboard_message().await {
        match teloxide_retry!(
            bot.edit_message_text(log_chat, message_id, &text)
                .parse_mode(ParseMode::Html)
                .await
        ) {
            Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => return,
            Err(e) => log::warn!("Couldn't edit the leaderboard, posting a new one: {e}"),
        }
    }

    match teloxide_retry!(
        bot.send_message(log_chat, &text)
            .parse_mode(ParseMode::Html)
            .await
    ) {
        Ok(sent) => {
            if let Err(e) = deps.database.set_leaderboard_message(sent.id).await {
                log::error!("Failed to save the leaderboard message: {e}");
            }
        }
        Err(e) => log::error!("Failed to post the leaderboard: {e}"),
    }
}

/// Title and entries of the symbols listing narrowed to one face.
pub async fn face_listing(database: &Database, face: &str) -> (String, Vec<Entry>) {
    let tags = database.tags().await;
    let found = search::with_symbols(&tags, database.fonted_tags());
    (
        format!("Tags with {}", encode_text(face)),
        entries_of(search::with_face(&found, face)),
    )
}

fn language_listing(language: Language, tags: &[Tag]) -> Vec<Entry> {
    search::by_language(language, tags)
        .into_iter()
        .map(|tag| Entry::new(entry_of(TagRef::from(tag)).text))
        .collect()
}

pub async fn show(tp: CommandParams<'_>) -> Ret {
    let Some(user) = tp.sender() else {
        return Ok(());
    };
    let what = tp.get_params();
    let database = &tp.deps.database;

    let list = if what.eq_ignore_ascii_case("symbols") {
        let tags = database.tags().await;
        let found = search::with_symbols(&tags, database.fonted_tags());
        if found.is_empty() {
            return tp.reply("No tags with symbols found.").await;
        }
        let mut faces = search::faces_by_presence(&found);
        faces.truncate(FACE_BUTTONS);
        let title = "Tags with symbols".to_string();
        PagedList::new(user.id, title, entries_of(found), SYMBOLS_PAGE_SIZE).with_faces(faces)
    } else if let Ok(language) = what.parse::<Language>() {
        let tags = database.tags().await;
        let entries = language_listing(language, &tags);
        if entries.is_empty() {
            return tp
                .reply(&format!("No {} tags found.", language.title()))
                .await;
        }
        let title = format!("{} tags", language.title());
        PagedList::new(user.id, title, entries, LANGUAGE_PAGE_SIZE)
    } else {
        return tp
            .reply("Usage: <code>/show chinese|korean|japanese|symbols</code>")
            .await;
    };

    send_paged(tp.bot, tp.message, tp.deps, list).await
}
