use std::{fmt::Write, future::Future, pin::Pin};

use bot_commons::{get_admin_of, useful_methods::*};
use html_escape::encode_text;
use teloxide::{
    types::{BotCommand, ChatId, Me, Message, User},
    Bot, RequestError,
};

use super::{authenticate_privileged, invites, search, tags, Deps};

pub const COMMANDS: &[Command] = &[
    START,
    HELP,
    TAG,
    SHOW,
    ALLTAGS,
    CHECK,
    HISTORY,
    GLOBALHISTORY,
    GH,
    NOTFOUND,
    DISABLE,
    ENABLE,
    ____SEPARATOR,
    ADDTAG,
    AT,
    DELTAG,
    DT,
    REPLACELINK,
    RL,
    INVITEREPORT,
    STOPREPORT,
];

pub type Ret = Result<(), RequestError>;
pub type CommandFuture<'a> = Pin<Box<dyn Future<Output = Ret> + Send + 'a>>;

pub struct CommandParams<'a> {
    pub bot: &'a Bot,
    pub me: &'a Me,
    pub message: &'a Message,
    pub deps: &'a Deps,
    pub message_text: &'a str,
    pub command_len: usize,
}

impl<'a> CommandParams<'a> {
    pub fn new<'new>(
        bot: &'new Bot,
        me: &'new Me,
        message: &'new Message,
        deps: &'new Deps,
    ) -> Option<CommandParams<'new>> {
        let message_text = message.text_full()?.trim_start();

        if !message_text.starts_with('/') {
            return None;
        }

        let command = message_text.split_whitespace().next()?;

        if !command.is_ascii() {
            // Telegram commands must be ASCII.
            // See https://core.telegram.org/bots/api#botcommand
            return None;
        }

        let command_len = command.len();

        Some(CommandParams {
            bot,
            me,
            message,
            deps,
            message_text,
            command_len,
        })
    }

    pub fn make_command(self) -> Option<CommandFuture<'a>> {
        // "/tag@Some_Bot kawa" is for us only if we are Some_Bot.
        let callname = if let Some(username_start) = self.command().find('@') {
            // Bot names are guaranteed ASCII, so ignore ASCII case specifically.
            if !self.command()[username_start + '@'.len_utf8()..]
                .eq_ignore_ascii_case(self.me.username())
            {
                return None;
            }

            &self.command()[0..username_start]
        } else {
            self.command()
        };
        for command in COMMANDS {
            if command.is_matching_callname(callname) {
                return Some((command.function)(self));
            }
        }
        None
    }

    /// If the input is `/tag kawa uwu`, this is `/tag`.
    #[inline]
    pub fn command(&self) -> &'a str {
        &self.message_text[..self.command_len]
    }

    /// If the input is `/tag kawa uwu`, this is `kawa uwu`.
    #[inline]
    pub fn get_params(&self) -> &'a str {
        self.message_text[self.command_len..].trim()
    }

    pub fn chat_id(&self) -> ChatId {
        self.message.chat.id
    }

    pub fn sender(&self) -> Option<&'a User> {
        self.message.from.as_ref()
    }

    /// Reply with HTML text, split into many messages if it's long.
    pub async fn reply(&self, text: &str) -> Ret {
        self.bot
            .archsendmsg_no_link_preview(self.chat_id(), text, self.message.id)
            .await?;
        Ok(())
    }

    /// Sender, if they are privileged. Replies with a refusal otherwise.
    pub async fn privileged_sender(&self) -> Result<Option<&'a User>, RequestError> {
        let Some(user) = self.sender() else {
            self.reply("Anonymous users can't use this command.").await?;
            return Ok(None);
        };
        if !authenticate_privileged(self.bot, &self.deps.config, user).await? {
            self.reply("❌ You do not have permission to use this command.")
                .await?;
            return Ok(None);
        }
        Ok(Some(user))
    }
}

pub struct Command {
    pub callname: &'static str,
    pub description: &'static str,
    pub function: fn(CommandParams) -> CommandFuture,
    hidden: bool,
}

impl Command {
    pub fn is_matching_callname(&self, command: &str) -> bool {
        self.callname
            .split_ascii_whitespace()
            .next()
            .is_some_and(|x| x.eq_ignore_ascii_case(command))
    }

    pub fn get_help(&self, mut output: impl std::fmt::Write) -> Result<(), std::fmt::Error> {
        // useful for the separator "command"
        if self.callname.is_empty() && self.description.is_empty() {
            return Ok(());
        }

        output.write_str(self.callname)?;
        if !self.description.is_empty() {
            output.write_str(" - ")?;
            output.write_str(self.description)?;
        }

        Ok(())
    }

    pub fn generate_help() -> String {
        let mut response = String::from(concat!(
            "HELP:\n\n",
            "Mention me with a tag name, like <code>@bot kawa</code>, ",
            "or just send it to me in private.\n\n"
        ));
        for command in COMMANDS {
            if command.hidden {
                continue;
            }
            if command.callname.is_empty() {
                response += "Privileged users only:\n\n";
                continue;
            }
            let _ = command.get_help(&mut response);
            response += "\n\n";
        }
        response.truncate(response.trim_end().len());
        response
    }
}

pub fn generate_bot_commands() -> Vec<BotCommand> {
    let mut output = Vec::new();

    for command in COMMANDS {
        if command.hidden {
            continue;
        }
        let Some(callname) = command.callname.split_ascii_whitespace().next() else {
            continue;
        };

        // Cut off the /
        let callname = callname[1..].trim().to_string();
        let description = command
            .description
            .replace("&lt;", "<")
            .replace("&gt;", ">");

        output.push(BotCommand {
            command: callname,
            description,
        });
    }

    output
}

///////////////////////////////////////
/////////////////COMMAND DEFINITIONS
///////////////////////////////////////

/// Wraps the function's return value in a pinning closure.
macro_rules! wrap {
    ($thing:expr) => {
        |tp| Box::pin($thing(tp))
    };
}

pub const START: Command = Command {
    callname: "/start",
    description: "",
    function: wrap!(start),
    hidden: true,
};
async fn start(tp: CommandParams<'_>) -> Ret {
    if !tp.message.chat.is_private() {
        return Ok(());
    }
    let response = format!(
        "hewo

I keep a list of tags with their invite links. Send me a tag name and I'll look it up.

For a full list of commands, send /help

{}",
        SEARCH_TIPS
    );
    tp.reply(&response).await
}

pub const HELP: Command = Command {
    callname: "/help",
    description: "Show this help.",
    function: wrap!(help),
    hidden: false,
};
async fn help(tp: CommandParams<'_>) -> Ret {
    tp.reply(&Command::generate_help()).await
}

pub const ____SEPARATOR: Command = Command {
    callname: "",
    description: "",
    function: wrap!(do_nothing),
    hidden: false,
};
async fn do_nothing(_: CommandParams<'_>) -> Ret {
    Ok(())
}

/// Shown before someone's first search.
pub const SEARCH_TIPS: &str = "<b>Before you search:</b>
- Tags are 4 letters (max 5 with ligatures)
- Try common or famous keywords
- Most tags are in English, but there are a few in other languages";

pub const TAG: Command = Command {
    callname: "/tag &lt;name&gt;",
    description: "Search for a tag.",
    function: wrap!(tag),
    hidden: false,
};
async fn tag(tp: CommandParams<'_>) -> Ret {
    let query = tp.get_params();
    if query.is_empty() {
        return tp.reply("Usage: <code>/tag name</code>").await;
    }
    search::handle_search(tp.bot, tp.message, tp.deps, query).await
}

pub const SHOW: Command = Command {
    callname: "/show &lt;chinese|korean|japanese|symbols&gt;",
    description: "List tags in a language, or tags with symbols like &lt;3 or :3.",
    function: wrap!(search::show),
    hidden: false,
};

pub const ALLTAGS: Command = Command {
    callname: "/alltags",
    description: "Count the tags.",
    function: wrap!(alltags),
    hidden: false,
};
async fn alltags(tp: CommandParams<'_>) -> Ret {
    let counts = tp.deps.database.tag_counts().await;
    let response = format!(
        "<b>Tags in the database</b>\n\nDBTag.json: <b>{}</b>\nFonted.json: <b>{}</b>\n\nTotal: <b>{}</b>",
        counts.db,
        counts.fonted,
        counts.total()
    );
    tp.reply(&response).await
}

pub const CHECK: Command = Command {
    callname: "/check &lt;invite&gt;",
    description: "Check if an invite link works.",
    function: wrap!(invites::check),
    hidden: false,
};

/// How many of the user's searches `/history` shows.
const HISTORY_SHOWN: usize = 25;

pub const HISTORY: Command = Command {
    callname: "/history",
    description: "Your most recent searches.",
    function: wrap!(history),
    hidden: false,
};
async fn history(tp: CommandParams<'_>) -> Ret {
    let Some(user) = tp.sender() else {
        return tp.reply("Anonymous users have no history.").await;
    };

    let records = tp.deps.database.user_history(user.id, HISTORY_SHOWN).await;
    if records.is_empty() {
        return tp.reply("No search history found for you.").await;
    }

    let mut response = format!("<b>Your last {HISTORY_SHOWN} searches:</b>\n\n");
    for record in &records {
        let _ = match (&record.tag_name, record.found) {
            (Some(tag_name), true) => writeln!(
                response,
                "✅ <code>{}</code> ({})",
                encode_text(&record.query),
                encode_text(tag_name)
            ),
            _ => writeln!(
                response,
                "❌ <code>{}</code> (not found)",
                encode_text(&record.query)
            ),
        };
    }
    tp.reply(&response).await
}

/// How many queries `/globalhistory` shows.
const GLOBAL_HISTORY_SHOWN: usize = 100;

pub const GLOBALHISTORY: Command = Command {
    callname: "/globalhistory",
    description: "Most searched tags overall.",
    function: wrap!(globalhistory),
    hidden: false,
};
pub const GH: Command = Command {
    callname: "/gh",
    description: "",
    function: wrap!(globalhistory),
    hidden: true,
};
async fn globalhistory(tp: CommandParams<'_>) -> Ret {
    let items = tp.deps.database.global_history().await;
    if items.is_empty() {
        return tp.reply("No global search records yet.").await;
    }

    let mut response = String::from("<b>Global search history:</b>\n\n");
    for (i, (query, stats)) in items.iter().take(GLOBAL_HISTORY_SHOWN).enumerate() {
        let _ = writeln!(
            response,
            "<b>{}.</b> <code>{}</code> - searched {} times by {} user(s)",
            i + 1,
            encode_text(query),
            stats.count,
            stats.users.len()
        );
    }
    tp.reply(&response).await
}

pub const NOTFOUND: Command = Command {
    callname: "/notfound",
    description: "Short tags people looked for but didn't find.",
    function: wrap!(notfound),
    hidden: false,
};
async fn notfound(tp: CommandParams<'_>) -> Ret {
    let board = tp.deps.database.not_found_board().await;
    match search::render_not_found_board(&board) {
        Some(text) => tp.reply(&text).await,
        None => tp.reply("Everything searched for was found so far.").await,
    }
}

pub const DISABLE: Command = Command {
    callname: "/disable [chat id]",
    description: "Disable searching in this chat, or the given one. For chat admins.",
    function: wrap!(disable),
    hidden: false,
};
async fn disable(tp: CommandParams<'_>) -> Ret {
    set_search_disabled(tp, true).await
}

pub const ENABLE: Command = Command {
    callname: "/enable [chat id]",
    description: "Enable searching back.",
    function: wrap!(enable),
    hidden: false,
};
async fn enable(tp: CommandParams<'_>) -> Ret {
    set_search_disabled(tp, false).await
}

async fn set_search_disabled(tp: CommandParams<'_>, disabled: bool) -> Ret {
    let params = tp.get_params();
    let target = if params.is_empty() {
        tp.chat_id()
    } else {
        match params.parse::<i64>() {
            Ok(id) => ChatId(id),
            Err(_) => {
                return tp.reply("That doesn't look like a chat ID.").await;
            }
        }
    };

    let Some(user) = tp.sender() else {
        return tp.reply("Anonymous users can't use this command.").await;
    };

    if target == tp.chat_id() && tp.message.chat.is_private() {
        return tp.reply("Searching can't be disabled in private chats.").await;
    }

    let allowed = if authenticate_privileged(tp.bot, &tp.deps.config, user).await? {
        true
    } else {
        match get_admin_of(tp.bot, user.id, target).await {
            Ok(admin) => admin.is_some(),
            Err(e) => {
                log::debug!("Couldn't get admins of {target}: {e}");
                false
            }
        }
    };
    if !allowed {
        return tp
            .reply("❌ You need to be an admin of that chat to do this.")
            .await;
    }

    let database = &tp.deps.database;
    let result = if disabled {
        database.disable_chat(target).await
    } else {
        database.enable_chat(target).await
    };

    let response = match (result, disabled) {
        (Ok(true), true) => "✅ Searching is now disabled there.",
        (Ok(false), true) => "ℹ️ Searching is already disabled there.",
        (Ok(true), false) => "✅ Searching is now enabled there.",
        (Ok(false), false) => "ℹ️ Searching was not disabled there.",
        (Err(e), _) => {
            log::error!("Failed to save disabled chats: {e}");
            "Failed to save that. Try again later."
        }
    };
    tp.reply(response).await
}

pub const ADDTAG: Command = Command {
    callname: "/addtag &lt;name&gt;, &lt;link&gt;",
    description: "Add a tag. Bare invite codes are fine as the link.",
    function: wrap!(tags::addtag),
    hidden: false,
};
pub const AT: Command = Command {
    callname: "/at",
    description: "",
    function: wrap!(tags::addtag),
    hidden: true,
};

pub const DELTAG: Command = Command {
    callname: "/deltag &lt;link&gt;",
    description: "Delete the tag with this link.",
    function: wrap!(tags::deltag),
    hidden: false,
};
pub const DT: Command = Command {
    callname: "/dt",
    description: "",
    function: wrap!(tags::deltag),
    hidden: true,
};

pub const REPLACELINK: Command = Command {
    callname: "/replacelink &lt;old link&gt; &lt;new link&gt;",
    description: "Change the link of a tag.",
    function: wrap!(tags::replacelink),
    hidden: false,
};
pub const RL: Command = Command {
    callname: "/rl",
    description: "",
    function: wrap!(tags::replacelink),
    hidden: true,
};

pub const INVITEREPORT: Command = Command {
    callname: "/invitereport",
    description: "Check every stored invite link and list the broken ones.",
    function: wrap!(invites::invitereport),
    hidden: false,
};

pub const STOPREPORT: Command = Command {
    callname: "/stopreport",
    description: "Stop the invite report running in this chat.",
    function: wrap!(invites::stopreport),
    hidden: false,
};
