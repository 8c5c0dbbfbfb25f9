mod split_msg;
pub use split_msg::*;

use futures::Future;
use teloxide::{
    requests::Requester,
    types::{ChatId, Me, Message},
    Bot, RequestError,
};

pub trait MessageStuff {
    /// Text of the message, or its caption if it's a media message.
    fn text_full(&self) -> Option<&str>;
    /// If the message starts with a mention of this bot, like
    /// `@Some_Bot hello there`, returns the rest of the text after it,
    /// trimmed. Usernames are compared ignoring ASCII case.
    fn text_after_mention_of(&self, me: &Me) -> Option<&str>;
}

impl MessageStuff for Message {
    fn text_full(&self) -> Option<&str> {
        self.text().or_else(|| self.caption())
    }
    fn text_after_mention_of(&self, me: &Me) -> Option<&str> {
        let text = self.text_full()?.trim_start();
        let rest = text.strip_prefix('@')?;
        let username = me.username();

        // Bot names are guaranteed ASCII, so a byte-wise cut is fine
        // as long as the prefix is ASCII too.
        let candidate = rest.get(..username.len())?;
        if !candidate.eq_ignore_ascii_case(username) {
            return None;
        }

        let rest = &rest[username.len()..];
        // "@Some_Botty" is not "@Some_Bot".
        if rest.chars().next().is_some_and(|c| !c.is_whitespace()) {
            return None;
        }

        Some(rest.trim())
    }
}

pub trait BotStuff {
    fn typing(&self, to_where: ChatId) -> impl Future<Output = Result<(), RequestError>> + Send;
}

impl BotStuff for Bot {
    async fn typing(&self, to_where: ChatId) -> Result<(), RequestError> {
        self.send_chat_action(to_where, teloxide::types::ChatAction::Typing)
            .await?;
        Ok(())
    }
}
