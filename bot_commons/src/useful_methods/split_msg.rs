use futures::Future;
use teloxide::{
    payloads::SendMessageSetters,
    requests::Requester,
    sugar::request::{RequestLinkPreviewExt, RequestReplyExt},
    types::{Message, MessageId, ParseMode, Recipient},
    Bot, RequestError,
};

/// Telegram's limit on the length of a single text message.
pub const MESSAGE_LENGTH_LIMIT: usize = 4096;

pub trait BotArchSendMsg {
    /// Opinionated method to send a message, with HTML markup,
    /// and retries due to flood waiting.
    /// Also splits the message into many on line boundaries
    /// if it's longer than the character limit.
    fn archsendmsg<'a>(
        &'a self,
        to_where: impl Into<Recipient> + Send,
        text: impl Into<&'a str> + Send,
        reply_to: impl Into<Option<MessageId>> + Send,
    ) -> impl Future<Output = Result<Vec<Message>, RequestError>> + Send;

    /// Same as [`BotArchSendMsg::archsendmsg`], but with link previews disabled.
    fn archsendmsg_no_link_preview<'a>(
        &'a self,
        to_where: impl Into<Recipient> + Send,
        text: impl Into<&'a str> + Send,
        reply_to: impl Into<Option<MessageId>> + Send,
    ) -> impl Future<Output = Result<Vec<Message>, RequestError>> + Send;
}

impl BotArchSendMsg for Bot {
    async fn archsendmsg<'a>(
        &'a self,
        to_where: impl Into<Recipient> + Send,
        text: impl Into<&'a str> + Send,
        reply_to: impl Into<Option<MessageId>> + Send,
    ) -> Result<Vec<Message>, RequestError> {
        send_split(self, to_where.into(), text.into(), reply_to.into(), false).await
    }

    async fn archsendmsg_no_link_preview<'a>(
        &'a self,
        to_where: impl Into<Recipient> + Send,
        text: impl Into<&'a str> + Send,
        reply_to: impl Into<Option<MessageId>> + Send,
    ) -> Result<Vec<Message>, RequestError> {
        send_split(self, to_where.into(), text.into(), reply_to.into(), true).await
    }
}

async fn send_split(
    bot: &Bot,
    to_where: Recipient,
    text: &str,
    reply_to: Option<MessageId>,
    no_link_preview: bool,
) -> Result<Vec<Message>, RequestError> {
    let mut sent_messages = Vec::new();

    for chunk in SplitOnLines::new(text, MESSAGE_LENGTH_LIMIT) {
        // Telegram rejects whitespace-only messages.
        let chunk = chunk.trim_end();
        if chunk.is_empty() {
            continue;
        }

        let message = crate::teloxide_retry!({
            let mut request = bot
                .send_message(to_where.clone(), chunk)
                .parse_mode(ParseMode::Html);
            if let Some(reply_to) = reply_to {
                request = request.reply_to(reply_to);
            }
            if no_link_preview {
                request = request.disable_link_preview(true);
            }
            request.await
        })?;

        sent_messages.push(message);
    }

    Ok(sent_messages)
}

/// Split the text into chunks of at most `max_len` characters each,
/// cutting only on line boundaries.
///
/// Chunks keep their newlines, so concatenating them gives back the
/// exact input. A single line longer than `max_len` is the one thing
/// that can't be kept whole; it gets cut on character boundaries.
///
/// # Panics
/// Panics if `max_len` is zero.
#[must_use]
pub fn split_text(text: &str, max_len: usize) -> Vec<&str> {
    SplitOnLines::new(text, max_len).collect()
}

/// Iterator over chunks of text, each at most `max_len` characters long,
/// made of as many whole lines as fit. See [`split_text`].
pub struct SplitOnLines<'a> {
    data: &'a str,
    max_len: usize,
}

impl<'a> SplitOnLines<'a> {
    /// Create a new splitter with specified max length in characters.
    ///
    /// # Panics
    /// Panics if a max length of zero is specified.
    #[must_use]
    pub fn new(data: &'a str, max_len: usize) -> SplitOnLines<'a> {
        assert!(max_len > 0, "Max length is too small");
        SplitOnLines { data, max_len }
    }
}

impl<'a> Iterator for SplitOnLines<'a> {
    type Item = &'a str;
    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }

        // Size of the output so far, in bytes and in characters.
        let mut output_bytes = 0;
        let mut output_chars = 0;

        while output_bytes < self.data.len() {
            let rest = &self.data[output_bytes..];
            // A line, including its newline if it has one.
            let line_len = rest.find('\n').map_or(rest.len(), |x| x + 1);
            let line_chars = rest[..line_len].chars().count();

            if output_chars + line_chars > self.max_len {
                break;
            }

            output_bytes += line_len;
            output_chars += line_chars;
        }

        if output_bytes == 0 {
            // The very first line doesn't fit on its own. Cut it.
            output_bytes = self
                .data
                .char_indices()
                .nth(self.max_len)
                .map_or(self.data.len(), |(byte, _)| byte);
        }

        let (output, rest) = self.data.split_at(output_bytes);
        self.data = rest;
        Some(output)
    }
}

#[cfg(test)]
mod tests {
    use super::{split_text, SplitOnLines};

    /// Checks everything a split must hold to.
    fn check_split(data: &str, max_len: usize) -> Vec<&str> {
        let chunks = split_text(data, max_len);
        assert_eq!(chunks.concat(), data, "Split lost data");
        for chunk in &chunks {
            assert!(!chunk.is_empty());
            assert!(chunk.chars().count() <= max_len, "Chunk too long: {chunk:?}");
        }

        // Every line that fits must be in exactly one chunk.
        for line in data.split_inclusive('\n') {
            if line.chars().count() <= max_len {
                assert!(
                    chunks.iter().any(|chunk| chunk.contains(line)),
                    "Line {line:?} was split"
                );
            }
        }
        chunks
    }

    #[test]
    fn fits_whole() {
        let data = "hi hello\nhi   HELLO!!!";
        let mut splitter = SplitOnLines::new(data, data.len());
        assert_eq!(splitter.next(), Some(data));
        assert_eq!(splitter.next(), None);
    }

    #[test]
    fn empty_input() {
        assert!(split_text("", 10).is_empty());
    }

    #[test]
    fn line_split() {
        let data = "12345\n12\n12\n123456\n";
        let mut splitter = SplitOnLines::new(data, 6);
        assert_eq!(splitter.next(), Some("12345\n"));
        assert_eq!(splitter.next(), Some("12\n12\n"));
        // "123456\n" is 7 characters with the newline.
        assert_eq!(splitter.next(), Some("123456"));
        assert_eq!(splitter.next(), Some("\n"));
        assert_eq!(splitter.next(), None);
    }

    #[test]
    fn overlong_line_is_cut_on_chars() {
        let data = "ab\nабвгдеёжз\ncd";
        let chunks = check_split(data, 4);
        assert_eq!(chunks, ["ab\n", "абвг", "деёж", "з\ncd"]);
    }

    #[test]
    fn report_like_text() {
        let mut data = String::from("Checked 300 invites.\nInvalid: 120\n\n");
        for i in 0..120 {
            data.push_str(&format!("{}. > Tags: TAG{} (DBTag.json)\n", i + 1, i));
            data.push_str(&format!("https://discord.gg/code{i}\n"));
        }
        let chunks = check_split(&data, 500);
        assert!(chunks.len() > 1);

        for max_len in [1, 2, 7, 33, 64, 4096] {
            check_split(&data, max_len);
        }
    }

    #[test]
    fn blank_lines() {
        check_split("\n\n\n\n", 1);
        check_split("\n\n\na\n\n", 2);
    }
}
