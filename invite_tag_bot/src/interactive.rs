use std::{collections::HashMap, fmt::Write, time::Duration};

use teloxide::types::{ChatId, InlineKeyboardButton, InlineKeyboardMarkup, MessageId, UserId};
use tokio::{sync::Mutex, time::Instant};

/// How long paged results can be flipped through.
pub const PAGES_TTL: Duration = Duration::from_secs(180);
/// How long a confirmation can be answered.
pub const CONFIRMATION_TTL: Duration = Duration::from_secs(30);

pub const PREV_PAGE: &str = "page:prev";
pub const NEXT_PAGE: &str = "page:next";
pub const FACE_PREFIX: &str = "face:";
pub const CONFIRM_YES: &str = "confirm:yes";
pub const CONFIRM_NO: &str = "confirm:no";

/// Identifies a message the bot sent, which sessions are attached to.
pub type MessageKey = (ChatId, MessageId);

/// One item of a paged list, already HTML formatted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Heading shown above the first entry of a run with the same section.
    pub section: Option<&'static str>,
    pub text: String,
}

impl Entry {
    pub fn new(text: String) -> Self {
        Entry {
            section: None,
            text,
        }
    }
}

/// A list of results shown a page at a time.
#[derive(Debug, Clone)]
pub struct PagedList {
    owner: UserId,
    title: String,
    entries: Vec<Entry>,
    page_size: usize,
    page: usize,
    /// Filter buttons shown above the page buttons.
    faces: Vec<&'static str>,
    expires: Instant,
}

impl PagedList {
    /// # Panics
    /// Panics if `page_size` is zero.
    pub fn new(owner: UserId, title: String, entries: Vec<Entry>, page_size: usize) -> Self {
        assert!(page_size > 0, "Page size must not be zero");
        PagedList {
            owner,
            title,
            entries,
            page_size,
            page: 0,
            faces: Vec::new(),
            expires: Instant::now() + PAGES_TTL,
        }
    }

    pub fn with_faces(mut self, faces: Vec<&'static str>) -> Self {
        self.faces = faces;
        self
    }

    pub fn page_count(&self) -> usize {
        self.entries.len().div_ceil(self.page_size).max(1)
    }

    pub fn page(&self) -> usize {
        self.page
    }

    /// Switch to other entries, back on the first page.
    pub fn replace_entries(&mut self, title: String, entries: Vec<Entry>) {
        self.title = title;
        self.entries = entries;
        self.page = 0;
    }

    /// Returns `false` if there's no page to go to.
    pub fn turn(&mut self, forward: bool) -> bool {
        if forward && self.page + 1 < self.page_count() {
            self.page += 1;
            true
        } else if !forward && self.page > 0 {
            self.page -= 1;
            true
        } else {
            false
        }
    }

    /// Text of the current page.
    pub fn render(&self) -> String {
        let mut text = format!(
            "<b>{} (Page {}/{})</b>\n\n",
            self.title,
            self.page + 1,
            self.page_count()
        );

        let start = self.page * self.page_size;
        let end = (start + self.page_size).min(self.entries.len());

        let mut section = None;
        for entry in &self.entries[start..end] {
            if entry.section.is_some() && entry.section != section {
                if section.is_some() {
                    text.push('\n');
                }
                let _ = writeln!(text, "<b>{}</b>", entry.section.unwrap_or_default());
                section = entry.section;
            }
            text.push_str(&entry.text);
            text.push_str("\n\n");
        }

        text.truncate(text.trim_end().len());
        text
    }

    /// Buttons for the current page. Telegram can't show disabled buttons,
    /// so the ones that would go nowhere are left out.
    pub fn keyboard(&self) -> InlineKeyboardMarkup {
        let mut rows: Vec<Vec<InlineKeyboardButton>> = Vec::new();

        if !self.faces.is_empty() {
            for faces in self.faces.chunks(6) {
                rows.push(
                    faces
                        .iter()
                        .map(|face| {
                            InlineKeyboardButton::callback(*face, format!("{FACE_PREFIX}{face}"))
                        })
                        .collect(),
                );
            }
        }

        let mut paging = Vec::new();
        if self.page > 0 {
            paging.push(InlineKeyboardButton::callback("⬅️", PREV_PAGE));
        }
        if self.page + 1 < self.page_count() {
            paging.push(InlineKeyboardButton::callback("➡️", NEXT_PAGE));
        }
        if !paging.is_empty() {
            rows.push(paging);
        }

        InlineKeyboardMarkup::new(rows)
    }
}

/// Something destructive waiting for a yes or no.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingAction {
    DeleteTag { link: String },
    ReplaceLink { old: String, new: String },
}

#[derive(Debug, Clone)]
struct Confirmation {
    owner: UserId,
    action: PendingAction,
    expires: Instant,
}

/// Why a button press on a session message didn't go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// Nothing attached to the message, or it expired.
    Gone,
    /// Someone other than who asked pressed it.
    NotOwner,
}

/// Interactive messages the bot is waiting for button presses on.
#[derive(Default)]
pub struct Sessions {
    pages: Mutex<HashMap<MessageKey, PagedList>>,
    confirmations: Mutex<HashMap<MessageKey, Confirmation>>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_pages(&self, key: MessageKey, list: PagedList) {
        let now = Instant::now();
        let mut pages = self.pages.lock().await;
        pages.retain(|_, list| list.expires > now);
        pages.insert(key, list);
    }

    /// Run `f` on the paged list attached to the message, if `user` may.
    pub async fn with_pages<R>(
        &self,
        key: MessageKey,
        user: UserId,
        f: impl FnOnce(&mut PagedList) -> R,
    ) -> Result<R, SessionError> {
        let mut pages = self.pages.lock().await;
        let Some(list) = pages.get_mut(&key) else {
            return Err(SessionError::Gone);
        };
        if list.expires <= Instant::now() {
            pages.remove(&key);
            return Err(SessionError::Gone);
        }
        if list.owner != user {
            return Err(SessionError::NotOwner);
        }
        Ok(f(list))
    }

    pub async fn insert_confirmation(&self, key: MessageKey, owner: UserId, action: PendingAction) {
        let now = Instant::now();
        let mut confirmations = self.confirmations.lock().await;
        confirmations.retain(|_, confirmation| confirmation.expires > now);
        confirmations.insert(
            key,
            Confirmation {
                owner,
                action,
                expires: now + CONFIRMATION_TTL,
            },
        );
    }

    /// Take the action waiting on this message. Only its owner can, and
    /// only once.
    pub async fn take_confirmation(
        &self,
        key: MessageKey,
        user: UserId,
    ) -> Result<PendingAction, SessionError> {
        let mut confirmations = self.confirmations.lock().await;
        let Some(confirmation) = confirmations.get(&key) else {
            return Err(SessionError::Gone);
        };
        if confirmation.expires <= Instant::now() {
            confirmations.remove(&key);
            return Err(SessionError::Gone);
        }
        if confirmation.owner != user {
            return Err(SessionError::NotOwner);
        }

        confirmations
            .remove(&key)
            .map(|confirmation| confirmation.action)
            .ok_or(SessionError::Gone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: MessageKey = (ChatId(-100), MessageId(5));
    const OWNER: UserId = UserId(1);
    const STRANGER: UserId = UserId(2);

    fn entries(count: usize) -> Vec<Entry> {
        (1..=count).map(|i| Entry::new(format!("entry {i}"))).collect()
    }

    fn buttons(list: &PagedList) -> Vec<String> {
        list.keyboard()
            .inline_keyboard
            .iter()
            .flatten()
            .map(|button| button.text.clone())
            .collect()
    }

    #[test]
    fn paging() {
        let mut list = PagedList::new(OWNER, "Found 12 tags".to_string(), entries(12), 5);
        assert_eq!(list.page_count(), 3);
        assert!(list.render().starts_with("<b>Found 12 tags (Page 1/3)</b>\n\nentry 1\n\n"));
        assert!(list.render().ends_with("entry 5"));
        assert_eq!(buttons(&list), vec!["➡️"]);

        assert!(!list.turn(false));
        assert!(list.turn(true));
        assert_eq!(buttons(&list), vec!["⬅️", "➡️"]);
        assert!(list.turn(true));
        assert!(list.render().ends_with("entry 11\n\nentry 12"));
        assert_eq!(buttons(&list), vec!["⬅️"]);
        assert!(!list.turn(true));
        assert_eq!(list.page(), 2);
    }

    #[test]
    fn single_page_has_no_buttons() {
        let list = PagedList::new(OWNER, "Few".to_string(), entries(2), 5);
        assert_eq!(list.page_count(), 1);
        assert!(list.keyboard().inline_keyboard.is_empty());

        let empty = PagedList::new(OWNER, "None".to_string(), Vec::new(), 5);
        assert_eq!(empty.page_count(), 1);
    }

    #[test]
    fn sections() {
        let mut entries = entries(4);
        entries[0].section = Some("Results from Fonted.json:");
        entries[1].section = Some("Results from Fonted.json:");
        entries[2].section = Some("Results from DBTag.json:");
        entries[3].section = Some("Results from DBTag.json:");
        let mut list = PagedList::new(OWNER, "Found".to_string(), entries, 3);

        assert_eq!(
            list.render(),
            "<b>Found (Page 1/2)</b>\n\n\
             <b>Results from Fonted.json:</b>\nentry 1\n\nentry 2\n\n\n\
             <b>Results from DBTag.json:</b>\nentry 3"
        );

        // The heading is repeated on a new page.
        list.turn(true);
        assert_eq!(
            list.render(),
            "<b>Found (Page 2/2)</b>\n\n<b>Results from DBTag.json:</b>\nentry 4"
        );
    }

    #[test]
    fn face_buttons() {
        let list = PagedList::new(OWNER, "Symbols".to_string(), entries(7), 6)
            .with_faces(vec!["UwU", ":3"]);
        let keyboard = list.keyboard();
        assert_eq!(keyboard.inline_keyboard.len(), 2);
        assert_eq!(keyboard.inline_keyboard[0][0].text, "UwU");
        assert_eq!(keyboard.inline_keyboard[1][0].text, "➡️");
    }

    #[tokio::test(start_paused = true)]
    async fn only_the_owner_turns_pages() {
        let sessions = Sessions::new();
        sessions
            .insert_pages(KEY, PagedList::new(OWNER, "T".to_string(), entries(10), 5))
            .await;

        assert_eq!(
            sessions.with_pages(KEY, STRANGER, |list| list.turn(true)).await,
            Err(SessionError::NotOwner)
        );
        assert_eq!(
            sessions.with_pages(KEY, OWNER, |list| list.turn(true)).await,
            Ok(true)
        );
        assert_eq!(
            sessions
                .with_pages((ChatId(1), MessageId(1)), OWNER, |list| list.page())
                .await,
            Err(SessionError::Gone)
        );

        tokio::time::advance(PAGES_TTL).await;
        assert_eq!(
            sessions.with_pages(KEY, OWNER, |list| list.page()).await,
            Err(SessionError::Gone)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn confirmations_are_taken_once() {
        let sessions = Sessions::new();
        let action = PendingAction::DeleteTag {
            link: "https://discord.gg/uwu123".to_string(),
        };
        sessions
            .insert_confirmation(KEY, OWNER, action.clone())
            .await;

        assert_eq!(
            sessions.take_confirmation(KEY, STRANGER).await,
            Err(SessionError::NotOwner)
        );
        assert_eq!(sessions.take_confirmation(KEY, OWNER).await, Ok(action));
        assert_eq!(
            sessions.take_confirmation(KEY, OWNER).await,
            Err(SessionError::Gone)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn confirmations_expire() {
        let sessions = Sessions::new();
        sessions
            .insert_confirmation(
                KEY,
                OWNER,
                PendingAction::ReplaceLink {
                    old: "a".to_string(),
                    new: "b".to_string(),
                },
            )
            .await;

        tokio::time::advance(CONFIRMATION_TTL + Duration::from_millis(1)).await;
        assert_eq!(
            sessions.take_confirmation(KEY, OWNER).await,
            Err(SessionError::Gone)
        );
    }
}
