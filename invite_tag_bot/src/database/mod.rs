mod json_file;

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use teloxide::types::{ChatId, MessageId, UserId};
use tokio::sync::Mutex;

use crate::{
    invites::InviteTask,
    types::{FontedTag, Tag, TagSource},
};

const HISTORY_FILE: &str = "history.json";
const NOT_FOUND_FILE: &str = "notFoundTags.json";
const LEADERBOARD_FILE: &str = "notFoundEmbedMsg.json";
const DISABLED_CHATS_FILE: &str = "disabledChannels.json";

/// How many searches are remembered per user.
pub const USER_HISTORY_CAP: usize = 100;

/// Queries longer than this, in characters, are not worth a spot on the
/// not-found leaderboard.
pub const NOT_FOUND_MAX_LEN: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("Saving task died: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// One search made by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub query: String,
    pub found: bool,
    /// Name of the first tag found, if any.
    #[serde(rename = "tagName")]
    pub tag_name: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub ts: DateTime<Utc>,
}

/// How often a query was searched, and by whom.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryStats {
    pub count: u64,
    pub users: Vec<UserId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct History {
    #[serde(default)]
    users: HashMap<UserId, Vec<SearchRecord>>,
    #[serde(default)]
    global: BTreeMap<String, QueryStats>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct LeaderboardMessage {
    #[serde(rename = "msgId")]
    msg_id: Option<i32>,
}

/// Tag counts per file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagCounts {
    pub db: usize,
    pub fonted: usize,
}

impl TagCounts {
    pub fn total(&self) -> usize {
        self.db + self.fonted
    }
}

/// All of the bot's state that lives in files.
///
/// Everything is loaded once on start-up and every change is written
/// back whole. If writing fails, the change is not applied in memory
/// either.
pub struct Database {
    dir: PathBuf,
    tags: Mutex<Vec<Tag>>,
    /// Never edited through the bot.
    fonted_tags: Vec<FontedTag>,
    history: Mutex<History>,
    not_found: Mutex<BTreeMap<String, u64>>,
    leaderboard: Mutex<LeaderboardMessage>,
    disabled_chats: Mutex<Vec<ChatId>>,
    /// Users that searched since start-up.
    searched: Mutex<HashSet<UserId>>,
}

impl Database {
    /// Load everything from files in `dir`, creating it if needed.
    ///
    /// # Errors
    /// Errors if the directory can't be created. Missing or broken files
    /// don't error, they are treated as empty.
    pub async fn new(dir: impl AsRef<Path>) -> Result<Arc<Database>, Error> {
        let dir = dir.as_ref().to_owned();
        std::fs::create_dir_all(&dir)?;

        let tags: Vec<Tag> = json_file::load_or_default(&dir.join(TagSource::Db.file_name()));
        let fonted_tags: Vec<FontedTag> =
            json_file::load_or_default(&dir.join(TagSource::Fonted.file_name()));

        log::info!(
            "Loaded {} tags and {} fonted tags from {}",
            tags.len(),
            fonted_tags.len(),
            dir.display()
        );

        Ok(Arc::new(Database {
            tags: Mutex::new(tags),
            fonted_tags,
            history: Mutex::new(json_file::load_or_default(&dir.join(HISTORY_FILE))),
            not_found: Mutex::new(json_file::load_or_default(&dir.join(NOT_FOUND_FILE))),
            leaderboard: Mutex::new(json_file::load_or_default(&dir.join(LEADERBOARD_FILE))),
            disabled_chats: Mutex::new(json_file::load_or_default(
                &dir.join(DISABLED_CHATS_FILE),
            )),
            searched: Mutex::new(HashSet::new()),
            dir,
        }))
    }

    /// Save `new` into the file, and only then into `slot`.
    ///
    /// The caller keeps the lock on `slot` the whole time, so saves of one
    /// file never race each other.
    async fn commit<T: Serialize>(&self, file: &str, slot: &mut T, new: T) -> Result<(), Error> {
        json_file::save(self.dir.join(file), &new).await?;
        *slot = new;
        Ok(())
    }

    ////////////////////////////////////////
    // Tags

    /// Snapshot of the tags in `DBTag.json`.
    pub async fn tags(&self) -> Vec<Tag> {
        self.tags.lock().await.clone()
    }

    pub fn fonted_tags(&self) -> &[FontedTag] {
        &self.fonted_tags
    }

    pub async fn tag_counts(&self) -> TagCounts {
        TagCounts {
            db: self.tags.lock().await.len(),
            fonted: self.fonted_tags.len(),
        }
    }

    /// Add a tag, applying the name prefix.
    pub async fn add_tag(&self, name: &str, link: String) -> Result<Tag, Error> {
        let tag = Tag::new_prefixed(name, link);

        let mut tags = self.tags.lock().await;
        let mut new = tags.clone();
        new.push(tag.clone());
        self.commit(TagSource::Db.file_name(), &mut *tags, new).await?;

        log::info!("Added tag {:?} -> {}", tag.name, tag.link);
        Ok(tag)
    }

    /// First tag with exactly this link.
    pub async fn find_tag_by_link(&self, link: &str) -> Option<Tag> {
        self.tags
            .lock()
            .await
            .iter()
            .find(|tag| tag.link == link)
            .cloned()
    }

    /// Delete the first tag with exactly this link. Returns the deleted tag,
    /// or [`None`] if there was none.
    pub async fn delete_tag_by_link(&self, link: &str) -> Result<Option<Tag>, Error> {
        let mut tags = self.tags.lock().await;
        let Some(index) = tags.iter().position(|tag| tag.link == link) else {
            return Ok(None);
        };

        let mut new = tags.clone();
        let deleted = new.remove(index);
        self.commit(TagSource::Db.file_name(), &mut *tags, new).await?;

        log::info!("Deleted tag {:?} -> {}", deleted.name, deleted.link);
        Ok(Some(deleted))
    }

    /// Change the link of the first tag that has `old` as its link.
    /// Returns the updated tag, or [`None`] if there was none.
    pub async fn replace_link(&self, old: &str, new_link: &str) -> Result<Option<Tag>, Error> {
        let mut tags = self.tags.lock().await;
        let Some(index) = tags.iter().position(|tag| tag.link == old) else {
            return Ok(None);
        };

        let mut new = tags.clone();
        new[index].link = new_link.to_string();
        let updated = new[index].clone();
        self.commit(TagSource::Db.file_name(), &mut *tags, new).await?;

        log::info!("Replaced link of {:?}: {old} -> {new_link}", updated.name);
        Ok(Some(updated))
    }

    /// Every stored link as something to check: `DBTag.json` ones first,
    /// then `Fonted.json` ones, each in file order.
    pub async fn invite_tasks(&self) -> Vec<InviteTask> {
        let tags = self.tags.lock().await;

        let db = tags.iter().map(|tag| InviteTask {
            link: tag.link.clone(),
            label: tag.name.clone(),
            source: TagSource::Db,
        });
        let fonted = self.fonted_tags.iter().map(|tag| InviteTask {
            link: tag.link.clone(),
            label: tag.name.clone(),
            source: TagSource::Fonted,
        });

        db.chain(fonted).collect()
    }

    ////////////////////////////////////////
    // Search history

    pub async fn record_search(
        &self,
        user: UserId,
        query: &str,
        found: bool,
        tag_name: Option<&str>,
    ) -> Result<(), Error> {
        let mut history = self.history.lock().await;
        let mut new = history.clone();

        let records = new.users.entry(user).or_default();
        records.push(SearchRecord {
            query: query.to_string(),
            found,
            tag_name: tag_name.map(str::to_string),
            ts: Utc::now(),
        });
        if records.len() > USER_HISTORY_CAP {
            let excess = records.len() - USER_HISTORY_CAP;
            records.drain(..excess);
        }

        let stats = new.global.entry(query.to_string()).or_default();
        stats.count += 1;
        if !stats.users.contains(&user) {
            stats.users.push(user);
        }

        self.commit(HISTORY_FILE, &mut *history, new).await
    }

    /// Up to `limit` most recent searches of this user, oldest first.
    pub async fn user_history(&self, user: UserId, limit: usize) -> Vec<SearchRecord> {
        let history = self.history.lock().await;
        let Some(records) = history.users.get(&user) else {
            return Vec::new();
        };
        records[records.len().saturating_sub(limit)..].to_vec()
    }

    /// Every query ever searched, most searched first.
    pub async fn global_history(&self) -> Vec<(String, QueryStats)> {
        let history = self.history.lock().await;
        let mut items: Vec<(String, QueryStats)> = history
            .global
            .iter()
            .map(|(query, stats)| (query.clone(), stats.clone()))
            .collect();
        // Stable, so ties stay alphabetical.
        items.sort_by(|a, b| b.1.count.cmp(&a.1.count));
        items
    }

    ////////////////////////////////////////
    // Not-found leaderboard

    /// Count a query that found nothing. Returns `false` without recording
    /// anything if the query is too long to be on the leaderboard.
    pub async fn record_not_found(&self, query: &str) -> Result<bool, Error> {
        if query.chars().count() > NOT_FOUND_MAX_LEN {
            return Ok(false);
        }

        let mut not_found = self.not_found.lock().await;
        let mut new = not_found.clone();
        *new.entry(query.to_string()).or_default() += 1;
        self.commit(NOT_FOUND_FILE, &mut *not_found, new).await?;

        Ok(true)
    }

    /// Queries that found nothing, most frequent first.
    pub async fn not_found_board(&self) -> Vec<(String, u64)> {
        let not_found = self.not_found.lock().await;
        let mut items: Vec<(String, u64)> = not_found
            .iter()
            .filter(|(query, _)| query.chars().count() <= NOT_FOUND_MAX_LEN)
            .map(|(query, &count)| (query.clone(), count))
            .collect();
        items.sort_by(|a, b| b.1.cmp(&a.1));
        items
    }

    /// The message in the log chat that shows the leaderboard.
    pub async fn leaderboard_message(&self) -> Option<MessageId> {
        self.leaderboard.lock().await.msg_id.map(MessageId)
    }

    pub async fn set_leaderboard_message(&self, message: MessageId) -> Result<(), Error> {
        let mut leaderboard = self.leaderboard.lock().await;
        let new = LeaderboardMessage {
            msg_id: Some(message.0),
        };
        self.commit(LEADERBOARD_FILE, &mut *leaderboard, new).await
    }

    ////////////////////////////////////////
    // Chats with search disabled

    /// Returns `false` if it was already disabled.
    pub async fn disable_chat(&self, chat: ChatId) -> Result<bool, Error> {
        let mut disabled = self.disabled_chats.lock().await;
        if disabled.contains(&chat) {
            return Ok(false);
        }
        let mut new = disabled.clone();
        new.push(chat);
        self.commit(DISABLED_CHATS_FILE, &mut *disabled, new).await?;
        Ok(true)
    }

    /// Returns `false` if it wasn't disabled.
    pub async fn enable_chat(&self, chat: ChatId) -> Result<bool, Error> {
        let mut disabled = self.disabled_chats.lock().await;
        if !disabled.contains(&chat) {
            return Ok(false);
        }
        let new = disabled.iter().copied().filter(|&c| c != chat).collect();
        self.commit(DISABLED_CHATS_FILE, &mut *disabled, new).await?;
        Ok(true)
    }

    pub async fn is_chat_disabled(&self, chat: ChatId) -> bool {
        self.disabled_chats.lock().await.contains(&chat)
    }

    ////////////////////////////////////////
    // Misc

    /// Returns `true` the first time it's called for this user since start-up.
    pub async fn first_search(&self, user: UserId) -> bool {
        self.searched.lock().await.insert(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn database(dir: &Path) -> Arc<Database> {
        Database::new(dir).await.unwrap()
    }

    fn write_fonted(dir: &Path) {
        std::fs::write(
            dir.join("Fonted.json"),
            r#"[{"name": "𝓚𝓐𝓦𝓐", "link": "https://discord.gg/kawa34", "keyword": "KAWA"}]"#,
        )
        .unwrap();
    }

    #[tokio::test]
    async fn tags_survive_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        write_fonted(dir.path());

        let db = database(dir.path()).await;
        let tag = db
            .add_tag("UWU", "https://discord.gg/uwu123".to_string())
            .await
            .unwrap();
        assert_eq!(tag.name, "> Tags: UWU");
        db.add_tag("OWO", "https://discord.gg/owo123".to_string())
            .await
            .unwrap();
        drop(db);

        let db = database(dir.path()).await;
        assert_eq!(db.tag_counts().await, TagCounts { db: 2, fonted: 1 });
        assert_eq!(db.tag_counts().await.total(), 3);
        assert_eq!(db.tags().await[1].name, "> Tags: OWO");
    }

    #[tokio::test]
    async fn deleting_and_replacing() {
        let dir = tempfile::tempdir().unwrap();
        let db = database(dir.path()).await;

        db.add_tag("A", "https://discord.gg/same12".to_string())
            .await
            .unwrap();
        db.add_tag("B", "https://discord.gg/same12".to_string())
            .await
            .unwrap();

        assert_eq!(
            db.find_tag_by_link("https://discord.gg/same12")
                .await
                .unwrap()
                .name,
            "> Tags: A"
        );

        // Only the first one with that link.
        let updated = db
            .replace_link("https://discord.gg/same12", "https://discord.gg/new123")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "> Tags: A");
        assert_eq!(updated.link, "https://discord.gg/new123");

        let deleted = db
            .delete_tag_by_link("https://discord.gg/same12")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(deleted.name, "> Tags: B");

        assert_eq!(db.delete_tag_by_link("nope").await.unwrap(), None);
        assert_eq!(db.replace_link("nope", "whatever").await.unwrap(), None);

        let tags = db.tags().await;
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].link, "https://discord.gg/new123");
    }

    #[tokio::test]
    async fn failed_saves_change_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let db = database(&data).await;

        db.add_tag("UWU", "https://discord.gg/uwu123".to_string())
            .await
            .unwrap();
        std::fs::remove_dir_all(&data).unwrap();

        assert!(db
            .add_tag("OWO", "https://discord.gg/owo123".to_string())
            .await
            .is_err());
        assert!(db.disable_chat(ChatId(-100)).await.is_err());

        assert_eq!(db.tags().await.len(), 1);
        assert!(!db.is_chat_disabled(ChatId(-100)).await);
    }

    #[tokio::test]
    async fn invite_tasks_list_db_tags_first() {
        let dir = tempfile::tempdir().unwrap();
        write_fonted(dir.path());
        let db = database(dir.path()).await;
        db.add_tag("UWU", "https://discord.gg/uwu123".to_string())
            .await
            .unwrap();

        let tasks = db.invite_tasks().await;
        assert_eq!(
            tasks,
            vec![
                InviteTask {
                    link: "https://discord.gg/uwu123".to_string(),
                    label: "> Tags: UWU".to_string(),
                    source: TagSource::Db,
                },
                InviteTask {
                    link: "https://discord.gg/kawa34".to_string(),
                    label: "𝓚𝓐𝓦𝓐".to_string(),
                    source: TagSource::Fonted,
                },
            ]
        );
    }

    #[tokio::test]
    async fn search_history() {
        let dir = tempfile::tempdir().unwrap();
        let db = database(dir.path()).await;
        let alice = UserId(1);
        let bob = UserId(2);

        for i in 0..(USER_HISTORY_CAP + 10) {
            db.record_search(alice, &format!("q{i}"), false, None)
                .await
                .unwrap();
        }
        db.record_search(alice, "kawa", true, Some("> Tags: KAWA"))
            .await
            .unwrap();
        db.record_search(bob, "kawa", true, Some("> Tags: KAWA"))
            .await
            .unwrap();
        db.record_search(bob, "kawa", true, Some("> Tags: KAWA"))
            .await
            .unwrap();

        let recent = db.user_history(alice, 25).await;
        assert_eq!(recent.len(), 25);
        assert_eq!(recent.last().unwrap().query, "kawa");
        assert_eq!(recent.last().unwrap().tag_name.as_deref(), Some("> Tags: KAWA"));
        assert_eq!(recent[0].query, format!("q{}", USER_HISTORY_CAP + 10 - 24));

        drop(db);
        let db = database(dir.path()).await;

        // Capped on disk too.
        assert_eq!(db.user_history(alice, 1000).await.len(), USER_HISTORY_CAP);
        assert!(db.user_history(UserId(3), 25).await.is_empty());

        let global = db.global_history().await;
        assert_eq!(global[0].0, "kawa");
        assert_eq!(global[0].1.count, 3);
        assert_eq!(global[0].1.users, vec![alice, bob]);
        assert_eq!(global.len(), USER_HISTORY_CAP + 10 + 1);
    }

    #[tokio::test]
    async fn not_found_board() {
        let dir = tempfile::tempdir().unwrap();
        let db = database(dir.path()).await;

        assert!(db.record_not_found("uwu").await.unwrap());
        assert!(db.record_not_found("owo").await.unwrap());
        assert!(db.record_not_found("owo").await.unwrap());
        assert!(db.record_not_found("ネコネコネ").await.unwrap());
        assert!(!db.record_not_found("toolong").await.unwrap());

        assert_eq!(
            db.not_found_board().await,
            vec![
                ("owo".to_string(), 2),
                ("uwu".to_string(), 1),
                ("ネコネコネ".to_string(), 1),
            ]
        );

        assert_eq!(db.leaderboard_message().await, None);
        db.set_leaderboard_message(MessageId(42)).await.unwrap();
        drop(db);
        let db = database(dir.path()).await;
        assert_eq!(db.leaderboard_message().await, Some(MessageId(42)));
    }

    #[tokio::test]
    async fn disabling_chats() {
        let dir = tempfile::tempdir().unwrap();
        let db = database(dir.path()).await;
        let chat = ChatId(-100500);

        assert!(!db.is_chat_disabled(chat).await);
        assert!(db.disable_chat(chat).await.unwrap());
        assert!(!db.disable_chat(chat).await.unwrap());
        assert!(db.is_chat_disabled(chat).await);

        drop(db);
        let db = database(dir.path()).await;
        assert!(db.is_chat_disabled(chat).await);
        assert!(db.enable_chat(chat).await.unwrap());
        assert!(!db.enable_chat(chat).await.unwrap());
        assert!(!db.is_chat_disabled(chat).await);
    }

    #[tokio::test]
    async fn first_search_only_once() {
        let dir = tempfile::tempdir().unwrap();
        let db = database(dir.path()).await;

        assert!(db.first_search(UserId(7)).await);
        assert!(!db.first_search(UserId(7)).await);
        assert!(db.first_search(UserId(8)).await);
    }
}
