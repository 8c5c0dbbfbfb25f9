use std::collections::HashMap;

use bot_commons::{teloxide_retry, useful_methods::*};
use html_escape::encode_text;
use teloxide::{
    prelude::*,
    sugar::request::RequestReplyExt,
    types::{ChatId, MessageId},
    ApiError, RequestError,
};
use tokio::sync::{watch, Mutex};

use crate::invites::{
    batch::{BatchProgress, CancelFlag},
    check_invites,
    checker::{normalize_invite_link, CheckError, InviteInfo, InviteStatus},
    report::summarize,
};

use super::{
    commands::{CommandParams, Ret},
    Deps,
};

/// Invite reports currently running, at most one per chat.
#[derive(Default)]
pub struct ReportRegistry {
    running: Mutex<HashMap<ChatId, CancelFlag>>,
}

impl ReportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a report in this chat. Returns [`None`] if one is
    /// already running there.
    pub async fn start(&self, chat: ChatId) -> Option<CancelFlag> {
        let mut running = self.running.lock().await;
        if running.contains_key(&chat) {
            return None;
        }
        let cancel = CancelFlag::new();
        running.insert(chat, cancel.clone());
        Some(cancel)
    }

    /// Ask the report in this chat to stop. Returns `false` if there's none.
    pub async fn cancel(&self, chat: ChatId) -> bool {
        match self.running.lock().await.get(&chat) {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn finish(&self, chat: ChatId) {
        self.running.lock().await.remove(&chat);
    }
}

fn render_info(link: &str, info: &InviteInfo) -> String {
    let mut text = format!("✅ This invite is valid.\n{}", encode_text(link));
    if let Some(name) = &info.guild_name {
        text += &format!("\n\nServer: <b>{}</b>", encode_text(name));
    }
    if let Some(members) = info.approximate_member_count {
        text += &format!("\nMembers: ~{members}");
    }
    match &info.expires_at {
        Some(expires_at) => text += &format!("\nExpires: {}", encode_text(expires_at)),
        None => text += "\nNever expires.",
    }
    text
}

pub async fn check(tp: CommandParams<'_>) -> Ret {
    let params = tp.get_params();
    if params.is_empty() {
        return tp.reply("Usage: <code>/check invite_link</code>").await;
    }
    let link = normalize_invite_link(params);

    tp.bot.typing(tp.chat_id()).await?;

    let text = match tp.deps.checker.check(&link).await {
        Ok(InviteStatus::Valid(info)) => render_info(&link, &info),
        Ok(InviteStatus::Invalid) => "❌ This invite is invalid or expired.".to_string(),
        Err(CheckError::NoCode(_)) => "That doesn't look like an invite link.".to_string(),
        Err(CheckError::RateLimited) => {
            "The invite API is rate limiting me, try again in a bit.".to_string()
        }
        Err(e) => {
            log::warn!("Failed to check invite {link}: {e}");
            format!("Couldn't check that invite: {}", encode_text(&e.to_string()))
        }
    };

    tp.reply(&text).await
}

fn render_progress(progress: BatchProgress) -> String {
    if progress.is_final() {
        return format!("Checked all {} invites. Writing the report...", progress.total);
    }
    format!(
        "Checking invites... {}/{}\nAbout {}s left.",
        progress.completed, progress.total, progress.eta_secs
    )
}

pub async fn invitereport(tp: CommandParams<'_>) -> Ret {
    if tp.privileged_sender().await?.is_none() {
        return Ok(());
    }

    let chat = tp.chat_id();
    let reports = &tp.deps.reports;
    let Some(cancel) = reports.start(chat).await else {
        return tp
            .reply("A report is already running here. Stop it with /stopreport.")
            .await;
    };

    let status = match teloxide_retry!(
        tp.bot
            .send_message(chat, "Starting the invite report...")
            .reply_to(tp.message.id)
            .await
    ) {
        Ok(status) => status,
        Err(e) => {
            reports.finish(chat).await;
            return Err(e);
        }
    };

    tokio::spawn(run_report(
        tp.bot.clone(),
        tp.deps.clone(),
        chat,
        status.id,
        tp.message.id,
        cancel,
    ));

    Ok(())
}

/// Check every stored invite and post the report. Runs on its own task so
/// the chat stays responsive, `/stopreport` included.
async fn run_report(
    bot: Bot,
    deps: Deps,
    chat: ChatId,
    status: MessageId,
    reply_to: MessageId,
    cancel: CancelFlag,
) {
    let tasks = deps.database.invite_tasks().await;
    let settings = &deps.config.invite_report;
    let stride = settings.progress_stride.get();

    // Progress goes through a channel so a slow edit never holds up checking.
    // Only the latest snapshot matters.
    let (progress_tx, mut progress_rx) = watch::channel(None::<BatchProgress>);
    let updater = {
        let bot = bot.clone();
        tokio::spawn(async move {
            while progress_rx.changed().await.is_ok() {
                let Some(progress) = *progress_rx.borrow_and_update() else {
                    continue;
                };
                let text = render_progress(progress);
                match teloxide_retry!(bot.edit_message_text(chat, status, &text).await) {
                    Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => (),
                    Err(e) => log::warn!("Failed to update report progress in {chat}: {e}"),
                }
            }
        })
    };

    let results = check_invites(
        &deps.checker,
        &tasks,
        settings,
        |progress| {
            if progress.should_report(stride) {
                progress_tx.send_replace(Some(progress));
            }
        },
        &cancel,
    )
    .await;

    drop(progress_tx);
    if let Err(e) = updater.await {
        log::error!("Report progress updater died: {e}");
    }
    deps.reports.finish(chat).await;

    let text = match results {
        Ok(results) => {
            let mut text = summarize(&tasks, &results).render();
            if cancel.is_cancelled() {
                text.insert_str(0, "⚠️ Stopped early. Unchecked invites count as not checked.\n\n");
            }
            text
        }
        Err(e) => {
            log::error!("Invite report failed: {e}");
            format!("Invite report failed: {e}")
        }
    };

    if let Err(e) = bot
        .archsendmsg_no_link_preview(chat, text.as_str(), reply_to)
        .await
    {
        log::error!("Failed to send the invite report to {chat}: {e}");
    }
}

pub async fn stopreport(tp: CommandParams<'_>) -> Ret {
    if tp.privileged_sender().await?.is_none() {
        return Ok(());
    }

    if tp.deps.reports.cancel(tp.chat_id()).await {
        tp.reply("Stopping the report. Whatever got checked so far will be posted.")
            .await
    } else {
        tp.reply("No report is running here.").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn one_report_per_chat() {
        let registry = ReportRegistry::new();
        let chat = ChatId(-100);
        let other = ChatId(-200);

        let cancel = registry.start(chat).await.unwrap();
        assert!(registry.start(chat).await.is_none());
        assert!(registry.start(other).await.is_some());

        assert!(!cancel.is_cancelled());
        assert!(registry.cancel(chat).await);
        assert!(cancel.is_cancelled());

        registry.finish(chat).await;
        assert!(!registry.cancel(chat).await);
        assert!(registry.start(chat).await.is_some());
    }

    #[test]
    fn progress_text() {
        let progress = BatchProgress {
            completed: 10,
            total: 47,
            eta_secs: 3,
        };
        assert_eq!(
            render_progress(progress),
            "Checking invites... 10/47\nAbout 3s left."
        );

        let done = BatchProgress {
            completed: 47,
            total: 47,
            eta_secs: 1,
        };
        assert!(render_progress(done).starts_with("Checked all 47 invites."));
    }

    #[test]
    fn invite_info_text() {
        let info = InviteInfo {
            guild_name: Some("Cute <Server>".to_string()),
            approximate_member_count: Some(1234),
            expires_at: None,
        };
        let text = render_info("https://discord.gg/abc", &info);
        assert!(text.contains("Server: <b>Cute &lt;Server&gt;</b>"));
        assert!(text.contains("Members: ~1234"));
        assert!(text.ends_with("Never expires."));
    }
}
