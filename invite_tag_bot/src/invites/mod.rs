//! Invite link checking, one at a time or in bulk.

pub mod batch;
pub mod checker;
pub mod report;
pub mod retry;

use crate::{config::InviteReportConfig, types::TagSource};

use self::{
    batch::{run_batch_cancellable, BatchError, BatchProgress, CancelFlag},
    checker::InviteChecker,
    retry::with_retry,
};

/// One link to check, with what it's called and where it's from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteTask {
    pub link: String,
    pub label: String,
    pub source: TagSource,
}

/// How checking an [`InviteTask`] went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InviteResult<'a> {
    pub task: &'a InviteTask,
    /// [`None`] if the invite API never gave an answer, or if the
    /// report was stopped before this one got checked.
    pub valid: Option<bool>,
}

/// Check every task against the invite API, retrying failed checks.
///
/// Results come back in task order, one per task.
///
/// # Errors
/// Only [`BatchError`], which the config types make impossible.
pub async fn check_invites<'a, P>(
    checker: &InviteChecker,
    tasks: &'a [InviteTask],
    settings: &InviteReportConfig,
    on_progress: P,
    cancel: &CancelFlag,
) -> Result<Vec<InviteResult<'a>>, BatchError>
where
    P: FnMut(BatchProgress),
{
    let policy = settings.retry_policy();
    let policy = &policy;

    log::info!(
        "Checking {} invites, {} at a time...",
        tasks.len(),
        settings.concurrency
    );

    let results = run_batch_cancellable(
        tasks,
        move |task: &'a InviteTask| async move {
            with_retry(|| checker.is_valid(&task.link), policy).await
        },
        settings.concurrency.get(),
        on_progress,
        cancel,
    )
    .await?;

    let results: Vec<InviteResult> = tasks
        .iter()
        .zip(results)
        .map(|(task, valid)| InviteResult {
            task,
            valid: valid.flatten(),
        })
        .collect();

    log::info!(
        "Checked {} invites: {} invalid, {} undetermined.",
        results.len(),
        results.iter().filter(|r| r.valid == Some(false)).count(),
        results.iter().filter(|r| r.valid.is_none()).count(),
    );

    Ok(results)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn checker() -> InviteChecker {
        // Nothing listens there, so these tests must never reach the network.
        InviteChecker::new("http://127.0.0.1:9/", Duration::from_secs(1)).unwrap()
    }

    fn task(link: &str) -> InviteTask {
        InviteTask {
            link: link.to_string(),
            label: format!("> Tags: {link}"),
            source: TagSource::Db,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn links_without_a_code_are_invalid_right_away() {
        let tasks = vec![task("https://example.com/not-an-invite")];
        let settings = InviteReportConfig::default();
        let started = tokio::time::Instant::now();

        let mut progress = Vec::new();
        let results = check_invites(
            &checker(),
            &tasks,
            &settings,
            |p| progress.push(p),
            &CancelFlag::new(),
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].task, &tasks[0]);
        assert_eq!(results[0].valid, Some(false));
        assert_eq!(progress.len(), 1);
        // Never retried, so never backed off either.
        assert!(started.elapsed() < Duration::from_millis(settings.backoff_ms));
    }

    #[tokio::test]
    async fn stopped_reports_leave_everything_unchecked() {
        let tasks = vec![
            task("https://discord.gg/kawa12"),
            task("https://discord.gg/uwuowo"),
            task("https://discord.gg/nyanya"),
        ];
        let cancel = CancelFlag::new();
        cancel.cancel();

        let mut progress_calls = 0;
        let results = check_invites(
            &checker(),
            &tasks,
            &InviteReportConfig::default(),
            |_| progress_calls += 1,
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(results.len(), tasks.len());
        for (result, task) in results.iter().zip(&tasks) {
            assert_eq!(result.task, task);
            assert_eq!(result.valid, None);
        }
        assert_eq!(progress_calls, 0);
    }
}
