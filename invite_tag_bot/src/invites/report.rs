use std::fmt::Write;

use html_escape::encode_text;

use super::{InviteResult, InviteTask};

/// Outcome of an invite report, ready to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary<'a> {
    pub total: usize,
    /// Tasks confirmed invalid, in task order. Undetermined ones are not here.
    pub invalid: Vec<&'a InviteTask>,
    /// Tasks that couldn't be checked.
    pub undetermined: usize,
}

/// Pair every task with its result and pick out the confirmed-invalid ones.
///
/// # Panics
/// Panics if the lengths differ. The batch runner always gives one result per task.
pub fn summarize<'a>(tasks: &'a [InviteTask], results: &[InviteResult<'_>]) -> Summary<'a> {
    assert_eq!(
        tasks.len(),
        results.len(),
        "Every task must have exactly one result"
    );

    let mut invalid = Vec::new();
    let mut undetermined = 0;

    for (task, result) in tasks.iter().zip(results) {
        match result.valid {
            Some(false) => invalid.push(task),
            None => undetermined += 1,
            Some(true) => (),
        }
    }

    Summary {
        total: tasks.len(),
        invalid,
        undetermined,
    }
}

impl Summary<'_> {
    /// Report text, HTML formatted, one fact per line so it splits nicely.
    pub fn render(&self) -> String {
        let mut text = String::new();
        // Writing to a String never fails.
        let _ = writeln!(text, "Checked <b>{}</b> invites.", self.total);
        let _ = writeln!(text, "Invalid: <b>{}</b>", self.invalid.len());
        if self.undetermined > 0 {
            let _ = writeln!(
                text,
                "Could not be checked: <b>{}</b> (rate limited or unreachable, try again later)",
                self.undetermined
            );
        }

        if self.invalid.is_empty() {
            if self.undetermined == 0 {
                text.push_str("\nAll invites are valid!\n");
            }
            return text;
        }

        text.push_str("\n<b>Invalid Invites:</b>\n");
        for (i, task) in self.invalid.iter().enumerate() {
            let _ = writeln!(
                text,
                "{}. {} ({})",
                i + 1,
                encode_text(&task.label),
                task.source
            );
            let _ = writeln!(text, "{}", encode_text(&task.link));
        }

        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TagSource;

    fn tasks(count: usize) -> Vec<InviteTask> {
        (0..count)
            .map(|i| InviteTask {
                link: format!("https://discord.gg/code{i}"),
                label: format!("> Tags: T{i}"),
                source: if i % 2 == 0 {
                    TagSource::Db
                } else {
                    TagSource::Fonted
                },
            })
            .collect()
    }

    fn results<'a>(tasks: &'a [InviteTask], valid: &[Option<bool>]) -> Vec<InviteResult<'a>> {
        assert_eq!(tasks.len(), valid.len());
        tasks
            .iter()
            .zip(valid)
            .map(|(task, &valid)| InviteResult { task, valid })
            .collect()
    }

    #[test]
    fn only_confirmed_invalid_is_invalid() {
        let tasks = tasks(5);
        let results = results(&tasks, &[Some(true), Some(false), None, Some(false), Some(true)]);
        let summary = summarize(&tasks, &results);

        assert_eq!(summary.total, 5);
        assert_eq!(summary.invalid, vec![&tasks[1], &tasks[3]]);
        assert_eq!(summary.undetermined, 1);
    }

    #[test]
    fn rendering() {
        let mut tasks = tasks(3);
        tasks[1].label = "> Tags: <3".to_string();
        let results = results(&tasks, &[Some(true), Some(false), None]);
        let text = summarize(&tasks, &results).render();

        assert!(text.starts_with("Checked <b>3</b> invites.\nInvalid: <b>1</b>\n"));
        assert!(text.contains("Could not be checked: <b>1</b>"));
        assert!(text.contains("1. &gt; Tags: &lt;3 (Fonted.json)\nhttps://discord.gg/code1\n"));
        assert!(!text.contains("All invites are valid"));

        let results = self::results(&tasks, &[Some(true); 3]);
        let text = summarize(&tasks, &results).render();
        assert!(text.ends_with("All invites are valid!\n"));
    }

    #[test]
    #[should_panic]
    fn mismatched_lengths() {
        let tasks = tasks(2);
        let results = results(&tasks[..1], &[Some(true)]);
        summarize(&tasks, &results);
    }
}
