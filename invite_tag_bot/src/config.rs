use std::{
    num::{NonZeroU32, NonZeroU64, NonZeroUsize},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use teloxide::types::{ChatId, UserId};

use crate::invites::retry::RetryPolicy;

/// Where the config is looked for, relative to the working directory.
pub const CONFIG_PATH: &str = "config.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Could not parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Bot configuration. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory with the JSON data files.
    pub data_dir: PathBuf,
    /// Users that may edit tags and run invite reports, in addition to
    /// members of the control chat.
    pub privileged_users: Vec<UserId>,
    pub control_chat_id: Option<ChatId>,
    /// Chat where the not-found leaderboard is kept.
    pub log_chat_id: Option<ChatId>,
    pub discord_api_url: String,
    pub invite_report: InviteReportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("."),
            privileged_users: Vec::new(),
            control_chat_id: None,
            log_chat_id: None,
            discord_api_url: "https://discord.com/api/v9/".to_string(),
            invite_report: InviteReportConfig::default(),
        }
    }
}

impl Config {
    /// Load the config from this path. A missing file gives the defaults.
    ///
    /// # Errors
    /// Errors if the file exists but can't be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No {}, using default config.", path.display());
                return Ok(Config::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_owned(),
                    source,
                })
            }
        };

        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }
}

/// Knobs for `/invitereport`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InviteReportConfig {
    /// Checks in flight at once.
    pub concurrency: NonZeroUsize,
    pub max_attempts: NonZeroU32,
    /// Linear backoff unit between attempts, in milliseconds.
    pub backoff_ms: u64,
    /// Per-attempt time limit. `null` means only the HTTP client timeout applies.
    pub attempt_timeout_secs: Option<NonZeroU64>,
    /// Edit the progress message every this many completions.
    pub progress_stride: NonZeroUsize,
}

impl Default for InviteReportConfig {
    fn default() -> Self {
        InviteReportConfig {
            concurrency: NonZeroUsize::new(20).expect("20 is not zero"),
            max_attempts: NonZeroU32::new(2).expect("2 is not zero"),
            backoff_ms: 800,
            attempt_timeout_secs: NonZeroU64::new(10),
            progress_stride: NonZeroUsize::new(10).expect("10 is not zero"),
        }
    }
}

impl InviteReportConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: Duration::from_millis(self.backoff_ms),
            attempt_timeout: self
                .attempt_timeout_secs
                .map(|secs| Duration::from_secs(secs.get())),
        }
    }

    /// Timeout for a single HTTP request to the invite API.
    pub fn request_timeout(&self) -> Duration {
        self.attempt_timeout_secs
            .map_or(Duration::from_secs(10), |secs| Duration::from_secs(secs.get()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.invite_report.concurrency.get(), 20);
        assert_eq!(config.invite_report.max_attempts.get(), 2);

        let policy = config.invite_report.retry_policy();
        assert_eq!(policy.backoff, Duration::from_millis(800));
        assert_eq!(policy.attempt_timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn partial_config() {
        let config: Config = serde_json::from_str(
            r#"{
                "privileged_users": [1234, 5678],
                "log_chat_id": -100123,
                "invite_report": {"concurrency": 5, "attempt_timeout_secs": null}
            }"#,
        )
        .unwrap();

        assert_eq!(config.privileged_users, vec![UserId(1234), UserId(5678)]);
        assert_eq!(config.log_chat_id, Some(ChatId(-100123)));
        assert_eq!(config.control_chat_id, None);
        assert_eq!(config.invite_report.concurrency.get(), 5);
        assert_eq!(config.invite_report.max_attempts.get(), 2);
        assert_eq!(config.invite_report.retry_policy().attempt_timeout, None);
    }

    #[test]
    fn zero_limits_are_rejected() {
        assert!(serde_json::from_str::<Config>(r#"{"invite_report": {"concurrency": 0}}"#).is_err());
        assert!(
            serde_json::from_str::<Config>(r#"{"invite_report": {"max_attempts": 0}}"#).is_err()
        );
    }

    #[test]
    fn typos_are_rejected() {
        assert!(serde_json::from_str::<Config>(r#"{"privileged_user": [1]}"#).is_err());
    }

    #[test]
    fn loading_from_files() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("nope.json");
        assert_eq!(Config::load(&missing).unwrap(), Config::default());

        let path = dir.path().join("config.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{"data_dir": "data"}}"#).unwrap();
        drop(file);
        assert_eq!(Config::load(&path).unwrap().data_dir, PathBuf::from("data"));

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
