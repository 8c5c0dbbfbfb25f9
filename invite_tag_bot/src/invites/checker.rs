use std::{sync::LazyLock, time::Duration};

use regex::Regex;
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

/// Where invite links point to.
pub const INVITE_LINK_BASE: &str = "https://discord.gg/";

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("No invite code in {0:?}")]
    NoCode(String),
    #[error("Rate limited by the invite API")]
    RateLimited,
    #[error("Invite API responded with {0}")]
    Status(StatusCode),
    #[error("Bad invite API URL: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Request(#[from] reqwest::Error),
}

/// What the invite API told us about a valid invite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InviteInfo {
    pub guild_name: Option<String>,
    pub approximate_member_count: Option<u64>,
    pub expires_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InviteStatus {
    Valid(InviteInfo),
    Invalid,
}

impl InviteStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, InviteStatus::Valid(_))
    }
}

#[derive(Deserialize)]
struct InviteResponse {
    guild: Option<GuildResponse>,
    approximate_member_count: Option<u64>,
    expires_at: Option<String>,
}

#[derive(Deserialize)]
struct GuildResponse {
    name: Option<String>,
}

/// Extract the invite code out of an invite link, or a bare code.
///
/// Returns [`None`] if there's nothing that looks like a code.
pub fn invite_code(link: &str) -> Option<&str> {
    static PREFIX: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)^(?:https?://)?(?:www\.)?(?:discord\.gg/|(?:discord|discordapp)\.com/invite/)")
            .expect("Regex will always be valid")
    });
    static CODE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[A-Za-z0-9-]+$").expect("Regex will always be valid"));

    let link = link.trim();
    let rest = match PREFIX.find(link) {
        Some(prefix) => &link[prefix.end()..],
        None => link,
    };
    let code = rest.split(['/', '?', '#']).next().unwrap_or_default();

    CODE.is_match(code).then_some(code)
}

/// Turn what a user typed into an invite link: bare codes of at least
/// 6 word characters get the invite base prepended, everything else is
/// left as is.
pub fn normalize_invite_link(input: &str) -> String {
    static BARE_CODE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^\w{6,}").expect("Regex will always be valid"));
    static HAS_SCHEME: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)^https?://").expect("Regex will always be valid"));

    let input = input.trim();
    if BARE_CODE.is_match(input) && !HAS_SCHEME.is_match(input) {
        format!("{INVITE_LINK_BASE}{input}")
    } else {
        input.to_string()
    }
}

/// Checks invite links against the invite API.
pub struct InviteChecker {
    client: reqwest::Client,
    api_url: Url,
}

impl InviteChecker {
    /// `api_url` is the API base, like `https://discord.com/api/v9/`.
    ///
    /// # Errors
    /// Errors if the URL doesn't parse or the HTTP client can't be built.
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self, CheckError> {
        let mut api_url = Url::parse(api_url)?;
        // Url::join treats the last segment as a file without this.
        if !api_url.path().ends_with('/') {
            let path = format!("{}/", api_url.path());
            api_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; DiscordBot/1.0)")
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(InviteChecker { client, api_url })
    }

    fn request_url(&self, code: &str) -> Result<Url, CheckError> {
        let mut url = self.api_url.join("invites/")?.join(code)?;
        url.query_pairs_mut()
            .append_pair("with_counts", "true")
            .append_pair("with_expiration", "true");
        Ok(url)
    }

    /// Ask the API about this invite.
    ///
    /// # Errors
    /// Errors on anything that isn't a definite answer: transport errors,
    /// rate limiting, unexpected statuses, unparsable responses.
    pub async fn check(&self, link: &str) -> Result<InviteStatus, CheckError> {
        let code = invite_code(link).ok_or_else(|| CheckError::NoCode(link.to_string()))?;
        let url = self.request_url(code)?;

        let response = self.client.get(url).send().await?;

        match response.status() {
            StatusCode::OK => (),
            StatusCode::NOT_FOUND => return Ok(InviteStatus::Invalid),
            StatusCode::TOO_MANY_REQUESTS => return Err(CheckError::RateLimited),
            status => return Err(CheckError::Status(status)),
        }

        let body: InviteResponse = response.json().await?;

        let Some(guild) = body.guild else {
            // Group DM invites and the like. Not what tags are for.
            return Ok(InviteStatus::Invalid);
        };

        Ok(InviteStatus::Valid(InviteInfo {
            guild_name: guild.name,
            approximate_member_count: body.approximate_member_count,
            expires_at: body.expires_at,
        }))
    }

    /// [`InviteChecker::check`] boiled down to validity, for batch runs.
    ///
    /// A link with no invite code in it is invalid, not an error, so it
    /// doesn't get retried.
    ///
    /// # Errors
    /// Same as [`InviteChecker::check`], except for [`CheckError::NoCode`].
    pub async fn is_valid(&self, link: &str) -> Result<bool, CheckError> {
        match self.check(link).await {
            Ok(status) => Ok(status.is_valid()),
            Err(CheckError::NoCode(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracting_invite_codes() {
        assert_eq!(invite_code("https://discord.gg/abcDEF"), Some("abcDEF"));
        assert_eq!(invite_code("http://www.discord.gg/abc-12/"), Some("abc-12"));
        assert_eq!(invite_code("https://discord.com/invite/xyz123"), Some("xyz123"));
        assert_eq!(
            invite_code("https://discordapp.com/invite/xyz123?event=1"),
            Some("xyz123")
        );
        assert_eq!(invite_code("discord.gg/qwerty#hi"), Some("qwerty"));
        assert_eq!(invite_code("  qwerty  "), Some("qwerty"));
        assert_eq!(invite_code("https://discord.gg/"), None);
        assert_eq!(invite_code("what is this"), None);
    }

    #[test]
    fn normalizing_links() {
        assert_eq!(normalize_invite_link("abcdef"), "https://discord.gg/abcdef");
        assert_eq!(normalize_invite_link(" abc "), "abc");
        assert_eq!(
            normalize_invite_link("https://discord.gg/abcdef"),
            "https://discord.gg/abcdef"
        );
        assert_eq!(
            normalize_invite_link("HTTPS://discord.gg/abcdef"),
            "HTTPS://discord.gg/abcdef"
        );
    }

    #[test]
    fn request_urls() {
        let checker = InviteChecker::new("https://discord.com/api/v9", Duration::from_secs(1))
            .unwrap();
        assert_eq!(
            checker.request_url("abc123").unwrap().as_str(),
            "https://discord.com/api/v9/invites/abc123?with_counts=true&with_expiration=true"
        );
    }

    #[tokio::test]
    async fn links_without_a_code_are_invalid() {
        // Nothing listens there, and nothing should be asked anyway.
        let checker =
            InviteChecker::new("http://127.0.0.1:9/", Duration::from_secs(1)).unwrap();
        let link = "https://example.com/not-an-invite";

        assert!(matches!(
            checker.check(link).await,
            Err(CheckError::NoCode(_))
        ));
        assert!(!checker.is_valid(link).await.unwrap());
    }

    #[test]
    fn parsing_responses() {
        let body: InviteResponse = serde_json::from_str(
            r#"{"code": "abc", "guild": {"id": "1", "name": "Cool Server"},
                "approximate_member_count": 1234, "expires_at": null}"#,
        )
        .unwrap();
        assert_eq!(body.guild.unwrap().name.as_deref(), Some("Cool Server"));
        assert_eq!(body.approximate_member_count, Some(1234));

        let body: InviteResponse = serde_json::from_str(r#"{"code": "abc"}"#).unwrap();
        assert!(body.guild.is_none());
    }
}
