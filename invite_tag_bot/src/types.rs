use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

/// Prefix every tag added through the bot gets in its name.
pub const TAG_NAME_PREFIX: &str = "> Tags: ";

/// A tag from the main tag file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub link: String,
    /// Explicit language, overriding detection by the characters in the name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Tag {
    /// Make a tag as added by a user, with the name prefix applied.
    pub fn new_prefixed(name: &str, link: String) -> Self {
        Tag {
            name: format!("{TAG_NAME_PREFIX}{}", name.trim()),
            link,
            language: None,
        }
    }
}

/// A tag from the fonted tag file, written in decorative Unicode,
/// with a plain searchable keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontedTag {
    pub name: String,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
}

/// Which file a tag came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagSource {
    Db,
    Fonted,
}

impl TagSource {
    pub fn file_name(self) -> &'static str {
        match self {
            TagSource::Db => "DBTag.json",
            TagSource::Fonted => "Fonted.json",
        }
    }
}

impl Display for TagSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.file_name())
    }
}

/// A tag of either kind, borrowed, for displaying search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagRef<'a> {
    pub name: &'a str,
    pub link: &'a str,
    pub source: TagSource,
}

impl<'a> From<&'a Tag> for TagRef<'a> {
    fn from(tag: &'a Tag) -> Self {
        TagRef {
            name: &tag.name,
            link: &tag.link,
            source: TagSource::Db,
        }
    }
}

impl<'a> From<&'a FontedTag> for TagRef<'a> {
    fn from(tag: &'a FontedTag) -> Self {
        TagRef {
            name: &tag.name,
            link: &tag.link,
            source: TagSource::Fonted,
        }
    }
}

/// Languages that can be listed with `/show`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Chinese,
    Korean,
    Japanese,
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown language {0:?}")]
pub struct UnknownLanguage(String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chinese" => Ok(Language::Chinese),
            "korean" => Ok(Language::Korean),
            "japanese" => Ok(Language::Japanese),
            _ => Err(UnknownLanguage(s.to_string())),
        }
    }
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Chinese => "chinese",
            Language::Korean => "korean",
            Language::Japanese => "japanese",
        }
    }

    /// Capitalized name, for titles.
    pub fn title(self) -> &'static str {
        match self {
            Language::Chinese => "Chinese",
            Language::Korean => "Korean",
            Language::Japanese => "Japanese",
        }
    }

    /// Whether this character is written in this language's script.
    pub fn has_char(self, c: char) -> bool {
        match self {
            Language::Chinese => ('\u{4e00}'..='\u{9fff}').contains(&c),
            Language::Korean => ('\u{ac00}'..='\u{d7af}').contains(&c),
            Language::Japanese => {
                ('\u{3040}'..='\u{30ff}').contains(&c) || ('\u{31f0}'..='\u{31ff}').contains(&c)
            }
        }
    }

    /// Whether the tag is in this language, either by its explicit
    /// language field or by the script of its name.
    pub fn matches(self, tag: &Tag) -> bool {
        match &tag.language {
            Some(language) => language.eq_ignore_ascii_case(self.as_str()),
            None => tag.name.chars().any(|c| self.has_char(c)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(name: &str, language: Option<&str>) -> Tag {
        Tag {
            name: name.to_string(),
            link: "https://discord.gg/abcdef".to_string(),
            language: language.map(str::to_string),
        }
    }

    #[test]
    fn language_detection() {
        assert!(Language::Chinese.matches(&tag("> Tags: 中文", None)));
        assert!(Language::Korean.matches(&tag("> Tags: 한국", None)));
        assert!(Language::Japanese.matches(&tag("> Tags: かわいい", None)));
        assert!(!Language::Japanese.matches(&tag("> Tags: KAWAII", None)));

        // Explicit field wins over the script.
        assert!(Language::Japanese.matches(&tag("> Tags: 中文", Some("Japanese"))));
        assert!(!Language::Chinese.matches(&tag("> Tags: 中文", Some("japanese"))));
    }

    #[test]
    fn parsing_languages() {
        assert_eq!("chinese".parse::<Language>().unwrap(), Language::Chinese);
        assert_eq!(" Korean ".parse::<Language>().unwrap(), Language::Korean);
        assert_eq!("JAPANESE".parse::<Language>().unwrap(), Language::Japanese);
        assert!("symbols".parse::<Language>().is_err());
        assert!("".parse::<Language>().is_err());
    }

    #[test]
    fn tag_files_parse() {
        let tags: Vec<Tag> = serde_json::from_str(
            r#"[{"name": "> Tags: KAWA", "link": "https://discord.gg/kawa12"},
                {"name": "> Tags: 中文", "link": "https://discord.gg/zh1234", "language": "chinese"}]"#,
        )
        .unwrap();
        assert_eq!(tags[0].language, None);
        assert_eq!(tags[1].language.as_deref(), Some("chinese"));

        let fonted: Vec<FontedTag> = serde_json::from_str(
            r#"[{"name": "𝓚𝓐𝓦𝓐", "link": "https://discord.gg/kawa34", "keyword": "KAWA"}]"#,
        )
        .unwrap();
        assert_eq!(fonted[0].keyword.as_deref(), Some("KAWA"));

        // Written back without the absent optional fields.
        let written = serde_json::to_string(&tags[0]).unwrap();
        assert!(!written.contains("language"));
    }

    #[test]
    fn prefixed_names() {
        let tag = Tag::new_prefixed("  KAWA ", "https://discord.gg/kawa12".to_string());
        assert_eq!(tag.name, "> Tags: KAWA");
    }
}
