//! Finding tags by what users type.

pub mod fuzzy;
pub mod normalize;

use crate::types::{FontedTag, Language, Tag, TagRef};

use self::normalize::same_when_normalized;

/// Things people look for with `/show symbols`.
pub const SYMBOLS: &[&str] = &["<3", ":3", ";(", ":p", ":D", ":P", ":/", ";p"];

/// Faces offered as filters on the symbols listing.
pub const FACES: &[&str] = &[
    ">_<", "0_0", "^_^", "^-^", "^w^", "UwU", "OwO", "oWo", ":3", ":p", ":P", "<3",
];

/// The searchable part of a tag name: whatever comes after the last `:`.
///
/// `"> Tags: KAWA"` gives `"KAWA"`.
pub fn keyword_of(name: &str) -> &str {
    match name.rfind(':') {
        Some(colon) => name[colon + 1..].trim(),
        None => name.trim(),
    }
}

/// Non-ASCII queries are compared as typed, since normalizing would
/// throw most of them away.
fn keyword_matches(keyword: &str, query: &str) -> bool {
    let keyword = keyword.trim();
    if query.is_ascii() {
        same_when_normalized(keyword, query)
    } else {
        keyword == query || keyword.to_lowercase() == query.to_lowercase()
    }
}

/// Tags from `DBTag.json` whose keyword is the query, in any font.
pub fn search_normalized<'a>(query: &str, tags: &'a [Tag]) -> Vec<&'a Tag> {
    let query = query.trim();
    tags.iter()
        .filter(|tag| keyword_matches(keyword_of(&tag.name), query))
        .collect()
}

/// Tags from `Fonted.json` whose keyword field is the query.
pub fn search_keyword<'a>(query: &str, tags: &'a [FontedTag]) -> Vec<&'a FontedTag> {
    let query = query.trim();
    tags.iter()
        .filter(|tag| {
            tag.keyword
                .as_deref()
                .is_some_and(|keyword| keyword_matches(keyword, query))
        })
        .collect()
}

/// Regional indicator letters are left out, those are fancy text
/// rather than emoji when they're not paired into flags.
fn is_emoji(c: char) -> bool {
    matches!(c,
        '\u{231A}'..='\u{27BF}'
        | '\u{2B00}'..='\u{2BFF}'
        | '\u{1F000}'..='\u{1F1E5}'
        | '\u{1F200}'..='\u{1FAFF}'
    )
}

pub fn contains_emoji(text: &str) -> bool {
    text.chars().any(is_emoji)
}

/// Tags with this text anywhere in their name or keyword.
fn search_substring<'a>(
    needle: &str,
    tags: &'a [Tag],
    fonted: &'a [FontedTag],
) -> (Vec<&'a FontedTag>, Vec<&'a Tag>) {
    let fonted = fonted
        .iter()
        .filter(|tag| {
            tag.name.contains(needle)
                || tag.keyword.as_deref().is_some_and(|k| k.contains(needle))
        })
        .collect();
    let tags = tags.iter().filter(|tag| tag.name.contains(needle)).collect();
    (fonted, tags)
}

/// How a search went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome<'a> {
    /// Proper matches. Fonted ones go first when showing them.
    Found {
        fonted: Vec<&'a FontedTag>,
        db: Vec<&'a Tag>,
    },
    /// Nothing matched properly, but these look close, best first.
    Fuzzy(Vec<&'a Tag>),
    NotFound,
}

impl<'a> SearchOutcome<'a> {
    /// Every result in display order.
    pub fn tags(&self) -> Vec<TagRef<'a>> {
        match self {
            SearchOutcome::Found { fonted, db } => fonted
                .iter()
                .map(|&tag| TagRef::from(tag))
                .chain(db.iter().map(|&tag| TagRef::from(tag)))
                .collect(),
            SearchOutcome::Fuzzy(tags) => tags.iter().map(|&tag| TagRef::from(tag)).collect(),
            SearchOutcome::NotFound => Vec::new(),
        }
    }

    pub fn is_found(&self) -> bool {
        !matches!(self, SearchOutcome::NotFound)
    }
}

/// Search both tag files.
///
/// Queries with emoji look for the emoji as is, and if that finds nothing,
/// for just the first emoji in it. Other queries match keywords. Only if
/// that finds nothing, `DBTag.json` is searched fuzzily.
pub fn search<'a>(query: &str, tags: &'a [Tag], fonted: &'a [FontedTag]) -> SearchOutcome<'a> {
    let query = query.trim();
    if query.is_empty() {
        return SearchOutcome::NotFound;
    }

    let (found_fonted, found_db) = if contains_emoji(query) {
        let (mut found_fonted, mut found_db) = search_substring(query, tags, fonted);
        if found_fonted.is_empty() && found_db.is_empty() {
            if let Some(emoji) = query.chars().find(|&c| is_emoji(c)) {
                (found_fonted, found_db) =
                    search_substring(emoji.encode_utf8(&mut [0; 4]), tags, fonted);
            }
        }
        (found_fonted, found_db)
    } else {
        (search_keyword(query, fonted), search_normalized(query, tags))
    };

    if !found_fonted.is_empty() || !found_db.is_empty() {
        return SearchOutcome::Found {
            fonted: found_fonted,
            db: found_db,
        };
    }

    let close = fuzzy::search(query, tags, |tag| tag.name.as_str());
    if close.is_empty() {
        SearchOutcome::NotFound
    } else {
        SearchOutcome::Fuzzy(close)
    }
}

/// `DBTag.json` tags in this language.
pub fn by_language(language: Language, tags: &[Tag]) -> Vec<&Tag> {
    tags.iter().filter(|tag| language.matches(tag)).collect()
}

/// Tags from both files that have any of [`SYMBOLS`] in them.
pub fn with_symbols<'a>(tags: &'a [Tag], fonted: &'a [FontedTag]) -> Vec<TagRef<'a>> {
    let has_symbol = |text: &str| SYMBOLS.iter().any(|symbol| text.contains(symbol));

    let db = tags
        .iter()
        .filter(|tag| has_symbol(&tag.name))
        .map(TagRef::from);
    let fonted = fonted
        .iter()
        .filter(|tag| has_symbol(&tag.name) || tag.keyword.as_deref().is_some_and(has_symbol))
        .map(TagRef::from);

    db.chain(fonted).collect()
}

/// [`FACES`], the ones present in `tags` first.
pub fn faces_by_presence(tags: &[TagRef]) -> Vec<&'static str> {
    let (mut present, absent): (Vec<&str>, Vec<&str>) = FACES
        .iter()
        .partition(|face| tags.iter().any(|tag| tag.name.contains(**face)));
    present.extend(absent);
    present
}

/// Only the tags with this face in their name.
pub fn with_face<'a>(tags: &[TagRef<'a>], face: &str) -> Vec<TagRef<'a>> {
    tags.iter()
        .filter(|tag| tag.name.contains(face))
        .copied()
        .collect()
}
