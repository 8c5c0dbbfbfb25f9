use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Fold decorative Unicode text down to plain ASCII.
///
/// Handles the usual "fancy font" generators: mathematical alphanumerics,
/// fullwidth and circled letters (compatibility decomposition), accents
/// (stripped), small capitals and regional indicator letters (mapped by
/// hand, Unicode doesn't decompose those). Whatever is still not ASCII
/// after that is dropped. Case is kept.
pub fn normalize_to_ascii(text: &str) -> String {
    text.nfkd()
        .map(fold_char)
        .filter(|&c| !is_combining_mark(c))
        .filter(char::is_ascii)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Whether both fold to the same ASCII, ignoring case.
pub fn same_when_normalized(a: &str, b: &str) -> bool {
    normalize_to_ascii(a).eq_ignore_ascii_case(&normalize_to_ascii(b))
}

fn fold_char(c: char) -> char {
    match c {
        // Regional indicators, the letters flag emoji are made of.
        '\u{1F1E6}'..='\u{1F1FF}' => {
            char::from(b'A' + (u32::from(c) - 0x1F1E6) as u8)
        }
        _ => small_capital(c).unwrap_or(c),
    }
}

fn small_capital(c: char) -> Option<char> {
    Some(match c {
        'ᴀ' => 'A',
        'ʙ' => 'B',
        'ᴄ' => 'C',
        'ᴅ' => 'D',
        'ᴇ' => 'E',
        'ꜰ' => 'F',
        'ɢ' => 'G',
        'ʜ' => 'H',
        'ɪ' => 'I',
        'ᴊ' => 'J',
        'ᴋ' => 'K',
        'ʟ' => 'L',
        'ᴍ' => 'M',
        'ɴ' => 'N',
        'ᴏ' => 'O',
        'ᴘ' => 'P',
        'ǫ' => 'Q',
        'ʀ' => 'R',
        'ꜱ' => 'S',
        'ᴛ' => 'T',
        'ᴜ' => 'U',
        'ᴠ' => 'V',
        'ᴡ' => 'W',
        'ʏ' => 'Y',
        'ᴢ' => 'Z',
        _ => return None,
    })
}
