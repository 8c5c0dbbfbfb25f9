/// Scores above this are not considered matches.
pub const THRESHOLD: f64 = 0.4;

/// How many characters into the text a match may start before that alone
/// costs a whole point of score.
pub const DISTANCE: f64 = 100.0;

/// Shorter patterns match too much to be useful.
pub const MIN_PATTERN_LEN: usize = 2;

/// Approximate substring score of `pattern` in `text`, case-insensitive.
///
/// Finds the substring of `text` with the fewest edits away from `pattern`,
/// and scores it as `edits / pattern_len + match_start / DISTANCE`, so 0 is
/// an exact match at the very start. Returns [`None`] if the best score is
/// over [`THRESHOLD`] or the pattern is too short.
pub fn score(pattern: &str, text: &str) -> Option<f64> {
    let pattern: Vec<char> = pattern.trim().chars().flat_map(char::to_lowercase).collect();
    if pattern.len() < MIN_PATTERN_LEN {
        return None;
    }
    let m = pattern.len();

    // Column of the edit distance table for the text consumed so far:
    // (edits, where in the text the match started) per pattern prefix.
    let mut prev: Vec<(usize, usize)> = (0..=m).map(|i| (i, 0)).collect();
    let mut cur = prev.clone();

    let mut best = f64::INFINITY;

    for (j, tc) in text.chars().flat_map(char::to_lowercase).enumerate() {
        // Matches may start anywhere, for free.
        cur[0] = (0, j + 1);

        for i in 1..=m {
            let substitute = (
                prev[i - 1].0 + usize::from(pattern[i - 1] != tc),
                prev[i - 1].1,
            );
            let skip_text = (prev[i].0 + 1, prev[i].1);
            let skip_pattern = (cur[i - 1].0 + 1, cur[i - 1].1);
            cur[i] = substitute.min(skip_text).min(skip_pattern);
        }

        let (edits, start) = cur[m];
        best = best.min(edits as f64 / m as f64 + start as f64 / DISTANCE);

        std::mem::swap(&mut prev, &mut cur);
    }

    (best <= THRESHOLD).then_some(best)
}

/// Everything in `items` that fuzzily matches, best first. Equal scores
/// keep their original order.
pub fn search<'a, T>(
    pattern: &str,
    items: &'a [T],
    key: impl Fn(&T) -> &str,
) -> Vec<&'a T> {
    let mut scored: Vec<(f64, &T)> = items
        .iter()
        .filter_map(|item| score(pattern, key(item)).map(|s| (s, item)))
        .collect();
    scored.sort_by(|a, b| a.0.total_cmp(&b.0));
    scored.into_iter().map(|(_, item)| item).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn exact_matches() {
        assert!(close(score("kawa", "kawa").unwrap(), 0.0));
        assert!(close(score("KAWA", "kawaii").unwrap(), 0.0));
        // Prefix costs by position.
        assert!(close(score("kawa", "> Tags: KAWA").unwrap(), 0.08));
    }

    #[test]
    fn typos() {
        // One substitution out of four.
        assert!(close(score("kewa", "kawa").unwrap(), 0.25));
        // One missing letter.
        assert!(close(score("kwa", "kawa").unwrap(), 1.0 / 3.0));
        // Way off.
        assert_eq!(score("zzzz", "kawa"), None);
    }

    #[test]
    fn too_short_or_too_far() {
        assert_eq!(score("k", "kawa"), None);
        assert_eq!(score("  ", "kawa"), None);

        let far = format!("{}kawa", " ".repeat(45));
        assert_eq!(score("kawa", &far), None);
    }

    #[test]
    fn search_sorts_by_score() {
        let names = ["> Tags: KEWA", "> Tags: LOVE", "> Tags: KAWA", "KAWA"];
        let found = search("kawa", &names, |s| *s);
        assert_eq!(found, vec![&"KAWA", &"> Tags: KAWA", &"> Tags: KEWA"]);
    }
}
