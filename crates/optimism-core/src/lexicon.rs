//! Term matching shared by the lexical classifiers.

/// Lower-case `text` and fold typographic apostrophes so "can’t" matches "can't".
pub fn normalize(text: &str) -> String {
    text.to_lowercase().replace(['\u{2019}', '\u{2018}'], "'")
}

/// True if `term` occurs in `haystack` on word boundaries.
///
/// Both inputs are expected lower-case. A boundary is the start/end of the
/// text or any character that is not alphanumeric, so "so" matches
/// "i'm so tired" but not "also".
pub fn contains_term(haystack: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(term) {
        let start = from + pos;
        let end = start + term.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        // Advance by one character to keep slicing on a char boundary.
        from = start
            + haystack[start..]
                .chars()
                .next()
                .map_or(1, |c| c.len_utf8());
    }
    false
}

/// Number of `terms` present in `haystack`.
pub fn count_terms(haystack: &str, terms: &[&str]) -> usize {
    terms.iter().filter(|t| contains_term(haystack, t)).count()
}
