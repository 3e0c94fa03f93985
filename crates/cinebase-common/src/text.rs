//! Title and name normalization plus similarity scoring
//!
//! Festival data spells titles inconsistently ("Parasite" vs "Parasite (2019)",
//! "Crouching Tiger, Hidden Dragon" vs "crouching tiger hidden dragon"), so
//! every comparison goes through [`normalize_title`] before scoring with
//! Jaro-Winkler.

use strsim::{jaro_winkler, normalized_levenshtein};

const LEADING_ARTICLES: &[&str] = &["the ", "a ", "an ", "le ", "la ", "les ", "el ", "il ", "der ", "die ", "das "];

/// Normalize a title for comparison.
///
/// Lowercases, expands `&`, drops a trailing parenthesised year, removes
/// punctuation, strips one leading article, and collapses whitespace.
pub fn normalize_title(title: &str) -> String {
    let lowered = title.trim().to_lowercase().replace('&', " and ");
    let without_year = strip_trailing_year(&lowered);

    let cleaned: String = without_year
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    let collapsed = collapse_whitespace(&cleaned);

    for article in LEADING_ARTICLES {
        if let Some(rest) = collapsed.strip_prefix(article) {
            if !rest.is_empty() {
                return rest.to_string();
            }
        }
    }
    collapsed
}

/// Normalize a person name: lowercase, no punctuation, single spaces.
pub fn normalize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    collapse_whitespace(&cleaned)
}

/// Jaro-Winkler similarity of two titles after normalization, in `[0, 1]`.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (normalize_title(a), normalize_title(b));
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    jaro_winkler(&a, &b)
}

/// Similarity of two person names.
///
/// Takes the better of a direct Jaro-Winkler comparison and a comparison of
/// sorted name tokens, so "Bong Joon-ho" and "Joon-ho Bong" score as equal.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (normalize_name(a), normalize_name(b));
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let direct = jaro_winkler(&a, &b);
    let sorted = jaro_winkler(&sorted_tokens(&a), &sorted_tokens(&b));
    let edit = normalized_levenshtein(&a, &b);
    direct.max(sorted).max(edit)
}

fn strip_trailing_year(title: &str) -> &str {
    let trimmed = title.trim_end();
    if let Some(open) = trimmed.rfind('(') {
        let inner = &trimmed[open + 1..];
        if let Some(year) = inner.strip_suffix(')') {
            if year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()) {
                return trimmed[..open].trim_end();
            }
        }
    }
    trimmed
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
