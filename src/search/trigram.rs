//! Trigram similarity with pg_trgm semantics.
//!
//! Each alphanumeric word is lower-cased and padded with two leading spaces
//! and one trailing space before its three-character windows are collected.

use std::collections::HashSet;

pub fn trigrams(text: &str) -> HashSet<String> {
    let mut set = HashSet::new();

    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let padded: Vec<char> = "  "
            .chars()
            .chain(word.chars().flat_map(char::to_lowercase))
            .chain(" ".chars())
            .collect();

        for window in padded.windows(3) {
            set.insert(window.iter().collect());
        }
    }

    set
}

/// `|A ∩ B| / |A ∪ B|`; zero when neither side has trigrams
pub fn similarity(a: &str, b: &str) -> f64 {
    let left = trigrams(a);
    let right = trigrams(b);

    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }

    let shared = left.intersection(&right).count();
    shared as f64 / union as f64
}

/// Highest similarity between `query` and any of `fields`
pub fn best_similarity<'a>(query: &str, fields: impl IntoIterator<Item = &'a str>) -> f64 {
    fields
        .into_iter()
        .map(|field| similarity(query, field))
        .fold(0.0, f64::max)
}
