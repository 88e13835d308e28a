//!
//! src/text.rs
//!
//! Slug normalization and the fuzzy similarity metric used to compare
//! piece titles, track titles, band names and artist credits.
//!
//! The metric is normalized Levenshtein (strsim) blended with token
//! overlap, with a containment floor of 0.9 when one slug contains the
//! other. Scores are in [0, 1].
//!

/// Drop parenthetical content, tolerating unbalanced parens.
pub fn strip_parenthetical(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut depth = 0_u32;
    for ch in value.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => result.push(ch),
            _ => {}
        }
    }
    result
}

/// Normalize a title or name into a hyphen-joined lowercase slug:
/// smart punctuation unified, diacritics folded, everything that is not
/// alphanumeric treated as a separator.
pub fn slug(value: &str) -> String {
    let unified = value
        .replace(['\u{2019}', '\u{2018}'], "'")
        .replace(['\u{2013}', '\u{2014}'], "-");
    let folded = deunicode::deunicode(&unified).to_lowercase();

    let mut tokens: Vec<String> = Vec::new();
    let mut current = String::new();
    for ch in folded.chars() {
        if ch.is_ascii_alphanumeric() {
            current.push(ch);
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens.join("-")
}

/// Alternate normalization with parenthetical content removed, used as
/// a second chance when titles carry "(Live)" style suffixes.
pub fn slug_stripped(value: &str) -> String {
    slug(&strip_parenthetical(value))
}

/// Similarity of two slugs in [0, 1].
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let mut ratio = strsim::normalized_levenshtein(a, b);
    if a.contains(b) || b.contains(a) {
        ratio = ratio.max(0.9);
    }
    let tokens_a: std::collections::HashSet<&str> = a.split('-').collect();
    let tokens_b: std::collections::HashSet<&str> = b.split('-').collect();
    let overlap = tokens_a.intersection(&tokens_b).count() as f64
        / tokens_a.len().max(tokens_b.len()) as f64;
    ratio.max(overlap)
}

/// Best similarity across plain and parenthetical-stripped slugs.
pub fn title_similarity(left: &str, right: &str) -> f64 {
    let plain = similarity(&slug(left), &slug(right));
    let stripped = similarity(&slug_stripped(left), &slug_stripped(right));
    plain.max(stripped)
}
