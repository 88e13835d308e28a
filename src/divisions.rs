//!
//! src/divisions.rs
//!
//! Division code utilities: canonical name <-> short code mapping and
//! the textual token variants album names use for each division.
//!

use crate::errors::ResolverError;

/// Short code, canonical division name pairs in competitive order.
pub const DIVISIONS: [(&str, &str); 8] = [
    ("E", "Elite"),
    ("1", "1. divisjon"),
    ("2", "2. divisjon"),
    ("3", "3. divisjon"),
    ("4", "4. divisjon"),
    ("5", "5. divisjon"),
    ("6", "6. divisjon"),
    ("7", "7. divisjon"),
];

/// Map a short code ("E", "1".."7") to its canonical division name.
pub fn division_for_code(code: &str) -> Result<&'static str, ResolverError> {
    let trimmed = code.trim();
    DIVISIONS
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(trimmed))
        .map(|(_, name)| *name)
        .ok_or_else(|| {
            ResolverError::Config(format!(
                "unknown division code '{trimmed}' (expected one of E, 1-7)"
            ))
        })
}

pub fn code_for_division(division: &str) -> Option<&'static str> {
    DIVISIONS
        .iter()
        .find(|(_, name)| name.eq_ignore_ascii_case(division.trim()))
        .map(|(code, _)| *code)
}

/// Validate a requested list of codes, deduplicating while preserving
/// first-seen order.
pub fn normalize_codes(codes: &[String]) -> Result<Vec<String>, ResolverError> {
    let mut seen = Vec::new();
    for code in codes {
        let canonical = DIVISIONS
            .iter()
            .find(|(c, _)| c.eq_ignore_ascii_case(code.trim()))
            .map(|(c, _)| (*c).to_string())
            .ok_or_else(|| {
                ResolverError::Config(format!(
                    "unknown division code '{}' (expected one of E, 1-7)",
                    code.trim()
                ))
            })?;
        if !seen.contains(&canonical) {
            seen.push(canonical);
        }
    }
    Ok(seen)
}

/// Label the division takes in album titles. Elite albums are published
/// as "Elitedivisjon" rather than "Elite".
pub fn album_label(division: &str) -> String {
    if division.trim().eq_ignore_ascii_case("Elite") {
        "Elitedivisjon".to_string()
    } else {
        division.trim().to_string()
    }
}

/// Lowercase token variants an album name may use for a division.
/// Matching against these is case-insensitive by construction.
pub fn division_tokens(division: &str) -> Vec<String> {
    let trimmed = division.trim();
    if trimmed.eq_ignore_ascii_case("Elite") {
        return vec![
            "elitedivisjon".to_string(),
            "elite-divisjon".to_string(),
            "elite divisjon".to_string(),
            "elite".to_string(),
        ];
    }
    let Some(number) = trimmed.chars().next().filter(|c| c.is_ascii_digit()) else {
        return vec![trimmed.to_lowercase()];
    };
    vec![
        format!("{number}. divisjon"),
        format!("{number}-divisjon"),
        format!("{number}. div"),
        format!("{number} div"),
        format!("{number}.div"),
        format!("{number}div"),
    ]
}
