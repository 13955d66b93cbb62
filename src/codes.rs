use std::collections::HashSet;

use regex::Regex;

/// Codes are compared case-insensitively; the stored form is uppercase.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Extracts candidate dedup codes from `text` with the given pattern.
///
/// Matches are collected left to right. If the pattern defines a capture
/// group, group 1 is the code (e.g. `(?:/dp/)([A-Z0-9]{10})` captures only the
/// product id); otherwise the whole match is used. A code repeated within the
/// same message counts once, keeping first-seen order. Pure: no I/O, never
/// fails — empty or matchless text yields an empty vec.
pub fn extract_codes(pattern: &Regex, text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut seen = HashSet::new();
    let mut codes = Vec::new();
    for caps in pattern.captures_iter(text) {
        let Some(m) = caps.get(1).or_else(|| caps.get(0)) else {
            continue;
        };
        let code = normalize_code(m.as_str());
        if code.is_empty() {
            continue;
        }
        if seen.insert(code.clone()) {
            codes.push(code);
        }
    }
    codes
}
