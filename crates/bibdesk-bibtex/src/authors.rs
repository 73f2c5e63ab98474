//! Author list decomposition
//!
//! Splits a BibTeX author field on the conjunction `and` (case-insensitive,
//! ignored inside braces), separates each name into last name and given names
//! and compresses the given names to period-terminated initials.

use crate::entry::ParsedAuthor;

/// Decompose a raw `author` field value into parsed authors
pub fn parse_authors(field: &str) -> Vec<ParsedAuthor> {
    split_authors(field)
        .iter()
        .filter_map(|name| parse_author(name))
        .collect()
}

/// Split an author list on top-level `and` separators
pub fn split_authors(field: &str) -> Vec<String> {
    let mut authors = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut depth = 0i32;

    for word in field.split_whitespace() {
        if depth == 0 && word.eq_ignore_ascii_case("and") {
            if !current.is_empty() {
                authors.push(current.join(" "));
                current.clear();
            }
            continue;
        }
        depth += brace_balance(word);
        current.push(word);
    }
    if !current.is_empty() {
        authors.push(current.join(" "));
    }

    authors
}

/// Parse a single name in either `Last, Given` or `Given Last` form
pub fn parse_author(name: &str) -> Option<ParsedAuthor> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let (last, given) = match top_level_comma(name) {
        Some(pos) => (name[..pos].trim(), name[pos + 1..].trim()),
        None => split_given_last(name),
    };

    let last = strip_braces(last);
    if last.is_empty() {
        return None;
    }

    Some(ParsedAuthor::new(initials(given), last))
}

/// Compress given names to initials: "Rosalind E." -> "R. E.", "Jean-Paul" -> "J.-P."
pub fn initials(given: &str) -> String {
    given
        .split_whitespace()
        .filter_map(|word| {
            let parts: Vec<String> = word.split('-').filter_map(initial).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("-"))
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn initial(word: &str) -> Option<String> {
    // Skips braces and LaTeX accent commands such as {\'E}mile
    let mut chars = word.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            // Control words like \ss are letters of their own; accents are not
            while chars.peek().is_some_and(|c| !c.is_alphabetic() && *c != '{') {
                chars.next();
            }
            continue;
        }
        if c.is_alphabetic() {
            return Some(format!("{}.", c.to_uppercase()));
        }
    }
    None
}

fn split_given_last(name: &str) -> (&str, &str) {
    // Last top-level word is the last name
    let mut depth = 0i32;
    let mut split_at = None;
    for (pos, c) in name.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth -= 1,
            c if c.is_whitespace() && depth == 0 => split_at = Some(pos),
            _ => {}
        }
    }
    match split_at {
        Some(pos) => (name[pos..].trim(), name[..pos].trim()),
        None => (name, ""),
    }
}

fn top_level_comma(name: &str) -> Option<usize> {
    let mut depth = 0i32;
    for (pos, c) in name.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth -= 1,
            ',' if depth == 0 => return Some(pos),
            _ => {}
        }
    }
    None
}

fn brace_balance(word: &str) -> i32 {
    word.chars().fold(0, |acc, c| match c {
        '{' => acc + 1,
        '}' => acc - 1,
        _ => acc,
    })
}

fn strip_braces(text: &str) -> String {
    text.replace(['{', '}'], "").trim().to_string()
}
