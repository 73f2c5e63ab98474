//! Test fixture loading utilities

use std::path::PathBuf;

use bibdesk_bibtex::{parse, BibEntry};

/// BibTeX fixtures are shared with the bibdesk-bibtex crate
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../bibdesk-bibtex/test_fixtures")
        .join(name)
}

pub fn load_bibtex_fixture(name: &str) -> String {
    let path = fixture_path(&format!("bibtex/{}", name));
    std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("Failed to load fixture: {}", name))
}

/// Parse a fixture and return the entry with `citekey`
pub fn fixture_entry(name: &str, citekey: &str) -> BibEntry {
    parse(&load_bibtex_fixture(name))
        .unwrap()
        .into_iter()
        .find(|entry| entry.citekey == citekey)
        .unwrap_or_else(|| panic!("missing entry {citekey} in {name}"))
}
