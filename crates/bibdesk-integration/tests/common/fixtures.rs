//! Test fixture loading utilities

use std::path::{Path, PathBuf};

/// BibTeX fixtures are shared with the bibdesk-bibtex crate
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../bibdesk-bibtex/test_fixtures")
        .join(name)
}

/// Copy a BibTeX fixture into `dir` and return the copy's path
pub fn install_bibtex_fixture(dir: &Path, name: &str) -> PathBuf {
    let target = dir.join(name);
    std::fs::copy(fixture_path(&format!("bibtex/{}", name)), &target)
        .unwrap_or_else(|_| panic!("Failed to copy fixture: {}", name));
    target
}
