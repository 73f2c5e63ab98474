//! Bibliography entry data structures

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Field holding the raw author list
pub const AUTHOR_FIELD: &str = "author";

/// Prefix of the fields holding BibDesk file attachments (`bdsk-file-1`, ...)
pub const BDSK_FILE_PREFIX: &str = "bdsk-file-";

/// An author as produced by the grammar: given names compressed to initials
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParsedAuthor {
    pub first: String,
    pub last: String,
}

impl ParsedAuthor {
    pub fn new(first: impl Into<String>, last: impl Into<String>) -> Self {
        Self {
            first: first.into(),
            last: last.into(),
        }
    }

    /// "Initials LastName", or just the last name when there are no initials
    pub fn full_name(&self) -> String {
        if self.first.is_empty() {
            self.last.clone()
        } else {
            format!("{} {}", self.first, self.last)
        }
    }
}

/// A parsed BibTeX entry
///
/// Field names are stored lower-cased. Entries are never mutated after the
/// store has ingested them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BibEntry {
    pub citekey: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub authors: Vec<ParsedAuthor>,
    pub fields: HashMap<String, String>,
}

impl BibEntry {
    /// Create an entry with no fields
    pub fn new(citekey: impl Into<String>, entry_type: impl Into<String>) -> Self {
        Self {
            citekey: citekey.into(),
            entry_type: entry_type.into(),
            authors: Vec::new(),
            fields: HashMap::new(),
        }
    }

    /// Builder-style field insertion, mostly useful in tests and the demo library
    pub fn with_field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.insert(key.to_lowercase(), value.into());
        self
    }

    pub fn with_authors(mut self, authors: Vec<ParsedAuthor>) -> Self {
        self.authors = authors;
        self
    }

    /// Get a field value by key (case-insensitive)
    pub fn field(&self, key: &str) -> Option<&str> {
        match self.fields.get(key) {
            Some(value) => Some(value.as_str()),
            None => self.fields.get(&key.to_lowercase()).map(String::as_str),
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.field("title")
    }

    pub fn journal(&self) -> Option<&str> {
        self.field("journal")
    }

    pub fn year(&self) -> Option<&str> {
        self.field("year")
    }

    pub fn volume(&self) -> Option<&str> {
        self.field("volume")
    }

    pub fn pages(&self) -> Option<&str> {
        self.field("pages")
    }

    pub fn eprint(&self) -> Option<&str> {
        self.field("eprint")
    }

    /// Value of the `bdsk-file-<index>` attachment field
    pub fn bdsk_file(&self, index: u32) -> Option<&str> {
        self.field(&bdsk_file_field(index))
    }

    /// 1-based indices of every `bdsk-file-N` field, ascending
    pub fn attachment_indices(&self) -> Vec<u32> {
        let mut indices: Vec<u32> = self
            .fields
            .keys()
            .filter_map(|key| key.strip_prefix(BDSK_FILE_PREFIX))
            .filter_map(|suffix| suffix.parse().ok())
            .collect();
        indices.sort_unstable();
        indices
    }
}

/// Name of the field holding the attachment with the given 1-based index
pub fn bdsk_file_field(index: u32) -> String {
    format!("{BDSK_FILE_PREFIX}{index}")
}
