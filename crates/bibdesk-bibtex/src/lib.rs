//! BibTeX import for BibDesk libraries
//!
//! This crate provides:
//! - A nom-based BibTeX grammar with bounded, resumable parsing
//! - A cooperative scheduler that parses large files in time slices
//! - A citekey-indexed store that is swapped atomically per import
//! - Citation formatting (author lists, journal references, BibDesk links)

pub mod authors;
mod demo;
mod entry;
pub mod formatter;
pub mod parser;
pub mod scheduler;
pub mod store;

pub use demo::DEMO_BIBTEX;
pub use entry::{bdsk_file_field, BibEntry, ParsedAuthor, AUTHOR_FIELD, BDSK_FILE_PREFIX};
pub use formatter::{
    bibdesk_uri_link, format_authors, format_journal_reference, format_title, AuthorFormatOptions,
    FormatType, HighlightType, JournalReferenceOptions,
};
pub use parser::{
    parse, parse_slice, Location, MacroTable, ParsedSlice, ParserOptions, Position, SliceStatus,
    SyntaxError,
};
pub use scheduler::{ChunkedParser, ParseBatch, ParseFailure, ParseStats, Progress, SliceCursor};
pub use store::{BibSnapshot, BibliographyStore, RunTicket};
