//! Citation formatting
//!
//! Pure functions turning a stored entry into display strings: author lists,
//! journal references and links back into BibDesk.

use serde::{Deserialize, Serialize};

use crate::entry::{BibEntry, ParsedAuthor};

const ET_AL: &str = "et al.";

/// Which authors of an entry are rendered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatType {
    #[default]
    AllAuthors,
    JustFirstAuthor,
    JustLastAuthor,
    FirstAndLastAuthor,
}

/// How the volume number is emphasised
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightType {
    Html,
    #[serde(alias = "markdown")]
    MarkDown,
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorFormatOptions {
    pub format_type: FormatType,
    pub only_last_name: bool,
    pub include_et_al: bool,
    pub precede_last_author_by_and: bool,
}

impl Default for AuthorFormatOptions {
    fn default() -> Self {
        Self {
            format_type: FormatType::AllAuthors,
            only_last_name: false,
            include_et_al: true,
            precede_last_author_by_and: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalReferenceOptions {
    pub including_year: bool,
    pub highlight_volume: HighlightType,
}

impl Default for JournalReferenceOptions {
    fn default() -> Self {
        Self {
            including_year: true,
            highlight_volume: HighlightType::None,
        }
    }
}

/// Render the authors of `entry` as separate display strings.
///
/// Callers choose the separators; "et al." and the "and " prefix appear as
/// their own token or as part of the last author respectively.
pub fn format_authors(entry: &BibEntry, options: &AuthorFormatOptions) -> Vec<String> {
    let authors = &entry.authors;
    let (Some(first), Some(last)) = (authors.first(), authors.last()) else {
        return Vec::new();
    };
    let several = authors.len() > 1;
    let render = |author: &ParsedAuthor| {
        if options.only_last_name {
            author.last.clone()
        } else {
            author.full_name()
        }
    };

    match options.format_type {
        FormatType::AllAuthors => {
            let mut formatted: Vec<String> = authors.iter().map(render).collect();
            if several && options.precede_last_author_by_and {
                if let Some(last) = formatted.last_mut() {
                    *last = format!("and {last}");
                }
            }
            formatted
        }
        FormatType::FirstAndLastAuthor if several => {
            if options.include_et_al {
                vec![render(first), ET_AL.to_string(), render(last)]
            } else {
                vec![render(first), render(last)]
            }
        }
        FormatType::FirstAndLastAuthor => vec![render(first)],
        FormatType::JustFirstAuthor if several && options.include_et_al => {
            vec![render(first), ET_AL.to_string()]
        }
        FormatType::JustFirstAuthor => vec![render(first)],
        FormatType::JustLastAuthor => vec![render(last)],
    }
}

/// Render "journal volume, pages (year)", or "arXiv:eprint (year)" for preprints
pub fn format_journal_reference(entry: &BibEntry, options: &JournalReferenceOptions) -> String {
    let journal = entry.journal();

    let reference = match (journal, entry.eprint()) {
        (Some(journal), Some(eprint)) if journal.trim().eq_ignore_ascii_case("arxiv") => {
            Some(format!("{journal}:{eprint}"))
        }
        _ => {
            let volume = entry
                .volume()
                .map(|volume| highlight(volume, options.highlight_volume));
            let volume_pages = join_present([volume, entry.pages().map(str::to_string)], ", ");
            join_present([journal.map(str::to_string), volume_pages], " ")
        }
    };

    let year = entry
        .year()
        .filter(|_| options.including_year)
        .map(|year| format!("({year})"));

    join_present([reference, year], " ").unwrap_or_default()
}

/// The title, or "No title" when the entry has none
pub fn format_title(entry: &BibEntry) -> &str {
    match entry.title() {
        Some(title) if !title.is_empty() => title,
        _ => "No title",
    }
}

/// Markdown link opening the entry in BibDesk
pub fn bibdesk_uri_link(entry: &BibEntry) -> String {
    format!("[{0}](x-bdsk://{0})", entry.citekey)
}

fn highlight(volume: &str, highlight: HighlightType) -> String {
    match highlight {
        HighlightType::Html => format!("<strong>{volume}</strong>"),
        HighlightType::MarkDown => format!("**{volume}**"),
        HighlightType::None => volume.to_string(),
    }
}

/// Join the present segments; `None` when every segment is absent
fn join_present<const N: usize>(segments: [Option<String>; N], separator: &str) -> Option<String> {
    let present: Vec<String> = segments.into_iter().flatten().collect();
    if present.is_empty() {
        None
    } else {
        Some(present.join(separator))
    }
}
