//! BibTeX grammar implemented with nom
//!
//! The grammar recognises:
//! - `@type{citekey, field = value, ...}` entries, delimited by braces or parentheses
//! - `@string` macro definitions (plus the predefined month macros)
//! - `@preamble` and `@comment` sections, `%` line comments and free text between entries
//! - braced, quoted, numeric and macro values joined with `#`
//!
//! Parsing can be bounded: with [`ParserOptions::max_matches`] set, the
//! grammar stops after that many entries and reports where it stopped, so a
//! caller can resume on the remaining suffix. See [`crate::scheduler`].

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;
use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, multispace0, one_of},
    error::{context, ContextError, ErrorKind, ParseError},
    IResult,
};
use serde::{Deserialize, Serialize};

use crate::authors::parse_authors;
use crate::entry::{BibEntry, AUTHOR_FIELD};

/// `@string` macro definitions, keyed by lower-cased name
pub type MacroTable = HashMap<String, String>;

lazy_static! {
    static ref MONTH_MACROS: MacroTable = [
        ("jan", "January"),
        ("feb", "February"),
        ("mar", "March"),
        ("apr", "April"),
        ("may", "May"),
        ("jun", "June"),
        ("jul", "July"),
        ("aug", "August"),
        ("sep", "September"),
        ("oct", "October"),
        ("nov", "November"),
        ("dec", "December"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
}

/// A point in the source text. `offset` is in bytes, `line` and `column` are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub offset: usize,
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub const START: Position = Position {
        offset: 0,
        line: 1,
        column: 1,
    };

    /// Position of byte `offset` within `text`
    pub fn locate(text: &str, offset: usize) -> Self {
        let before = &text[..offset];
        let line = before.matches('\n').count() as u32 + 1;
        let line_start = before.rfind('\n').map(|pos| pos + 1).unwrap_or(0);
        let column = before[line_start..].chars().count() as u32 + 1;
        Self {
            offset,
            line,
            column,
        }
    }

    /// Translate a position relative to a slice starting at `base` into an absolute one
    pub fn rebase(&self, base: &Position) -> Position {
        Position {
            offset: base.offset + self.offset,
            line: base.line + self.line - 1,
            column: if self.line == 1 {
                base.column + self.column - 1
            } else {
                self.column
            },
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// A span in the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub start: Position,
    pub end: Position,
}

impl Location {
    fn span(text: &str, start: usize, end: usize) -> Self {
        Self {
            start: Position::locate(text, start),
            end: Position::locate(text, end),
        }
    }

    pub fn rebase(&self, base: &Position) -> Location {
        Location {
            start: self.start.rebase(base),
            end: self.end.rebase(base),
        }
    }
}

/// A genuine syntax error in the BibTeX source
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("syntax error at {}: {message}", location.start)]
pub struct SyntaxError {
    pub location: Location,
    pub message: String,
}

impl SyntaxError {
    pub fn rebase(mut self, base: &Position) -> Self {
        self.location = self.location.rebase(base);
        self
    }
}

/// Parser configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserOptions {
    /// Stop after this many entries; `None` parses to the end of input
    pub max_matches: Option<usize>,
}

impl ParserOptions {
    pub fn bounded(max_matches: usize) -> Self {
        Self {
            max_matches: Some(max_matches),
        }
    }

    pub fn unbounded() -> Self {
        Self { max_matches: None }
    }
}

/// How a parser invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceStatus {
    /// The whole input was consumed
    Complete,
    /// The entry bound was hit; `location` spans the last consumed entry and
    /// `location.end.offset` is where the next invocation should resume.
    MaxMatchesReached { location: Location },
}

/// Result of one parser invocation over a slice of the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSlice {
    pub entries: Vec<BibEntry>,
    /// Macros defined by `@string` commands within this slice
    pub macros: MacroTable,
    pub status: SliceStatus,
}

/// Parse a whole BibTeX document in one go
pub fn parse(input: &str) -> Result<Vec<BibEntry>, SyntaxError> {
    parse_slice(input, &ParserOptions::unbounded(), &MacroTable::new()).map(|slice| slice.entries)
}

/// Parse `input` up to the configured entry bound
///
/// `macros` holds definitions inherited from earlier slices of the same document.
pub fn parse_slice(
    input: &str,
    options: &ParserOptions,
    macros: &MacroTable,
) -> Result<ParsedSlice, SyntaxError> {
    let mut scope = Scope {
        inherited: macros,
        defined: MacroTable::new(),
    };
    let mut entries = Vec::new();
    let mut remaining = input;

    loop {
        remaining = skip_trivia(remaining);
        if remaining.is_empty() {
            return Ok(ParsedSlice {
                entries,
                macros: scope.defined,
                status: SliceStatus::Complete,
            });
        }

        let start = input.len() - remaining.len();
        let (rest, command) = at_command(remaining, &scope).map_err(|e| syntax_error(input, e))?;
        remaining = rest;

        match command {
            Command::Entry(entry) => {
                entries.push(entry);
                if options.max_matches.is_some_and(|max| entries.len() >= max) {
                    let end = input.len() - remaining.len();
                    return Ok(ParsedSlice {
                        entries,
                        macros: scope.defined,
                        status: SliceStatus::MaxMatchesReached {
                            location: Location::span(input, start, end),
                        },
                    });
                }
            }
            Command::Macro(name, value) => {
                scope.defined.insert(name, value);
            }
            Command::Preamble | Command::Comment => {}
        }
    }
}

type Res<'a, T> = IResult<&'a str, T, GrammarError<'a>>;

/// nom error carrying what the grammar expected at the failing input
#[derive(Debug)]
struct GrammarError<'a> {
    input: &'a str,
    expected: String,
    has_context: bool,
}

impl<'a> ParseError<&'a str> for GrammarError<'a> {
    fn from_error_kind(input: &'a str, kind: ErrorKind) -> Self {
        Self {
            input,
            expected: kind.description().to_lowercase(),
            has_context: false,
        }
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }

    fn from_char(input: &'a str, c: char) -> Self {
        Self {
            input,
            expected: format!("'{c}'"),
            has_context: false,
        }
    }

    fn or(self, other: Self) -> Self {
        // Keep whichever alternative got further
        if other.input.len() < self.input.len() {
            other
        } else {
            self
        }
    }
}

impl<'a> ContextError<&'a str> for GrammarError<'a> {
    fn add_context(_input: &'a str, ctx: &'static str, mut other: Self) -> Self {
        if !other.has_context {
            other.expected = ctx.to_string();
            other.has_context = true;
        }
        other
    }
}

fn syntax_error(source: &str, err: nom::Err<GrammarError<'_>>) -> SyntaxError {
    let (at, expected) = match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => (source.len() - e.input.len(), e.expected),
        nom::Err::Incomplete(_) => (source.len(), "more input".to_string()),
    };
    let found = match source[at..].chars().next() {
        Some(c) => format!("'{}'", c.escape_default()),
        None => "end of input".to_string(),
    };
    let end = source[at..]
        .chars()
        .next()
        .map(|c| at + c.len_utf8())
        .unwrap_or(at);
    SyntaxError {
        location: Location::span(source, at, end),
        message: format!("expected {expected}, found {found}"),
    }
}

/// Turn recoverable errors into failures so `alt` does not mask them
fn commit<T>(result: Res<'_, T>) -> Res<'_, T> {
    result.map_err(|e| match e {
        nom::Err::Error(e) => nom::Err::Failure(e),
        other => other,
    })
}

struct Scope<'m> {
    inherited: &'m MacroTable,
    defined: MacroTable,
}

impl Scope<'_> {
    fn lookup(&self, name: &str) -> Option<&str> {
        let key = name.to_lowercase();
        self.defined
            .get(&key)
            .or_else(|| self.inherited.get(&key))
            .or_else(|| MONTH_MACROS.get(&key))
            .map(String::as_str)
    }
}

enum Command {
    Entry(BibEntry),
    Macro(String, String),
    Preamble,
    Comment,
}

/// Skip whitespace, `%` comments and free text up to the next `@`
fn skip_trivia(input: &str) -> &str {
    let mut rest = input;
    loop {
        rest = rest.trim_start();
        if rest.is_empty() || rest.starts_with('@') {
            return rest;
        }
        if rest.starts_with('%') {
            rest = rest.find('\n').map_or("", |pos| &rest[pos + 1..]);
            continue;
        }
        // Free text: consume up to the next `@` or line end, whichever comes first
        let stop = rest.find(['@', '\n']).unwrap_or(rest.len());
        rest = &rest[stop..];
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || "_-:.+/".contains(c)
}

fn is_citekey_char(c: char) -> bool {
    !c.is_whitespace() && !",{}()=\"#%".contains(c)
}

fn at_command<'a>(input: &'a str, scope: &Scope) -> Res<'a, Command> {
    let (rest, _) = char('@')(input)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, kind) = context("entry type", take_while1(|c: char| c.is_alphanumeric()))(rest)?;
    let kind = kind.to_lowercase();
    let (rest, _) = multispace0(rest)?;

    if kind == "comment" {
        let (rest, _) = comment_body(rest)?;
        return Ok((rest, Command::Comment));
    }

    let (rest, open) = context("'{' or '(' after the entry type", one_of("{("))(rest)?;
    let close = if open == '{' { '}' } else { ')' };

    match kind.as_str() {
        "string" => {
            let (rest, (name, value)) = commit(macro_definition(rest, close, scope))?;
            Ok((rest, Command::Macro(name, value)))
        }
        "preamble" => {
            let (rest, _) = commit(preamble_body(rest, close, scope))?;
            Ok((rest, Command::Preamble))
        }
        _ => {
            let (rest, entry) = commit(entry_body(rest, &kind, close, scope))?;
            Ok((rest, Command::Entry(entry)))
        }
    }
}

fn comment_body(input: &str) -> Res<'_, ()> {
    if input.starts_with('{') {
        let (rest, _) = commit(balanced(input, '{', '}'))?;
        Ok((rest, ()))
    } else if input.starts_with('(') {
        let (rest, _) = commit(balanced(input, '(', ')'))?;
        Ok((rest, ()))
    } else {
        let pos = input.find('\n').unwrap_or(input.len());
        Ok((&input[pos..], ()))
    }
}

fn macro_definition<'a>(input: &'a str, close: char, scope: &Scope) -> Res<'a, (String, String)> {
    let (rest, _) = multispace0(input)?;
    let (rest, name) = context("macro name", take_while1(is_ident_char))(rest)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, _) = context("'=' after the macro name", char('='))(rest)?;
    let (rest, value) = field_value(rest, scope)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, _) = context("end of @string", char(close))(rest)?;

    Ok((rest, (name.to_lowercase(), value)))
}

fn preamble_body<'a>(input: &'a str, close: char, scope: &Scope) -> Res<'a, String> {
    let (rest, value) = field_value(input, scope)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, _) = context("end of @preamble", char(close))(rest)?;
    Ok((rest, value))
}

fn entry_body<'a>(
    input: &'a str,
    entry_type: &str,
    close: char,
    scope: &Scope,
) -> Res<'a, BibEntry> {
    let (rest, _) = multispace0(input)?;
    let (rest, citekey) = context("citation key", take_while1(is_citekey_char))(rest)?;
    let mut entry = BibEntry::new(citekey, entry_type);

    let (mut rest, _) = multispace0(rest)?;
    loop {
        if let Some(after) = rest.strip_prefix(close) {
            rest = after;
            break;
        }
        let (after, _) = context("',' or end of entry", char(','))(rest)?;
        let (after, _) = multispace0(after)?;
        // Trailing comma before the closing delimiter
        if let Some(after) = after.strip_prefix(close) {
            rest = after;
            break;
        }
        let (after, (name, value)) = field(after, scope)?;
        entry.fields.insert(name, value);
        let (after, _) = multispace0(after)?;
        rest = after;
    }

    if let Some(raw) = entry.fields.get(AUTHOR_FIELD) {
        entry.authors = parse_authors(raw);
    }

    Ok((rest, entry))
}

fn field<'a>(input: &'a str, scope: &Scope) -> Res<'a, (String, String)> {
    let (rest, name) = context("field name", take_while1(is_ident_char))(input)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, _) = context("'=' after the field name", char('='))(rest)?;
    let (rest, value) = field_value(rest, scope)?;
    Ok((rest, (name.to_lowercase(), value)))
}

/// A value made of one or more `#`-joined pieces, with whitespace runs collapsed
fn field_value<'a>(input: &'a str, scope: &Scope) -> Res<'a, String> {
    let mut value = String::new();
    let mut remaining = input;

    loop {
        let (rest, _) = multispace0(remaining)?;
        let (rest, piece) = context(
            "field value",
            alt((braced_value, quoted_value, |i: &'a str| {
                bare_value(i, scope)
            })),
        )(rest)?;
        value.push_str(&piece);

        let (rest, _) = multispace0(rest)?;
        match rest.strip_prefix('#') {
            Some(after) => remaining = after,
            None => return Ok((rest, collapse_whitespace(&value))),
        }
    }
}

/// A number or a macro name; unknown names are kept literally
fn bare_value<'a>(input: &'a str, scope: &Scope) -> Res<'a, String> {
    let (rest, name) = take_while1(is_ident_char)(input)?;
    let value = scope.lookup(name).unwrap_or(name);
    Ok((rest, value.to_string()))
}

fn braced_value(input: &str) -> Res<'_, String> {
    let (rest, content) = balanced(input, '{', '}')?;
    Ok((rest, content[1..content.len() - 1].to_string()))
}

/// Content between `open` and its matching `close`, delimiters included
fn balanced(input: &str, open: char, close: char) -> Res<'_, &str> {
    if !input.starts_with(open) {
        return Err(nom::Err::Error(GrammarError::from_char(input, open)));
    }

    let mut depth = 0usize;
    let mut chars = input.char_indices();
    while let Some((pos, c)) = chars.next() {
        if c == '\\' {
            chars.next();
        } else if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                let end = pos + c.len_utf8();
                return Ok((&input[end..], &input[..end]));
            }
        }
    }

    Err(nom::Err::Failure(GrammarError {
        input,
        expected: format!("matching '{close}'"),
        has_context: true,
    }))
}

fn quoted_value(input: &str) -> Res<'_, String> {
    if !input.starts_with('"') {
        return Err(nom::Err::Error(GrammarError::from_char(input, '"')));
    }

    let mut depth = 0usize;
    let mut chars = input.char_indices().skip(1);
    while let Some((pos, c)) = chars.next() {
        match c {
            '"' if depth == 0 => return Ok((&input[pos + 1..], input[1..pos].to_string())),
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            '\\' => {
                chars.next();
            }
            _ => {}
        }
    }

    Err(nom::Err::Failure(GrammarError {
        input,
        expected: "closing '\"'".to_string(),
        has_context: true,
    }))
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
