//! Chunked, resumable parsing
//!
//! Large bibliographies are parsed as a sequence of bounded slices. Each
//! slice stops after `max_matches` entries and reports where it stopped; the
//! scheduler folds the slice into its accumulator, advances its offset and
//! yields to the runtime once the time budget of the current scheduling
//! opportunity is spent. Nothing is published until the whole text has been
//! consumed without a syntax error.

use std::time::{Duration, Instant};

use crate::entry::BibEntry;
use crate::parser::{parse_slice, MacroTable, ParserOptions, Position, SliceStatus, SyntaxError};
use crate::store::{BibliographyStore, RunTicket};

pub const DEFAULT_MAX_MATCHES: usize = 100;
pub const DEFAULT_SLICE_BUDGET: Duration = Duration::from_millis(8);

#[derive(Debug, thiserror::Error)]
pub enum ParseFailure {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error("parse run {generation} was superseded by a newer run")]
    Superseded { generation: u64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseStats {
    /// Number of parser invocations, including the final one
    pub invocations: usize,
    /// Number of scheduling opportunities used (yields + 1)
    pub opportunities: usize,
    pub elapsed: Duration,
}

/// Entries of a fully parsed document
#[derive(Debug, Clone)]
pub struct ParseBatch {
    pub entries: Vec<BibEntry>,
    pub stats: ParseStats,
}

/// What one parser invocation achieved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Resume,
    Complete,
}

/// Explicit accumulator for a resumable parse over one text
#[derive(Debug)]
pub struct SliceCursor<'t> {
    text: &'t str,
    position: Position,
    macros: MacroTable,
    entries: Vec<BibEntry>,
    invocations: usize,
}

impl<'t> SliceCursor<'t> {
    pub fn new(text: &'t str) -> Self {
        Self {
            text,
            position: Position::START,
            macros: MacroTable::new(),
            entries: Vec::new(),
            invocations: 0,
        }
    }

    /// Absolute position the next invocation starts from
    pub fn position(&self) -> Position {
        self.position
    }

    pub fn invocations(&self) -> usize {
        self.invocations
    }

    /// Run the parser once on the unconsumed suffix and fold its result
    pub fn advance(&mut self, options: &ParserOptions) -> Result<Progress, SyntaxError> {
        self.invocations += 1;
        let slice = parse_slice(&self.text[self.position.offset..], options, &self.macros)
            .map_err(|e| e.rebase(&self.position))?;

        self.entries.extend(slice.entries);
        self.macros.extend(slice.macros);

        match slice.status {
            SliceStatus::Complete => Ok(Progress::Complete),
            SliceStatus::MaxMatchesReached { location } => {
                self.position = location.end.rebase(&self.position);
                Ok(Progress::Resume)
            }
        }
    }

    pub fn into_entries(self) -> Vec<BibEntry> {
        self.entries
    }
}

/// Drives [`SliceCursor`] cooperatively on the tokio runtime
#[derive(Debug, Clone)]
pub struct ChunkedParser {
    options: ParserOptions,
    slice_budget: Duration,
}

impl Default for ChunkedParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MATCHES)
    }
}

impl ChunkedParser {
    pub fn new(max_matches: usize) -> Self {
        Self {
            options: ParserOptions::bounded(max_matches.max(1)),
            slice_budget: DEFAULT_SLICE_BUDGET,
        }
    }

    /// Time spent parsing per scheduling opportunity before yielding
    pub fn with_slice_budget(mut self, slice_budget: Duration) -> Self {
        self.slice_budget = slice_budget;
        self
    }

    /// Parse `text` to completion, yielding between time slices.
    ///
    /// With a ticket, the run gives up at its next yield point once a newer
    /// run has started.
    pub async fn run(
        &self,
        text: &str,
        ticket: Option<&RunTicket>,
    ) -> Result<ParseBatch, ParseFailure> {
        let started = Instant::now();
        let mut cursor = SliceCursor::new(text);
        let mut opportunities = 0;

        loop {
            if let Some(ticket) = ticket.filter(|ticket| !ticket.is_current()) {
                tracing::debug!(
                    generation = ticket.generation(),
                    offset = cursor.position().offset,
                    "Abandoning superseded parse run"
                );
                return Err(ParseFailure::Superseded {
                    generation: ticket.generation(),
                });
            }

            opportunities += 1;
            let deadline = Instant::now() + self.slice_budget;
            loop {
                match cursor.advance(&self.options) {
                    Ok(Progress::Complete) => {
                        let stats = ParseStats {
                            invocations: cursor.invocations(),
                            opportunities,
                            elapsed: started.elapsed(),
                        };
                        let entries = cursor.into_entries();
                        tracing::debug!(
                            entries = entries.len(),
                            invocations = stats.invocations,
                            "BibTeX text parsed in {} ms",
                            stats.elapsed.as_millis()
                        );
                        return Ok(ParseBatch { entries, stats });
                    }
                    Ok(Progress::Resume) => {}
                    Err(error) => {
                        tracing::error!("Parsing error: {}", error);
                        return Err(error.into());
                    }
                }
                if Instant::now() >= deadline {
                    break;
                }
            }

            tokio::task::yield_now().await;
        }
    }

    /// Parse `text` and publish the batch into `store` if this run is still the latest
    pub async fn import_into(
        &self,
        store: &BibliographyStore,
        text: &str,
    ) -> Result<ParseStats, ParseFailure> {
        let ticket = store.begin_run();
        let batch = self.run(text, Some(&ticket)).await?;
        if store.publish(&ticket, batch.entries) {
            tracing::debug!("Imported {} entries", store.len());
            Ok(batch.stats)
        } else {
            Err(ParseFailure::Superseded {
                generation: ticket.generation(),
            })
        }
    }
}
