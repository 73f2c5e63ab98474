//! Citekey-indexed bibliography store
//!
//! The store holds an immutable snapshot that is swapped wholesale on every
//! successful import, so readers see either the previous complete batch or
//! the next one, never a mix. Parse runs are versioned with [`RunTicket`]s and
//! only the most recently started run may publish.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::entry::BibEntry;

pub type BibSnapshot = Arc<HashMap<String, BibEntry>>;

/// Identifies one parse run against a store
#[derive(Debug, Clone)]
pub struct RunTicket {
    generation: u64,
    latest: Arc<AtomicU64>,
}

impl RunTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// False once a newer run has been started (or the store was reset)
    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::Acquire) == self.generation
    }
}

#[derive(Debug, Default)]
pub struct BibliographyStore {
    snapshot: RwLock<Option<BibSnapshot>>,
    latest_run: Arc<AtomicU64>,
}

impl BibliographyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new parse run, superseding any run still in flight
    pub fn begin_run(&self) -> RunTicket {
        let generation = self.latest_run.fetch_add(1, Ordering::AcqRel) + 1;
        RunTicket {
            generation,
            latest: Arc::clone(&self.latest_run),
        }
    }

    /// Replace the store with `entries`, last entry winning on duplicate citekeys
    pub fn ingest(&self, entries: Vec<BibEntry>) {
        let indexed = index_entries(entries);
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(indexed));
    }

    /// Ingest the result of a run, unless a newer run has started since.
    ///
    /// Returns whether the entries were published.
    pub fn publish(&self, ticket: &RunTicket, entries: Vec<BibEntry>) -> bool {
        let indexed = index_entries(entries);
        let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        if !ticket.is_current() {
            tracing::debug!(
                generation = ticket.generation(),
                "Discarding stale parse result"
            );
            return false;
        }
        *guard = Some(Arc::new(indexed));
        true
    }

    pub fn get(&self, citekey: &str) -> Option<BibEntry> {
        self.snapshot()?.get(citekey).cloned()
    }

    /// All entries of the current snapshot, in no particular order
    pub fn list(&self) -> Vec<BibEntry> {
        self.snapshot()
            .map(|snapshot| snapshot.values().cloned().collect())
            .unwrap_or_default()
    }

    /// The current snapshot, or `None` before the first completed import
    pub fn snapshot(&self) -> Option<BibSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot().is_some()
    }

    pub fn len(&self) -> usize {
        self.snapshot().map_or(0, |snapshot| snapshot.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all entries and invalidate runs in flight
    pub fn reset(&self) {
        self.latest_run.fetch_add(1, Ordering::AcqRel);
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

fn index_entries(entries: Vec<BibEntry>) -> HashMap<String, BibEntry> {
    entries
        .into_iter()
        .map(|mut entry| {
            normalize_title(&mut entry);
            (entry.citekey.clone(), entry)
        })
        .collect()
}

/// Ensure a `title` field exists and drop one layer of enclosing braces
fn normalize_title(entry: &mut BibEntry) {
    let title = entry.fields.entry("title".to_string()).or_default();
    if let Some(inner) = strip_enclosing_braces(title) {
        *title = inner.to_string();
    }
}

/// The text inside `{...}` when the first and last braces match each other
fn strip_enclosing_braces(text: &str) -> Option<&str> {
    let inner = text.strip_prefix('{')?.strip_suffix('}')?;
    let mut depth = 0i32;
    for c in inner.chars() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            _ => {}
        }
    }
    (depth == 0).then_some(inner)
}
