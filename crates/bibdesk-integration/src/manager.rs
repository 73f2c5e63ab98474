//! Library lifecycle: load, look up, cite and open attachments

use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use bibdesk_bibtex::{
    bibdesk_uri_link, format_authors, format_journal_reference, format_title, BibEntry,
    BibliographyStore, ChunkedParser, ParseFailure, ParseStats, DEMO_BIBTEX,
};
use bibdesk_bookmark::{
    decode_attachment, parse_file_path, posix_to_file_url, ArtifactFetcher, BibDeskLink,
    DecodeError, HttpClient, HttpError, ParsedPathWithIndex, ResolveError, ResolverContext,
    SyncReport, UriError,
};
use thiserror::Error;

use crate::settings::Settings;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error(transparent)]
    Uri(#[from] UriError),
    #[error("no entry found for the citekey {0}")]
    UnknownCitekey(String),
    #[error("document number {doc} of citekey {citekey} is not a valid bookmark: {source}")]
    Decode {
        citekey: String,
        doc: u32,
        #[source]
        source: DecodeError,
    },
    #[error("document number {doc} of citekey {citekey} could not be resolved: {source}")]
    Resolve {
        citekey: String,
        doc: u32,
        #[source]
        source: ResolveError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibrarySource {
    File(PathBuf),
    Demo,
}

impl fmt::Display for LibrarySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibrarySource::File(path) => write!(f, "{}", path.display()),
            LibrarySource::Demo => write!(f, "demo library"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub source: LibrarySource,
    pub stats: ParseStats,
    pub entries: usize,
}

/// A formatted reference to one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    pub citekey: String,
    pub authors: Vec<String>,
    pub title: String,
    pub journal_reference: String,
    /// Markdown link opening the entry in BibDesk
    pub link: String,
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut authors = String::new();
        for (i, author) in self.authors.iter().enumerate() {
            if i > 0 {
                authors.push_str(if author == "et al." { " " } else { ", " });
            }
            authors.push_str(author);
        }

        let parts: Vec<&str> = [
            authors.as_str(),
            self.title.as_str(),
            self.journal_reference.as_str(),
        ]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{part}")?;
            if !part.ends_with(&['.', '?', '!'][..]) {
                write!(f, ".")?;
            }
        }
        Ok(())
    }
}

pub struct BibtexManager<F = HttpClient> {
    settings: Settings,
    store: BibliographyStore,
    parser: ChunkedParser,
    resolver: ResolverContext<F>,
}

impl BibtexManager<HttpClient> {
    /// Manager downloading resolver artifacts over HTTP
    pub fn new(settings: Settings) -> Result<Self, HttpError> {
        Ok(Self::with_fetcher(settings, HttpClient::with_default_agent()?))
    }
}

impl<F: ArtifactFetcher> BibtexManager<F> {
    pub fn with_fetcher(settings: Settings, fetcher: F) -> Self {
        Self {
            parser: settings.chunked_parser(),
            resolver: ResolverContext::new(settings.resolver_config(), fetcher),
            store: BibliographyStore::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &BibliographyStore {
        &self.store
    }

    pub fn resolver(&self) -> &ResolverContext<F> {
        &self.resolver
    }

    /// Apply changed settings; the loaded library is kept
    pub async fn apply_settings(&mut self, settings: Settings) {
        self.resolver.reconfigure(settings.resolver_config()).await;
        self.parser = settings.chunked_parser();
        self.settings = settings;
    }

    /// Import the configured library, falling back to the demo library
    ///
    /// Returns `Ok(None)` when there was nothing to import. On a parse
    /// failure the previously loaded library stays in place.
    pub async fn load(&self) -> Result<Option<LoadReport>, ParseFailure> {
        let Some((text, source)) = self.read_library().await else {
            return Ok(None);
        };

        let stats = self.parser.import_into(&self.store, &text).await?;
        let entries = self.store.len();
        tracing::info!("Imported {} entries from {}", entries, source);
        Ok(Some(LoadReport {
            source,
            stats,
            entries,
        }))
    }

    /// `load` after the configured import delay
    pub async fn load_deferred(&self) -> Result<Option<LoadReport>, ParseFailure> {
        tokio::time::sleep(self.settings.import_delay()).await;
        self.load().await
    }

    async fn read_library(&self) -> Option<(String, LibrarySource)> {
        if let Some(path) = self.settings.bibtex_path() {
            let started = Instant::now();
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    tracing::debug!(
                        "BibTeX file loaded in {} ms",
                        started.elapsed().as_millis()
                    );
                    let text = match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(error) => {
                            tracing::warn!(
                                "{} is not valid UTF-8, undecodable bytes were replaced",
                                path.display()
                            );
                            String::from_utf8_lossy(error.as_bytes()).into_owned()
                        }
                    };
                    return Some((text, LibrarySource::File(path)));
                }
                Err(error) => {
                    tracing::warn!("Failed to read BibTeX file {}: {}", path.display(), error)
                }
            }
        }

        if self.settings.use_demo_entries {
            tracing::debug!("Using the demo library");
            Some((DEMO_BIBTEX.to_string(), LibrarySource::Demo))
        } else {
            tracing::info!("No BibTeX library to import");
            None
        }
    }

    pub fn entry(&self, citekey: &str) -> Option<BibEntry> {
        self.store.get(citekey)
    }

    /// All entries, ordered by citekey
    pub fn entries(&self) -> Vec<BibEntry> {
        let mut entries = self.store.list();
        entries.sort_by(|a, b| a.citekey.cmp(&b.citekey));
        entries
    }

    pub fn format_citation(&self, citekey: &str) -> Option<Citation> {
        let entry = self.store.get(citekey)?;
        Some(Citation {
            authors: format_authors(&entry, &self.settings.authors),
            title: format_title(&entry).to_string(),
            journal_reference: format_journal_reference(&entry, &self.settings.journal),
            link: bibdesk_uri_link(&entry),
            citekey: entry.citekey,
        })
    }

    /// Resolve an `x-bdsk://<citekey>?doc=<N>` link to a `file://` URL
    pub async fn pdf_url_from_uri(&self, uri: &str) -> Result<String, LinkError> {
        let result = self.resolve_link(uri).await;
        if let Err(error) = &result {
            tracing::error!("{error}");
        }
        result
    }

    async fn resolve_link(&self, uri: &str) -> Result<String, LinkError> {
        let link = BibDeskLink::from_uri(uri)?;
        let entry = self
            .store
            .get(&link.citekey)
            .ok_or_else(|| LinkError::UnknownCitekey(link.citekey.clone()))?;

        let bookmark = decode_attachment(&entry, link.doc).map_err(|source| LinkError::Decode {
            citekey: link.citekey.clone(),
            doc: link.doc,
            source,
        })?;
        let path = self
            .resolver
            .resolve_bookmark(&bookmark)
            .await
            .map_err(|source| LinkError::Resolve {
                citekey: link.citekey.clone(),
                doc: link.doc,
                source,
            })?;

        Ok(posix_to_file_url(&path.to_string_lossy())?)
    }

    /// Resolve every attachment of `citekey`, skipping those that fail
    pub async fn resolve_attachments(&self, citekey: &str) -> Vec<ParsedPathWithIndex> {
        let Some(entry) = self.store.get(citekey) else {
            tracing::warn!("No entry found for the citekey {}", citekey);
            return Vec::new();
        };

        let mut resolved = Vec::new();
        for index in entry.attachment_indices() {
            let bookmark = match decode_attachment(&entry, index) {
                Ok(bookmark) => bookmark,
                Err(error) => {
                    tracing::warn!(citekey, index, "Skipping attachment: {error}");
                    continue;
                }
            };
            match self.resolver.resolve_bookmark(&bookmark).await {
                Ok(path) => resolved.push(ParsedPathWithIndex {
                    index,
                    parsed_path: parse_file_path(&path.to_string_lossy()),
                }),
                Err(error) => {
                    tracing::warn!(citekey, index, "Skipping attachment: {error}");
                }
            }
        }
        resolved
    }

    /// Resolved attachments whose extension (with the dot) matches `ext`
    pub async fn resolve_attachments_with_extension(
        &self,
        citekey: &str,
        ext: &str,
    ) -> Vec<ParsedPathWithIndex> {
        let mut resolved = self.resolve_attachments(citekey).await;
        resolved.retain(|attachment| attachment.parsed_path.has_extension(ext));
        resolved
    }

    /// Bring the resolver artifacts to the configured version
    pub async fn sync_resolver(&self) -> SyncReport {
        self.resolver
            .ensure_resolver(
                &self.settings.resolver.version,
                self.settings.use_native_binary,
            )
            .await
    }
}
