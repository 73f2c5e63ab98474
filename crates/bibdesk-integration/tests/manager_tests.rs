//! BibtexManager: loading, citations and attachment links

mod common;

use std::path::{Path, PathBuf};

use bibdesk_bibtex::ParseFailure;
use bibdesk_bookmark::{DecodeError, ResolveError, SyncStatus, UriError};
use bibdesk_integration::{BibtexManager, LibrarySource, LinkError, Settings};
use common::fakes::CountingFetcher;
use common::fixtures::install_bibtex_fixture;
use rstest::rstest;

const BASE: &str = "https://releases.test/download";

fn settings_in(dir: &Path, library: Option<&Path>) -> Settings {
    let mut settings = Settings {
        bibtex_filepath: library
            .map(|path| path.display().to_string())
            .unwrap_or_default(),
        ..Default::default()
    };
    settings.resolver.version = "1.2.0".to_string();
    settings.resolver.script_path = Some(dir.join("resolver/bookmark_resolver.scpt"));
    settings.resolver.binary_path = Some(dir.join("resolver/bookmark_resolver"));
    settings.resolver.release_base_url = BASE.to_string();
    settings
}

async fn loaded_library(dir: &Path) -> BibtexManager<CountingFetcher> {
    let library = install_bibtex_fixture(dir, "bibdesk_library.bib");
    let manager =
        BibtexManager::with_fetcher(settings_in(dir, Some(&library)), CountingFetcher::default());
    manager.load().await.unwrap();
    manager
}

// === Loading ===

#[tokio::test]
async fn test_load_library_file() {
    let dir = tempfile::tempdir().unwrap();
    let library = install_bibtex_fixture(dir.path(), "bibdesk_library.bib");
    let manager = BibtexManager::with_fetcher(
        settings_in(dir.path(), Some(&library)),
        CountingFetcher::default(),
    );

    let report = manager.load().await.unwrap().unwrap();
    assert_eq!(report.source, LibrarySource::File(library));
    assert_eq!(report.entries, 3);

    let keys: Vec<_> = manager
        .entries()
        .into_iter()
        .map(|entry| entry.citekey)
        .collect();
    assert_eq!(keys, vec!["Bell:1964", "Einstein:1935", "NoFile:2020"]);
}

#[tokio::test]
async fn test_non_utf8_library_is_still_imported() {
    let dir = tempfile::tempdir().unwrap();
    let library = install_bibtex_fixture(dir.path(), "latin1_library.bib");
    let manager = BibtexManager::with_fetcher(
        settings_in(dir.path(), Some(&library)),
        CountingFetcher::default(),
    );

    let report = manager.load().await.unwrap().unwrap();
    assert_eq!(report.source, LibrarySource::File(library));
    assert_eq!(report.entries, 2);
    assert!(manager.entry("Watson:1953").is_none());

    let goedel = manager.entry("Goedel:1931").unwrap();
    assert_eq!(goedel.authors[0].last, "G\u{FFFD}del");
    assert_eq!(goedel.field("volume"), Some("38"));
}

#[tokio::test]
async fn test_missing_path_falls_back_to_demo() {
    let dir = tempfile::tempdir().unwrap();
    let manager =
        BibtexManager::with_fetcher(settings_in(dir.path(), None), CountingFetcher::default());

    let report = manager.load().await.unwrap().unwrap();
    assert_eq!(report.source, LibrarySource::Demo);
    assert!(manager.entry("Watson:1953").is_some());
}

#[tokio::test]
async fn test_unreadable_file_falls_back_to_demo() {
    let dir = tempfile::tempdir().unwrap();
    let absent = dir.path().join("absent.bib");
    let manager = BibtexManager::with_fetcher(
        settings_in(dir.path(), Some(&absent)),
        CountingFetcher::default(),
    );

    let report = manager.load().await.unwrap().unwrap();
    assert_eq!(report.source, LibrarySource::Demo);
    assert_eq!(manager.store().len(), 3);
}

#[tokio::test]
async fn test_nothing_to_load_without_demo() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings {
        use_demo_entries: false,
        ..settings_in(dir.path(), None)
    };
    let manager = BibtexManager::with_fetcher(settings, CountingFetcher::default());

    assert!(manager.load().await.unwrap().is_none());
    assert!(!manager.store().is_loaded());
    assert!(manager.entries().is_empty());
}

#[tokio::test]
async fn test_deferred_load() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings {
        import_delay_ms: 1,
        ..settings_in(dir.path(), None)
    };
    let manager = BibtexManager::with_fetcher(settings, CountingFetcher::default());

    let report = manager.load_deferred().await.unwrap().unwrap();
    assert_eq!(report.entries, 3);
}

#[tokio::test]
async fn test_reload_with_malformed_file_keeps_library() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = loaded_library(dir.path()).await;

    let malformed = install_bibtex_fixture(dir.path(), "malformed.bib");
    manager
        .apply_settings(settings_in(dir.path(), Some(&malformed)))
        .await;

    match manager.load().await {
        Err(ParseFailure::Syntax(error)) => assert_eq!(error.location.start.line, 10),
        other => panic!("expected a syntax error, got {other:?}"),
    }
    assert_eq!(manager.store().len(), 3);
    assert!(manager.entry("Einstein:1935").is_some());
    assert!(manager.entry("Good1").is_none());
}

#[tokio::test]
async fn test_small_slices_import_the_same_library() {
    let dir = tempfile::tempdir().unwrap();
    let library = install_bibtex_fixture(dir.path(), "bibdesk_library.bib");
    let settings = Settings {
        max_matches: 1,
        slice_budget_ms: 0,
        ..settings_in(dir.path(), Some(&library))
    };
    let manager = BibtexManager::with_fetcher(settings, CountingFetcher::default());

    let report = manager.load().await.unwrap().unwrap();
    assert_eq!(report.stats.invocations, 4);
    assert_eq!(report.entries, 3);
}

// === Citations ===

#[tokio::test]
async fn test_format_citation_with_settings() {
    let dir = tempfile::tempdir().unwrap();
    let manager = loaded_library(dir.path()).await;

    let citation = manager.format_citation("Einstein:1935").unwrap();
    assert_eq!(citation.authors, vec!["A. Einstein", "B. Podolsky", "and N. Rosen"]);
    assert_eq!(citation.journal_reference, "Phys. Rev. 47, 777 (1935)");
    assert_eq!(citation.link, "[Einstein:1935](x-bdsk://Einstein:1935)");

    let bell = manager.format_citation("Bell:1964").unwrap();
    assert_eq!(
        bell.to_string(),
        "J. S. Bell. On the Einstein Podolsky Rosen Paradox. arXiv:quant-ph/0000001 (1964)."
    );

    assert!(manager.format_citation("Unknown").is_none());
}

// === Links ===

#[rstest]
#[case::foreign_scheme("https://example.com", |e: &LinkError| {
    matches!(e, LinkError::Uri(UriError::UnsupportedScheme(_)))
})]
#[case::bad_document("x-bdsk://Einstein:1935?doc=x", |e: &LinkError| {
    matches!(e, LinkError::Uri(UriError::InvalidDocument(_)))
})]
#[case::unknown_citekey("x-bdsk://Nobody:2000", |e: &LinkError| {
    matches!(e, LinkError::UnknownCitekey(_))
})]
#[case::missing_attachment("x-bdsk://Einstein:1935?doc=3", |e: &LinkError| {
    matches!(e, LinkError::Decode { source: DecodeError::MissingField { .. }, .. })
})]
#[case::not_a_bookmark("x-bdsk://Bell:1964", |e: &LinkError| {
    matches!(e, LinkError::Decode { source: DecodeError::NotABookmark(_), .. })
})]
// The resolver was never installed
#[case::resolver_not_installed("x-bdsk://Einstein:1935", |e: &LinkError| {
    matches!(e, LinkError::Resolve { source: ResolveError::MissingArtifact(_), .. })
})]
#[tokio::test]
async fn test_link_errors_are_distinct(
    #[case] uri: &str,
    #[case] expected: fn(&LinkError) -> bool,
) {
    let dir = tempfile::tempdir().unwrap();
    let manager = loaded_library(dir.path()).await;

    match manager.pdf_url_from_uri(uri).await {
        Err(error) => assert!(expected(&error), "unexpected error for {uri}: {error:?}"),
        Ok(url) => panic!("{uri} resolved to {url}"),
    }
}

#[cfg(unix)]
mod with_fake_resolver {
    use super::*;
    use common::fakes::{write_executable, FIXTURE_RESOLVER};

    async fn manager_with_resolver(dir: &Path) -> BibtexManager<CountingFetcher> {
        let library = install_bibtex_fixture(dir, "bibdesk_library.bib");
        let mut settings = settings_in(dir, Some(&library));
        settings.resolver.interpreter = "sh".to_string();
        settings.resolver.script_path =
            Some(write_executable(dir, "bookmark_resolver.sh", FIXTURE_RESOLVER));

        let manager = BibtexManager::with_fetcher(settings, CountingFetcher::default());
        manager.load().await.unwrap();
        manager
    }

    #[tokio::test]
    async fn test_open_link_as_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with_resolver(dir.path()).await;

        assert_eq!(
            manager
                .pdf_url_from_uri("x-bdsk://Einstein%3A1935?doc=1")
                .await
                .unwrap(),
            "file:///Users/me/Papers/Einstein%201935.pdf"
        );
        assert_eq!(
            manager.pdf_url_from_uri("x-bdsk://Einstein:1935?doc=2").await.unwrap(),
            "file:///Users/me/Supplements/Einstein1935-notes.txt"
        );
    }

    #[tokio::test]
    async fn test_resolve_attachments_keeps_indices() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with_resolver(dir.path()).await;

        let attachments = manager.resolve_attachments("Einstein:1935").await;
        let indices: Vec<_> = attachments.iter().map(|a| a.index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert_eq!(attachments[0].parsed_path.filename, "Einstein 1935");
        assert_eq!(attachments[1].parsed_path.ext, ".txt");

        let pdfs = manager
            .resolve_attachments_with_extension("Einstein:1935", ".pdf")
            .await;
        assert_eq!(pdfs.len(), 1);
        assert_eq!(pdfs[0].index, 1);
        assert_eq!(pdfs[0].parsed_path.dir, "/Users/me/Papers");
    }

    #[tokio::test]
    async fn test_failed_attachments_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with_resolver(dir.path()).await;

        assert!(manager.resolve_attachments("Bell:1964").await.is_empty());
        assert!(manager.resolve_attachments("NoFile:2020").await.is_empty());
        assert!(manager.resolve_attachments("Nobody:2000").await.is_empty());
    }
}

// === Resolver sync ===

#[tokio::test]
async fn test_sync_resolver_uses_configured_version() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = CountingFetcher::default().with_artifact(
        "https://releases.test/download/1.2.0/bookmark_resolver.scpt",
        b"script",
    );
    let manager = BibtexManager::with_fetcher(settings_in(dir.path(), None), fetcher);

    let report = manager.sync_resolver().await;
    assert_eq!(report.script, Some(SyncStatus::Downloaded));
    assert_eq!(report.binary, None);

    let report = manager.sync_resolver().await;
    assert_eq!(report.script, Some(SyncStatus::UpToDate));
    assert_eq!(manager.resolver().fetcher().request_count(), 1);

    let marker = PathBuf::from(format!(
        "{}.version",
        dir.path().join("resolver/bookmark_resolver.scpt").display()
    ));
    assert_eq!(std::fs::read_to_string(marker).unwrap(), "1.2.0");
}

#[tokio::test]
async fn test_apply_settings_switches_backend() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager =
        BibtexManager::with_fetcher(settings_in(dir.path(), None), CountingFetcher::default());
    assert!(!manager.resolver().config().use_native_binary);

    let settings = Settings {
        use_native_binary: true,
        ..settings_in(dir.path(), None)
    };
    manager.apply_settings(settings).await;

    assert!(manager.resolver().config().use_native_binary);
    assert!(manager.settings().use_native_binary);
}
