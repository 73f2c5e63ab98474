//! BibDesk attachment bookmarks
//!
//! Decodes the `bdsk-file-N` fields BibDesk writes, resolves the embedded
//! macOS bookmarks through an external resolver, and keeps that resolver
//! installed at the expected version.

pub mod bookmark;
pub mod http;
pub mod path;
pub mod resolver;
pub mod sync;
pub mod uri;

pub use bookmark::{decode_attachment, Bookmark, DecodeError};
pub use http::{release_url, ArtifactFetcher, HttpClient, HttpError, DEFAULT_RELEASE_BASE_URL};
pub use path::{parse_file_path, posix_to_file_url, ParsedPath, ParsedPathWithIndex};
pub use resolver::{
    Backend, BinaryResolver, ResolveError, Resolver, ResolverConfig, ScriptResolver,
    BINARY_ARTIFACT, DEFAULT_INTERPRETER, DEFAULT_RESOLVE_TIMEOUT, SCRIPT_ARTIFACT,
};
pub use sync::{version_marker, BackendState, ResolverContext, SyncError, SyncReport, SyncStatus};
pub use uri::{parse_uri, BibDeskLink, ParsedUri, Queries, UriError, BIBDESK_SCHEME};
