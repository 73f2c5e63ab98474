//! BibDesk integration
//!
//! Ties the BibTeX importer and the bookmark resolver together: settings,
//! the `BibtexManager` that owns the loaded library, and the `bibdesk`
//! command line.

pub mod cli;
pub mod logging;
pub mod manager;
pub mod settings;

pub use manager::{BibtexManager, Citation, LibrarySource, LinkError, LoadReport};
pub use settings::{ConfigError, ResolverSettings, Settings};
