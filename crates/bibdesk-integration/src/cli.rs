//! The `bibdesk` command line

use std::io::{self, Write};
use std::path::PathBuf;

use bibdesk_bibtex::{format_title, ParseFailure};
use bibdesk_bookmark::{ArtifactFetcher, Backend, SyncStatus};
use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::manager::{BibtexManager, LinkError};

#[derive(Parser, Debug)]
#[command(name = "bibdesk", author, version, about = "Query a BibDesk library and open its attachments", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file [default: <config dir>/bibdesk-integration/config.toml]
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// List the entries of the library
    List {
        /// Print the entries as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a formatted citation
    Cite { citekey: String },

    /// Resolve an x-bdsk:// link to a file URL
    Open {
        #[arg(value_name = "URI")]
        uri: String,
    },

    /// Resolve the attached files of an entry
    Attachments {
        citekey: String,

        /// Only list files with this extension, e.g. ".pdf"
        #[arg(long, value_name = "EXT")]
        ext: Option<String>,

        /// Print the attachments as JSON
        #[arg(long)]
        json: bool,
    },

    /// Download the bookmark resolver if it is missing or outdated
    Sync,
}

impl Commands {
    fn needs_library(&self) -> bool {
        !matches!(self, Commands::Sync)
    }
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error("failed to import the library: {0}")]
    Import(#[from] ParseFailure),
    #[error("no entry found for the citekey {0}")]
    UnknownCitekey(String),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bookmark resolver sync failed")]
    SyncFailed,
}

/// Run `command`, writing its results to `out`
pub async fn execute<F: ArtifactFetcher, W: Write>(
    command: &Commands,
    manager: &BibtexManager<F>,
    out: &mut W,
) -> Result<(), CliError> {
    if command.needs_library() {
        manager.load().await?;
    }

    match command {
        Commands::List { json: true } => {
            serde_json::to_writer_pretty(&mut *out, &manager.entries())?;
            writeln!(out)?;
        }
        Commands::List { json: false } => {
            for entry in manager.entries() {
                writeln!(out, "{}\t{}", entry.citekey, format_title(&entry))?;
            }
        }
        Commands::Cite { citekey } => {
            let citation = manager
                .format_citation(citekey)
                .ok_or_else(|| CliError::UnknownCitekey(citekey.clone()))?;
            writeln!(out, "{citation}")?;
            writeln!(out, "{}", citation.link)?;
        }
        Commands::Open { uri } => {
            let url = manager.pdf_url_from_uri(uri).await?;
            writeln!(out, "{url}")?;
        }
        Commands::Attachments { citekey, ext, json } => {
            if manager.entry(citekey).is_none() {
                return Err(CliError::UnknownCitekey(citekey.clone()));
            }
            let attachments = match ext {
                Some(ext) => {
                    manager
                        .resolve_attachments_with_extension(citekey, &dotted(ext))
                        .await
                }
                None => manager.resolve_attachments(citekey).await,
            };
            if *json {
                serde_json::to_writer_pretty(&mut *out, &attachments)?;
                writeln!(out)?;
            } else {
                for attachment in &attachments {
                    writeln!(out, "{}\t{}", attachment.index, attachment.parsed_path.path)?;
                }
            }
        }
        Commands::Sync => {
            let report = manager.sync_resolver().await;
            for backend in [Backend::Script, Backend::Binary] {
                let status = match report.status(backend) {
                    Some(SyncStatus::UpToDate) => "up to date".to_string(),
                    Some(SyncStatus::Downloaded) => "downloaded".to_string(),
                    Some(SyncStatus::Failed(reason)) => format!("failed: {reason}"),
                    None => "not checked".to_string(),
                };
                writeln!(out, "{backend}: {status}")?;
            }
            if report.has_failures() {
                return Err(CliError::SyncFailed);
            }
        }
    }
    Ok(())
}

/// Accept both "pdf" and ".pdf"
fn dotted(ext: &str) -> String {
    if ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{ext}")
    }
}
