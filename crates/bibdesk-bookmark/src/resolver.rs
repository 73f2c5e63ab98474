//! Bookmark resolver backends
//!
//! macOS bookmarks can only be resolved by the OS, so resolution is delegated
//! to an external helper. Two helpers exist: an AppleScript run through an
//! interpreter (bookmark passed as an argument) and a native binary (bookmark
//! passed on stdin). Both print the resolved POSIX path on stdout.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::http::DEFAULT_RELEASE_BASE_URL;

pub const SCRIPT_ARTIFACT: &str = "bookmark_resolver.scpt";
pub const BINARY_ARTIFACT: &str = "bookmark_resolver";
pub const DEFAULT_INTERPRETER: &str = "osascript";
/// Upper bound on a single resolver or `--version` invocation
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Script,
    Binary,
}

impl Backend {
    pub fn artifact(&self) -> &'static str {
        match self {
            Backend::Script => SCRIPT_ARTIFACT,
            Backend::Binary => BINARY_ARTIFACT,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Script => write!(f, "script"),
            Backend::Binary => write!(f, "binary"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("no install path configured for the {0} resolver")]
    NotConfigured(Backend),
    #[error("bookmark resolver not found at {}", .0.display())]
    MissingArtifact(PathBuf),
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to communicate with {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("could not resolve bookmark: {diagnostic}")]
    Backend {
        status: Option<i32>,
        diagnostic: String,
    },
    #[error("{program} did not finish within {} s", .timeout.as_secs_f64())]
    Timeout { program: String, timeout: Duration },
    #[error("resolver returned an empty path")]
    EmptyOutput,
}

/// Install locations and backend selection, shared by resolution and sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    pub script_path: Option<PathBuf>,
    pub binary_path: Option<PathBuf>,
    pub interpreter: String,
    pub use_native_binary: bool,
    pub release_base_url: String,
    pub timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            script_path: None,
            binary_path: None,
            interpreter: DEFAULT_INTERPRETER.to_string(),
            use_native_binary: false,
            release_base_url: DEFAULT_RELEASE_BASE_URL.to_string(),
            timeout: DEFAULT_RESOLVE_TIMEOUT,
        }
    }
}

impl ResolverConfig {
    pub fn active_backend(&self) -> Backend {
        if self.use_native_binary {
            Backend::Binary
        } else {
            Backend::Script
        }
    }

    pub fn install_path(&self, backend: Backend) -> Option<&Path> {
        match backend {
            Backend::Script => self.script_path.as_deref(),
            Backend::Binary => self.binary_path.as_deref(),
        }
    }

    /// Build the resolver for the active backend
    pub fn resolver(&self) -> Result<Resolver, ResolveError> {
        let backend = self.active_backend();
        let path = self
            .install_path(backend)
            .ok_or(ResolveError::NotConfigured(backend))?
            .to_path_buf();
        Ok(match backend {
            Backend::Script => Resolver::Script(ScriptResolver {
                interpreter: self.interpreter.clone(),
                script_path: path,
                timeout: self.timeout,
            }),
            Backend::Binary => Resolver::Binary(BinaryResolver {
                binary_path: path,
                timeout: self.timeout,
            }),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptResolver {
    pub interpreter: String,
    pub script_path: PathBuf,
    pub timeout: Duration,
}

impl ScriptResolver {
    async fn resolve(&self, encoded: &str) -> Result<PathBuf, ResolveError> {
        ensure_installed(&self.script_path).await?;
        let mut command = Command::new(&self.interpreter);
        command.arg(&self.script_path).arg(encoded);
        let output = run_piped(command, &self.interpreter, None, self.timeout).await?;
        resolved_path(output)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryResolver {
    pub binary_path: PathBuf,
    pub timeout: Duration,
}

impl BinaryResolver {
    async fn resolve(&self, encoded: &str) -> Result<PathBuf, ResolveError> {
        ensure_installed(&self.binary_path).await?;
        let mut command = Command::new(&self.binary_path);
        command.arg("-p");
        let program = self.binary_path.display().to_string();
        let output = run_piped(command, &program, Some(encoded.as_bytes()), self.timeout).await?;
        resolved_path(output)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolver {
    Script(ScriptResolver),
    Binary(BinaryResolver),
}

impl Resolver {
    pub fn backend(&self) -> Backend {
        match self {
            Resolver::Script(_) => Backend::Script,
            Resolver::Binary(_) => Backend::Binary,
        }
    }

    /// Resolve raw bookmark bytes to the file they point to
    pub async fn resolve(&self, bookmark: &[u8]) -> Result<PathBuf, ResolveError> {
        let encoded = STANDARD.encode(bookmark);
        let result = match self {
            Resolver::Script(script) => script.resolve(&encoded).await,
            Resolver::Binary(binary) => binary.resolve(&encoded).await,
        };
        if let Err(error) = &result {
            tracing::warn!(backend = %self.backend(), "{error}");
        }
        result
    }
}

async fn ensure_installed(path: &Path) -> Result<(), ResolveError> {
    match tokio::fs::try_exists(path).await {
        Ok(true) => Ok(()),
        _ => Err(ResolveError::MissingArtifact(path.to_path_buf())),
    }
}

/// Run `command` with all standard streams piped and collect its output
///
/// The child is killed if the future is dropped or `timeout` elapses, and its
/// pipes are closed once `wait_with_output` returns.
pub(crate) async fn run_piped(
    mut command: Command,
    program: &str,
    input: Option<&[u8]>,
    timeout: Duration,
) -> Result<Output, ResolveError> {
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ResolveError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        if let Some(input) = input {
            // A child that exits without reading reports through its status
            if let Err(error) = stdin.write_all(input).await {
                tracing::debug!(program, "failed to write to stdin: {error}");
            }
        }
        drop(stdin);
    }

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => output.map_err(|source| ResolveError::Io {
            program: program.to_string(),
            source,
        }),
        Err(_) => Err(ResolveError::Timeout {
            program: program.to_string(),
            timeout,
        }),
    }
}

fn resolved_path(output: Output) -> Result<PathBuf, ResolveError> {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() || !stderr.is_empty() {
        let diagnostic = match stderr.trim() {
            "" => "Unknown error".to_string(),
            text => text.to_string(),
        };
        return Err(ResolveError::Backend {
            status: output.status.code(),
            diagnostic,
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    match stdout.trim() {
        "" => Err(ResolveError::EmptyOutput),
        path => Ok(PathBuf::from(path)),
    }
}
