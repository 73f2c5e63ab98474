//! Resolver context and artifact version sync
//!
//! `ResolverContext` owns the resolver configuration and one gate per
//! backend. Resolutions share a backend's gate; syncing and reconfiguring
//! take it exclusively, so an artifact is never replaced under a running
//! resolution and two syncs of the same backend never interleave.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tokio::sync::RwLock as Gate;

use crate::bookmark::Bookmark;
use crate::http::{release_url, ArtifactFetcher, HttpClient, HttpError};
use crate::resolver::{run_piped, Backend, ResolveError, ResolverConfig};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("download failed: {0}")]
    Http(#[from] HttpError),
    #[error("failed to install {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SyncError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| SyncError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Lifecycle of one backend's installed artifact
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BackendState {
    #[default]
    Unknown,
    Checking,
    Downloading,
    UpToDate {
        version: String,
    },
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    UpToDate,
    Downloaded,
    Failed(String),
}

/// Outcome of `ensure_resolver`; `None` means the backend was not checked
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub script: Option<SyncStatus>,
    pub binary: Option<SyncStatus>,
}

impl SyncReport {
    pub fn status(&self, backend: Backend) -> Option<&SyncStatus> {
        match backend {
            Backend::Script => self.script.as_ref(),
            Backend::Binary => self.binary.as_ref(),
        }
    }

    pub fn has_failures(&self) -> bool {
        [&self.script, &self.binary]
            .into_iter()
            .any(|status| matches!(status, Some(SyncStatus::Failed(_))))
    }
}

#[derive(Default)]
struct BackendSlot {
    gate: Gate<()>,
    state: Mutex<BackendState>,
}

pub struct ResolverContext<F = HttpClient> {
    config: RwLock<ResolverConfig>,
    fetcher: F,
    script: BackendSlot,
    binary: BackendSlot,
}

impl<F: ArtifactFetcher> ResolverContext<F> {
    pub fn new(config: ResolverConfig, fetcher: F) -> Self {
        Self {
            config: RwLock::new(config),
            fetcher,
            script: BackendSlot::default(),
            binary: BackendSlot::default(),
        }
    }

    pub fn config(&self) -> ResolverConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Replace the configuration once no resolution or sync is in flight
    pub async fn reconfigure(&self, config: ResolverConfig) {
        let _script = self.slot(Backend::Script).gate.write().await;
        let _binary = self.slot(Backend::Binary).gate.write().await;

        let mut current = self.config.write().unwrap_or_else(PoisonError::into_inner);
        for backend in [Backend::Script, Backend::Binary] {
            if current.install_path(backend) != config.install_path(backend) {
                self.set_state(backend, BackendState::Unknown);
            }
        }
        *current = config;
    }

    pub fn state(&self, backend: Backend) -> BackendState {
        self.slot(backend)
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Resolve raw bookmark bytes with the active backend
    pub async fn resolve(&self, bookmark: &[u8]) -> Result<PathBuf, ResolveError> {
        loop {
            let backend = self.config().active_backend();
            let _gate = self.slot(backend).gate.read().await;
            // A reconfigure may have switched backends while we waited
            let config = self.config();
            if config.active_backend() == backend {
                return config.resolver()?.resolve(bookmark).await;
            }
        }
    }

    pub async fn resolve_bookmark(&self, bookmark: &Bookmark) -> Result<PathBuf, ResolveError> {
        self.resolve(&bookmark.bookmark).await
    }

    /// Bring the installed resolver artifacts to `expected_version`
    ///
    /// The script is always checked; the binary only with `use_native_binary`.
    /// An installed script counts only when both the script and its `.version`
    /// marker exist, so a marker left behind by a deleted script still
    /// triggers a download. Failures are reported, never raised.
    pub async fn ensure_resolver(&self, expected_version: &str, use_native_binary: bool) -> SyncReport {
        let script = self.sync_backend(Backend::Script, expected_version).await;
        let binary = if use_native_binary {
            self.sync_backend(Backend::Binary, expected_version).await
        } else {
            None
        };
        SyncReport { script, binary }
    }

    async fn sync_backend(&self, backend: Backend, expected_version: &str) -> Option<SyncStatus> {
        let slot = self.slot(backend);
        let _gate = slot.gate.write().await;

        let config = self.config();
        let Some(path) = config.install_path(backend) else {
            tracing::debug!(%backend, "no install path configured, skipping sync");
            return None;
        };

        self.set_state(backend, BackendState::Checking);
        let installed = match backend {
            Backend::Script => script_version(path).await,
            Backend::Binary => binary_version(path, config.timeout).await,
        };
        if installed.as_deref() == Some(expected_version) {
            tracing::debug!(%backend, version = expected_version, "bookmark resolver is up to date");
            self.set_state(
                backend,
                BackendState::UpToDate {
                    version: expected_version.to_string(),
                },
            );
            return Some(SyncStatus::UpToDate);
        }

        let action = if installed.is_some() { "Updating" } else { "Downloading" };
        tracing::info!(%backend, version = expected_version, "{action} bookmark resolver");
        self.set_state(backend, BackendState::Downloading);

        let url = release_url(&config.release_base_url, expected_version, backend.artifact());
        match self.install(backend, &url, path, expected_version).await {
            Ok(()) => {
                tracing::info!(%backend, version = expected_version, "bookmark resolver installed");
                self.set_state(
                    backend,
                    BackendState::UpToDate {
                        version: expected_version.to_string(),
                    },
                );
                Some(SyncStatus::Downloaded)
            }
            Err(error) => {
                let reason = error.to_string();
                tracing::warn!(%backend, "failed to download bookmark resolver: {reason}");
                self.set_state(
                    backend,
                    BackendState::Failed {
                        reason: reason.clone(),
                    },
                );
                Some(SyncStatus::Failed(reason))
            }
        }
    }

    async fn install(
        &self,
        backend: Backend,
        url: &str,
        path: &Path,
        version: &str,
    ) -> Result<(), SyncError> {
        let bytes = self.fetcher.fetch(url).await?;
        let executable = backend == Backend::Binary;
        write_atomically(path, &bytes, executable).await?;
        if backend == Backend::Script {
            write_atomically(&version_marker(path), version.as_bytes(), false).await?;
        }
        Ok(())
    }

    fn slot(&self, backend: Backend) -> &BackendSlot {
        match backend {
            Backend::Script => &self.script,
            Backend::Binary => &self.binary,
        }
    }

    fn set_state(&self, backend: Backend, state: BackendState) {
        *self
            .slot(backend)
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = state;
    }
}

/// `<script>.version`, next to the script
pub fn version_marker(script_path: &Path) -> PathBuf {
    let mut marker = OsString::from(script_path.as_os_str());
    marker.push(".version");
    PathBuf::from(marker)
}

/// Version recorded for an installed script, if both files exist
async fn script_version(path: &Path) -> Option<String> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return None;
    }
    let marker = tokio::fs::read_to_string(version_marker(path)).await.ok()?;
    non_empty(&marker)
}

/// Version reported by `<binary> --version`
async fn binary_version(path: &Path, timeout: Duration) -> Option<String> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return None;
    }
    let mut command = Command::new(path);
    command.arg("--version");
    let program = path.display().to_string();
    match run_piped(command, &program, None, timeout).await {
        Ok(output) if output.status.success() => {
            non_empty(&String::from_utf8_lossy(&output.stdout))
        }
        Ok(output) => {
            tracing::debug!(program, status = ?output.status.code(), "version query failed");
            None
        }
        Err(error) => {
            tracing::debug!("{error}");
            None
        }
    }
}

fn non_empty(text: &str) -> Option<String> {
    match text.trim() {
        "" => None,
        trimmed => Some(trimmed.to_string()),
    }
}

/// Write `bytes` to a sibling temporary file and rename it over `path`
async fn write_atomically(path: &Path, bytes: &[u8], executable: bool) -> Result<(), SyncError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(SyncError::io(parent))?;
    }

    let mut temp_name = OsString::from(".");
    temp_name.push(path.file_name().unwrap_or_default());
    temp_name.push(".download");
    let temp = path.with_file_name(temp_name);

    let result = async {
        tokio::fs::write(&temp, bytes)
            .await
            .map_err(SyncError::io(&temp))?;
        if executable {
            make_executable(&temp).await?;
        }
        tokio::fs::rename(&temp, path)
            .await
            .map_err(SyncError::io(path))
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&temp).await;
    }
    result
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> Result<(), SyncError> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(SyncError::io(path))
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> Result<(), SyncError> {
    Ok(())
}
