//! In-memory artifact fetcher and fake resolver executables

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bibdesk_bookmark::{ArtifactFetcher, HttpError};

/// Serves fixed artifacts and records every requested URL
#[derive(Default)]
pub struct CountingFetcher {
    artifacts: HashMap<String, Vec<u8>>,
    requests: Mutex<Vec<String>>,
}

impl CountingFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_artifact(mut self, url: &str, bytes: &[u8]) -> Self {
        self.artifacts.insert(url.to_string(), bytes.to_vec());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl ArtifactFetcher for CountingFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, HttpError> {
        self.requests.lock().unwrap().push(url.to_string());
        tokio::task::yield_now().await;
        self.artifacts
            .get(url)
            .cloned()
            .ok_or_else(|| HttpError::Status {
                status: 404,
                url: url.to_string(),
            })
    }
}

/// Write a shell script with mode 0755
#[cfg(unix)]
pub fn write_executable(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
