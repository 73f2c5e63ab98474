//! Resolver artifact downloads

use std::time::Duration;

use reqwest::Client;
use thiserror::Error;

pub const DEFAULT_RELEASE_BASE_URL: &str =
    "https://github.com/alberti42/obsidian-bibtex-integration/releases/download";

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Request failed: {message}")]
    RequestFailed { message: String },
    #[error("Invalid URL: {url}")]
    InvalidUrl { url: String },
    #[error("Timeout")]
    Timeout,
    #[error("Unexpected status {status} for {url}")]
    Status { status: u16, url: String },
    #[error("Failed to read response body: {message}")]
    Body { message: String },
}

/// Source of resolver artifacts
///
/// Production code downloads from the release page; tests substitute an
/// in-memory fetcher.
#[allow(async_fn_in_trait)]
pub trait ArtifactFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, HttpError>;
}

/// Download URL of `artifact` for release `version`
pub fn release_url(base: &str, version: &str, artifact: &str) -> String {
    format!("{}/{}/{}", base.trim_end_matches('/'), version, artifact)
}

pub struct HttpClient {
    client: Client,
    user_agent: String,
}

impl HttpClient {
    pub fn new(user_agent: &str) -> Result<Self, HttpError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| HttpError::RequestFailed {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
        })
    }

    pub fn with_default_agent() -> Result<Self, HttpError> {
        Self::new(concat!("bibdesk-integration/", env!("CARGO_PKG_VERSION")))
    }
}

impl ArtifactFetcher for HttpClient {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, HttpError> {
        let url = reqwest::Url::parse(url).map_err(|_| HttpError::InvalidUrl {
            url: url.to_string(),
        })?;

        let response = self
            .client
            .get(url.clone())
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    HttpError::Timeout
                } else {
                    HttpError::RequestFailed {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.bytes().await.map_err(|e| HttpError::Body {
            message: e.to_string(),
        })?;
        Ok(body.to_vec())
    }
}
