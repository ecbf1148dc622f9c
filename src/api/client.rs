use std::future::Future;
use std::time::Duration;

use reqwest::Client as HttpClient;
use thiserror::Error;
use url::Url;

use crate::logging::Level;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Where and how to reach the mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Endpoint {
    pub url: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("HTTP {status} {reason}")]
    Http { status: u16, reason: String },

    #[error("{0}")]
    Url(String),

    #[error("{0}")]
    Other(String),
}

impl FetchError {
    pub fn level(&self) -> Level {
        match self {
            FetchError::Http { .. } => Level::HttpError,
            FetchError::Url(_) => Level::UrlError,
            FetchError::Other(_) => Level::Error,
        }
    }

    /// Short text for the status line.
    pub fn status_line(&self) -> String {
        match self {
            FetchError::Http { status, .. } => {
                format!("Unable to connect to remote API, received HTTP{status}!")
            }
            FetchError::Url(reason) => format!("Unable to connect to remote API ({reason})!"),
            FetchError::Other(_) => "Unable to connect to remote API, please check log!".into(),
        }
    }

    /// Full text for the log.
    pub fn log_message(&self) -> String {
        match self {
            FetchError::Http { reason, .. } => format!("{}, \"{reason}\"", self.status_line()),
            FetchError::Url(_) => self.status_line(),
            FetchError::Other(err) => format!("Unable to connect to remote API:\n{err}"),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return FetchError::Http {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            };
        }
        if e.is_connect() || e.is_timeout() || e.is_builder() || e.is_request() {
            FetchError::Url(e.to_string())
        } else {
            FetchError::Other(e.to_string())
        }
    }
}

/// One authenticated round trip returning the raw feed lines.
pub trait Fetch: Send + Sync {
    fn fetch(
        &self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = Result<Vec<String>, FetchError>> + Send;
}

pub struct ApiClient {
    pub http: HttpClient,
}

impl ApiClient {
    pub fn new() -> Self {
        let http = HttpClient::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| HttpClient::new());
        Self { http }
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetch for ApiClient {
    async fn fetch(&self, endpoint: &Endpoint) -> Result<Vec<String>, FetchError> {
        let url = Url::parse(endpoint.url.trim()).map_err(|e| FetchError::Url(e.to_string()))?;
        let resp = self
            .http
            .get(url)
            .basic_auth(&endpoint.username, Some(&endpoint.password))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }
        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::Other(e.to_string()))?;
        Ok(body.lines().map(str::to_string).collect())
    }
}
