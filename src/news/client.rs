use futures::StreamExt;
use reqwest::header::HeaderValue;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use std::future::Future;
use thiserror::Error;

use super::endpoint::Endpoint;
use super::types::ArticlesResponse;

const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024; // 5MB

const API_KEY_HEADER: &str = "X-Api-Key";

/// Errors produced by the news API transport.
///
/// Status-derived variants are returned without reading the body.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP 400
    #[error("Invalid request. Please check your search terms.")]
    BadRequest,
    /// HTTP 401
    #[error("Invalid API key. Please check your configuration.")]
    Unauthorized,
    /// HTTP 429
    #[error("Rate limit hit. Please retry later.")]
    RateLimited,
    /// HTTP 5xx
    #[error("Server error (status {0}). Please try again later.")]
    ServerError(u16),
    /// Any other non-200 status
    #[error("Unexpected HTTP status {0}")]
    UnexpectedStatus(u16),
    /// Body was not the expected JSON shape
    #[error("Failed to process response from server: {0}")]
    Decoding(String),
    /// Connection-level failure (DNS, TLS, reset)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Insecure API host: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
    #[error("Invalid API host: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),
    #[error("API key contains characters not allowed in an HTTP header")]
    InvalidApiKey,
    /// No client was configured, so nothing can be fetched
    #[error(
        "No API key configured. Set {} or add api_key to the config file.",
        crate::config::API_KEY_ENV
    )]
    MissingApiKey,
}

/// Map a response status to the transport outcome. Only 200 proceeds.
pub fn classify_status(status: StatusCode) -> Result<(), FetchError> {
    match status.as_u16() {
        200 => Ok(()),
        400 => Err(FetchError::BadRequest),
        401 => Err(FetchError::Unauthorized),
        429 => Err(FetchError::RateLimited),
        code if code >= 500 => Err(FetchError::ServerError(code)),
        code => Err(FetchError::UnexpectedStatus(code)),
    }
}

/// Anything that can turn an [`Endpoint`] into a decoded batch of articles.
///
/// Implementations must not retry; the caller owns retry policy.
pub trait ArticleSource: Send + Sync {
    fn fetch(
        &self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = Result<ArticlesResponse, FetchError>> + Send;
}

/// HTTP client for NewsAPI-compatible services.
///
/// Timeouts are the injected `reqwest::Client`'s concern.
#[derive(Clone)]
pub struct NewsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: HeaderValue,
}

impl std::fmt::Debug for NewsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewsClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl NewsClient {
    /// Build a client for `base_url` (e.g. `https://newsapi.org`).
    ///
    /// # Errors
    ///
    /// - [`FetchError::InvalidBaseUrl`] if `base_url` does not parse
    /// - [`FetchError::InsecureBaseUrl`] for plain HTTP to anything but localhost
    /// - [`FetchError::InvalidApiKey`] if the key cannot be sent as a header
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: &SecretString,
    ) -> Result<Self, FetchError> {
        let parsed = url::Url::parse(base_url)?;

        // The key travels in a header, never send it in clear text
        match parsed.scheme() {
            "https" => {}
            "http" if matches!(parsed.host_str(), Some("localhost") | Some("127.0.0.1")) => {
                tracing::warn!(base_url = %base_url, "Using non-HTTPS API host (localhost only)");
            }
            _ => {
                tracing::error!(base_url = %base_url, "Rejecting non-HTTPS API host");
                return Err(FetchError::InsecureBaseUrl);
            }
        }

        let mut api_key = HeaderValue::from_str(api_key.expose_secret())
            .map_err(|_| FetchError::InvalidApiKey)?;
        api_key.set_sensitive(true);

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue one GET for `endpoint` and decode the article batch.
    pub async fn get(&self, endpoint: &Endpoint) -> Result<ArticlesResponse, FetchError> {
        let url = endpoint.url(&self.base_url)?;
        tracing::debug!(path = endpoint.path, "Requesting articles");

        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, self.api_key.clone())
            .send()
            .await?;

        let status = response.status();
        if let Err(e) = classify_status(status) {
            tracing::warn!(
                path = endpoint.path,
                status = status.as_u16(),
                "News API returned an error status"
            );
            return Err(e);
        }

        let bytes = read_limited_bytes(response, MAX_RESPONSE_SIZE).await?;
        let decoded: ArticlesResponse = serde_json::from_slice(&bytes)
            .map_err(|e| FetchError::Decoding(e.to_string()))?;

        tracing::debug!(
            path = endpoint.path,
            articles = decoded.articles.len(),
            total = decoded.total_results,
            "Decoded article batch"
        );
        Ok(decoded)
    }
}

impl ArticleSource for NewsClient {
    async fn fetch(&self, endpoint: &Endpoint) -> Result<ArticlesResponse, FetchError> {
        self.get(endpoint).await
    }
}

/// An absent source fails every fetch with [`FetchError::MissingApiKey`].
///
/// Lets cache-only callers run without an API key.
impl<S: ArticleSource> ArticleSource for Option<S> {
    async fn fetch(&self, endpoint: &Endpoint) -> Result<ArticlesResponse, FetchError> {
        match self {
            Some(source) => source.fetch(endpoint).await,
            None => Err(FetchError::MissingApiKey),
        }
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
