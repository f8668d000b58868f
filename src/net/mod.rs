//! Network utilities shared by the link verifiers and source clients.
//!
//! This module provides the networking infrastructure for Medley:
//!
//! - **HTTP Client**: A global, configured HTTP client with connection pooling
//! - **Probing**: Lightweight existence/metadata requests for the thorough verifier
//! - **Streaming downloads**: Writes a response body to disk chunk by chunk
//! - **Metadata parsing**: JSON path helpers in [`json`]
//!
//! # Examples
//!
//! ```rust,no_run
//! use medley::net::HttpClient;
//! use std::path::Path;
//!
//! # async fn example() -> medley::Result<()> {
//! let client = HttpClient::new("netease");
//!
//! let head = client.inspect("https://example.com/song.mp3").await?;
//! println!("{:?} {:?}", head.content_type, head.content_length);
//!
//! let bytes = client
//!     .download_to("https://example.com/song.mp3", Path::new("./song.mp3"))
//!     .await?;
//! println!("wrote {} bytes", bytes);
//! # Ok(())
//! # }
//! ```

use futures::StreamExt;
use once_cell::sync::Lazy;
use reqwest::{
    Client, Response, StatusCode,
    header::{self, HeaderMap},
};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

pub mod json;

/// Global HTTP client instance.
///
/// This client is configured with:
/// - 30-second timeout
/// - Connection pooling (10 idle connections per host)
/// - Compression support (gzip, brotli)
/// - Custom User-Agent header
///
/// Building a client only fails when the TLS backend cannot be initialised,
/// in which case falling back to the default client keeps the crate usable.
static CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(concat!("Medley/", env!("CARGO_PKG_VERSION")))
        .pool_max_idle_per_host(10)
        .gzip(true)
        .brotli(true)
        .build()
        .unwrap_or_default()
});

/// Response metadata gathered by [`HttpClient::inspect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMetadata {
    /// Final URL after redirects.
    pub final_url: String,
    /// HTTP status of the inspection request.
    pub status: u16,
    /// Lower-cased media type without parameters, if the server sent one.
    pub content_type: Option<String>,
    /// Declared body length, if known.
    pub content_length: Option<u64>,
}

/// HTTP client wrapper tagged with the source that uses it.
///
/// Each source client (and the thorough verifier) holds one of these. The
/// underlying connection pool is shared process-wide.
///
/// # Examples
///
/// ```rust
/// use medley::net::HttpClient;
///
/// let client = HttpClient::new("kugou")
///     .with_header("Referer", "https://www.kugou.com/");
/// assert_eq!(client.source_id(), "kugou");
/// ```
#[derive(Clone, Debug)]
pub struct HttpClient {
    source_id: String,
    headers: HeaderMap,
}

impl HttpClient {
    /// Creates a new HTTP client for the specified source.
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            headers: HeaderMap::new(),
        }
    }

    /// Returns the source this client belongs to.
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Adds a custom header to all requests made by this client.
    ///
    /// Invalid header names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.parse::<header::HeaderName>(),
            value.parse::<header::HeaderValue>(),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Issues a lightweight existence/metadata request against `url`.
    ///
    /// A `HEAD` request is tried first. Servers that reject `HEAD`
    /// (405/403/501) get a ranged `GET bytes=0-0` instead; in that case the
    /// length is read from `Content-Range` when present.
    ///
    /// # Errors
    ///
    /// * [`Error::Network`](crate::Error::Network) - If the server is unreachable
    /// * [`Error::SourceUnavailable`](crate::Error::SourceUnavailable) - For non-success statuses
    pub async fn inspect(&self, url: &str) -> crate::Result<LinkMetadata> {
        let response = CLIENT
            .head(url)
            .headers(self.headers.clone())
            .send()
            .await?;

        let response = if matches!(
            response.status(),
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::FORBIDDEN | StatusCode::NOT_IMPLEMENTED
        ) {
            debug!(url, status = %response.status(), "HEAD rejected, retrying with ranged GET");
            CLIENT
                .get(url)
                .headers(self.headers.clone())
                .header(header::RANGE, "bytes=0-0")
                .send()
                .await?
        } else {
            response
        };

        if !response.status().is_success() {
            return Err(crate::Error::source_unavailable(
                &self.source_id,
                format!("HTTP {} for {}", response.status(), url),
            ));
        }

        Ok(describe(&response))
    }

    /// Streams the body of `url` into `output_path`, returning the bytes written.
    ///
    /// Parent directories are created as needed. A partially written file is
    /// left in place when the transfer fails.
    pub async fn download_to(&self, url: &str, output_path: &Path) -> crate::Result<u64> {
        let response = CLIENT.get(url).headers(self.headers.clone()).send().await?;

        if !response.status().is_success() {
            return Err(crate::Error::download(
                output_path.display().to_string(),
                format!("HTTP {}", response.status()),
            ));
        }

        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(output_path).await?;
        let mut written = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }
}

fn describe(response: &Response) -> LinkMetadata {
    let headers = response.headers();

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty());

    // "bytes 0-0/12345" carries the full length of a ranged response.
    let content_length = headers
        .get(header::CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.rsplit('/').next())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .or_else(|| {
            headers
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
        });

    LinkMetadata {
        final_url: response.url().to_string(),
        status: response.status().as_u16(),
        content_type,
        content_length,
    }
}
