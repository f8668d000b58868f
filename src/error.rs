//! Error types and result handling for Medley operations.
//!
//! All operations return a [`Result<T>`] which is a type alias for
//! `std::result::Result<T, Error>`.
//!
//! # Error Categories
//!
//! Medley errors fall into two groups:
//!
//! - **Isolated**: [`Error::SourceUnavailable`], [`Error::VerificationFailed`] and
//!   [`Error::DownloadFailed`] describe a single source or candidate. The coordinators
//!   catch them at the task boundary and turn them into structured outcomes, so they
//!   never end a session.
//! - **Fatal**: [`Error::Config`] is raised before any work is dispatched. Plumbing
//!   errors (IO, network, TOML) are fatal only when they escape a task boundary,
//!   for example when the destination directory cannot be created.
//!
//! # Examples
//!
//! ```rust
//! use medley::error::{Error, Result};
//!
//! fn check_keyword(keyword: &str) -> Result<()> {
//!     if keyword.trim().is_empty() {
//!         return Err(Error::config("search keyword cannot be empty"));
//!     }
//!     Ok(())
//! }
//!
//! match check_keyword("   ") {
//!     Err(Error::Config(msg)) => println!("rejected: {}", msg),
//!     other => panic!("unexpected: {:?}", other),
//! }
//! ```

use std::any::Any;
use thiserror::Error;

/// Type alias for Results with Medley errors.
///
/// # Examples
///
/// ```rust
/// use medley::{Result, Error};
///
/// fn example_operation() -> Result<String> {
///     Ok("Success".to_string())
/// }
///
/// fn example_with_error() -> Result<()> {
///     Err(Error::config("no sources selected"))
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all Medley operations.
///
/// # Variants
///
/// * [`SourceUnavailable`](Error::SourceUnavailable) - A source client failed during search
/// * [`VerificationFailed`](Error::VerificationFailed) - A link check came back negative
/// * [`DownloadFailed`](Error::DownloadFailed) - A single download did not produce a file
/// * [`Config`](Error::Config) - Invalid input or settings, raised before dispatch
/// * [`Network`](Error::Network) - HTTP client and connection errors
/// * [`Io`](Error::Io) - File system errors
/// * [`TomlParse`](Error::TomlParse) - Configuration file syntax errors
/// * [`Other`](Error::Other) - Generic error messages
#[derive(Error, Debug)]
pub enum Error {
    /// A source client raised an error while searching.
    ///
    /// Reported through the progress channel as `SourceFailed` and never
    /// affects the other sources of the same search.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use medley::Error;
    ///
    /// let error = Error::source_unavailable("netease", "connection reset by peer");
    /// assert_eq!(error.to_string(), "Source unavailable [netease]: connection reset by peer");
    /// ```
    #[error("Source unavailable [{src}]: {message}")]
    SourceUnavailable { src: String, message: String },

    /// A thorough link check reported the URL as unusable.
    ///
    /// Source clients drop such candidates from their results instead of
    /// propagating the error.
    #[error("Verification failed for {url}: {reason}")]
    VerificationFailed { url: String, reason: String },

    /// A download failed or finished without leaving a file behind.
    #[error("Download failed for {file}: {reason}")]
    DownloadFailed { file: String, reason: String },

    /// Invalid configuration or user input.
    ///
    /// Empty keywords, empty source selections, unknown source ids and
    /// malformed numeric input all end up here. The operation is not started.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use medley::Error;
    ///
    /// let error = Error::config("download_concurrency must be at least 1");
    /// assert!(error.is_config());
    /// ```
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network-related errors from HTTP operations.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// File system and IO operation errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("TOML error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Generic error messages.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Creates a source failure with source ID and message.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use medley::Error;
    ///
    /// let error = Error::source_unavailable("kugou", "HTTP 503");
    /// ```
    pub fn source_unavailable(src: impl Into<String>, msg: impl Into<String>) -> Self {
        Error::SourceUnavailable {
            src: src.into(),
            message: msg.into(),
        }
    }

    /// Creates a verification failure for the given URL.
    pub fn verification(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::VerificationFailed {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a download failure for the given file name.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use medley::Error;
    ///
    /// let error = Error::download("A - B (C).mp3", "output file missing after download");
    /// ```
    pub fn download(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::DownloadFailed {
            file: file.into(),
            reason: reason.into(),
        }
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Returns `true` for errors raised before any work was dispatched.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

/// Renders a caught panic payload as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::download("x.mp3", "HTTP 404");
        assert_eq!(err.to_string(), "Download failed for x.mp3: HTTP 404");

        let err = Error::verification("https://a/b.mp3", "content type text/html");
        assert!(err.to_string().contains("text/html"));
    }

    #[test]
    fn test_is_config() {
        assert!(Error::config("bad").is_config());
        assert!(!Error::Other("bad".into()).is_config());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "panicked: boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "panicked: bang");

        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "panicked");
    }
}
