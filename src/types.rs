//! Core data types for candidates, identities and search parameters.
//!
//! This module defines the fundamental data structures used throughout Medley:
//!
//! - [`Candidate`] - A discovered, not-yet-downloaded song with its metadata
//! - [`Identity`] - The (singer, title) pair used for deduplication
//! - [`SearchParams`] - Parameters handed to each source client's search
//!
//! # Examples
//!
//! ```rust
//! use medley::types::*;
//!
//! let candidate = CandidateBuilder::default()
//!     .singer("Jay Chou")
//!     .title("Qing Tian")
//!     .album(Some("Ye Hui Mei".to_string()))
//!     .quality(Some("320k".to_string()))
//!     .download_url("https://cdn.example.com/qingtian.mp3")
//!     .source("netease")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(candidate.identity().normalized(), Identity::new("jay chou", "qing tian"));
//! assert!(candidate.save_path().is_none());
//! ```

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::download::replace_invalid_chars;
use crate::net::json;

/// Singer label used when a source returns none.
pub const UNKNOWN_SINGER: &str = "Unknown Artist";
/// Title label used when a source returns none.
pub const UNKNOWN_TITLE: &str = "Unknown Title";
/// Album label used when a source returns none.
pub const UNKNOWN_ALBUM: &str = "Unknown Album";
/// Extension assumed when neither the source nor the URL provides one.
pub const DEFAULT_EXTENSION: &str = "mp3";

/// Raw metadata path some platforms use for the quality label.
const RAW_QUALITY_PATH: &str = "download.data.quality";
/// Raw metadata path some platforms use for the size label.
const RAW_SIZE_PATH: &str = "download.data.size";

/// The (singer, title) pair that identifies a song for deduplication.
///
/// Two forms are used: [`normalized`](Identity::normalized) (trimmed and
/// case-folded) and [`trimmed`](Identity::trimmed) (whitespace only). Library
/// lookups try both so legacy entries that were never lower-cased still match.
///
/// # Examples
///
/// ```rust
/// use medley::types::Identity;
///
/// let id = Identity::new("  Eason Chan ", "Ten Years ");
/// assert_eq!(id.trimmed(), Identity::new("Eason Chan", "Ten Years"));
/// assert_eq!(id.normalized(), Identity::new("eason chan", "ten years"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub singer: String,
    pub title: String,
}

impl Identity {
    pub fn new(singer: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            singer: singer.into(),
            title: title.into(),
        }
    }

    /// Trimmed and case-folded form.
    pub fn normalized(&self) -> Self {
        Self {
            singer: self.singer.trim().to_lowercase(),
            title: self.title.trim().to_lowercase(),
        }
    }

    /// Trimmed form with the original casing.
    pub fn trimmed(&self) -> Self {
        Self {
            singer: self.singer.trim().to_string(),
            title: self.title.trim().to_string(),
        }
    }

    /// Normalized form of the identity as it reads back from a generated
    /// filename, i.e. with characters that are invalid in file names replaced.
    ///
    /// ```rust
    /// use medley::types::Identity;
    ///
    /// let id = Identity::new("AC/DC", "Who Made Who?");
    /// assert_eq!(id.on_disk(), Identity::new("ac_dc", "who made who_"));
    /// ```
    pub fn on_disk(&self) -> Self {
        Self {
            singer: replace_invalid_chars(&self.singer).trim().to_lowercase(),
            title: replace_invalid_chars(&self.title).trim().to_lowercase(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.singer, self.title)
    }
}

/// A song discovered by a source client.
///
/// Candidates are created by [`Source::search`](crate::source::Source::search)
/// and are immutable afterwards, with one exception: the download task that
/// owns a candidate assigns its save path exactly once.
///
/// # Fields
///
/// * `singer` / `title` - Identity of the song (see [`Candidate::identity`])
/// * `album` - Album name, if the platform reports one
/// * `duration` - Display duration such as `"04:29"`
/// * `extension` - File extension without the dot
/// * `quality` - Quality label such as `"320k"` or `"flac"`
/// * `size` - Size label as reported by the platform
/// * `download_url` - Direct link to the audio file
/// * `raw` - Untouched platform payload
/// * `source` - Id of the source client that produced the candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(setter(into), default)]
pub struct Candidate {
    pub singer: String,
    pub title: String,
    pub album: Option<String>,
    pub duration: Option<String>,
    pub extension: Option<String>,
    pub quality: Option<String>,
    pub size: Option<String>,
    pub download_url: String,
    #[serde(default)]
    pub raw: serde_json::Value,
    pub source: String,
    #[builder(setter(skip))]
    #[serde(default)]
    save_path: Option<PathBuf>,
}

impl Default for Candidate {
    fn default() -> Self {
        Self {
            singer: String::new(),
            title: String::new(),
            album: None,
            duration: None,
            extension: None,
            quality: None,
            size: None,
            download_url: String::new(),
            raw: serde_json::Value::Null,
            source: String::new(),
            save_path: None,
        }
    }
}

impl Candidate {
    /// Creates a candidate with only its identity filled in.
    ///
    /// Source clients usually go through [`CandidateBuilder`] instead.
    pub fn new(singer: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            singer: singer.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    /// Stamps the id of the source that produced this candidate.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Singer with the unknown-artist fallback applied.
    pub fn singer_label(&self) -> &str {
        non_empty(&self.singer).unwrap_or(UNKNOWN_SINGER)
    }

    /// Title with the unknown-title fallback applied.
    pub fn title_label(&self) -> &str {
        non_empty(&self.title).unwrap_or(UNKNOWN_TITLE)
    }

    pub fn album_label(&self) -> &str {
        self.album
            .as_deref()
            .and_then(non_empty)
            .unwrap_or(UNKNOWN_ALBUM)
    }

    /// Extension without a leading dot, defaulting to `mp3`.
    pub fn extension_label(&self) -> &str {
        self.extension
            .as_deref()
            .map(|e| e.trim().trim_start_matches('.'))
            .and_then(non_empty)
            .unwrap_or(DEFAULT_EXTENSION)
    }

    /// Quality label from the typed field, else from the raw platform payload.
    pub fn quality_label(&self) -> Option<String> {
        self.quality
            .as_deref()
            .and_then(non_empty)
            .map(str::to_string)
            .or_else(|| json::extract_label(&self.raw, RAW_QUALITY_PATH))
    }

    /// Size label from the raw platform payload, else from the typed field.
    pub fn size_label(&self) -> Option<String> {
        json::extract_label(&self.raw, RAW_SIZE_PATH).or_else(|| {
            self.size
                .as_deref()
                .and_then(non_empty)
                .map(str::to_string)
        })
    }

    /// Identity built from the labelled singer and title.
    ///
    /// Missing values use the same fallbacks as the generated filename, so a
    /// song downloaded without a singer is recognised on the next scan.
    pub fn identity(&self) -> Identity {
        Identity::new(self.singer_label(), self.title_label())
    }

    /// Path the file was (or is being) saved to.
    pub fn save_path(&self) -> Option<&Path> {
        self.save_path.as_deref()
    }

    /// Records where the download task writes this candidate.
    ///
    /// Only the first assignment sticks; it returns `false` when a path was
    /// already set.
    pub(crate) fn assign_save_path(&mut self, path: PathBuf) -> bool {
        if self.save_path.is_some() {
            return false;
        }
        self.save_path = Some(path);
        true
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}

/// Parameters passed to each source client's search.
///
/// # Builder Usage
///
/// ```rust
/// use medley::types::SearchParamsBuilder;
///
/// let params = SearchParamsBuilder::default()
///     .keyword("qing tian")
///     .limit(10usize)
///     .build()
///     .unwrap();
///
/// assert_eq!(params.keyword, "qing tian");
/// assert_eq!(params.limit, 10);
/// assert_eq!(params.thread_degree, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(setter(into))]
pub struct SearchParams {
    pub keyword: String,
    /// Maximum number of results the source should return.
    #[builder(default = "5")]
    pub limit: usize,
    /// Internal fan-out the source may use for its own requests.
    #[builder(default = "3")]
    pub thread_degree: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            keyword: String::new(),
            limit: 5,
            thread_degree: 3,
        }
    }
}

impl From<&str> for SearchParams {
    /// Creates search parameters from a keyword with default limits.
    ///
    /// ```rust
    /// use medley::types::SearchParams;
    ///
    /// let params: SearchParams = "ten years".into();
    /// assert_eq!(params.keyword, "ten years");
    /// assert_eq!(params.limit, 5);
    /// ```
    fn from(keyword: &str) -> Self {
        SearchParams {
            keyword: keyword.to_string(),
            ..Default::default()
        }
    }
}

impl From<String> for SearchParams {
    fn from(keyword: String) -> Self {
        SearchParams {
            keyword,
            ..Default::default()
        }
    }
}
