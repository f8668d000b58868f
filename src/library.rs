//! Index of songs that already exist in a local directory.
//!
//! Downloaded files are named `singer - title (album) [quality].ext`, so the
//! identity of every song on disk can be recovered from its filename alone.
//! [`LibraryIndex::scan`] lists a directory once and keeps the normalized
//! (singer, title) pairs. The index is read-only afterwards; call `scan` again
//! whenever freshness matters, nothing watches the filesystem.
//!
//! # Examples
//!
//! ```rust
//! use medley::library::{parse_filename, LibraryIndex};
//! use medley::types::Identity;
//!
//! assert_eq!(
//!     parse_filename("Jay Chou - Qing Tian (Ye Hui Mei) [320k].mp3"),
//!     Some(Identity::new("Jay Chou", "Qing Tian")),
//! );
//!
//! let index = LibraryIndex::from_identities([Identity::new("jay chou", "qing tian")]);
//! assert!(index.contains(&Identity::new("jay chou", "qing tian")));
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::Identity;

/// Audio extensions considered when scanning, lower-case and without the dot.
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "m4a", "aac", "ogg", "wma", "ape"];

/// `singer - title` followed by ` (album)`, ` [quality]` or the end of the stem.
static FILENAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+?)\s+-\s+(.+?)(?:\s*\(|\s*\[|$)").expect("filename pattern is valid")
});

/// Set of identities already present in the library.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryIndex {
    entries: HashSet<Identity>,
}

impl LibraryIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from identities exactly as given.
    ///
    /// Nothing is normalized here, which lets callers reproduce libraries
    /// whose entries were recorded with their original casing.
    pub fn from_identities(identities: impl IntoIterator<Item = Identity>) -> Self {
        Self {
            entries: identities.into_iter().collect(),
        }
    }

    /// Scans `directory` with the default audio extensions.
    ///
    /// A missing directory yields an empty index.
    pub async fn scan(directory: &Path) -> Result<Self> {
        Self::scan_with(directory, AUDIO_EXTENSIONS).await
    }

    /// Scans `directory`, considering only files whose extension is in `extensions`.
    ///
    /// Files that do not follow the `singer - title` naming scheme are ignored.
    /// Identities are stored normalized.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) when the directory exists but cannot be read.
    pub async fn scan_with<S: AsRef<str>>(directory: &Path, extensions: &[S]) -> Result<Self> {
        let mut index = Self::new();

        if !fs::try_exists(directory).await.unwrap_or(false) {
            debug!(dir = %directory.display(), "library directory missing, index is empty");
            return Ok(index);
        }

        let mut entries = fs::read_dir(directory).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            let ext = ext.to_ascii_lowercase();
            if !extensions.iter().any(|e| e.as_ref().eq_ignore_ascii_case(&ext)) {
                continue;
            }

            match entry.file_type().await {
                Ok(ft) if ft.is_dir() => continue,
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            }

            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(identity) = parse_filename(name) {
                index.entries.insert(identity.normalized());
            }
        }

        debug!(dir = %directory.display(), songs = index.len(), "library scanned");
        Ok(index)
    }

    /// Exact membership test, no normalization applied.
    pub fn contains(&self, identity: &Identity) -> bool {
        self.entries.contains(identity)
    }

    /// Returns `true` when the normalized, the trimmed or the
    /// [on-disk](Identity::on_disk) form is present.
    ///
    /// The on-disk form lets a song whose name holds characters such as `/` or
    /// `?` match the file it was saved as.
    pub fn matches(&self, identity: &Identity) -> bool {
        self.contains(&identity.normalized())
            || self.contains(&identity.trimmed())
            || self.contains(&identity.on_disk())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.entries.iter()
    }
}

/// Extracts the (singer, title) pair from a library filename.
///
/// The extension is dropped first; the remaining stem must look like
/// `singer - title`, optionally followed by ` (album)` and/or ` [quality]`.
/// Both parts are trimmed but keep their casing.
///
/// ```rust
/// use medley::library::parse_filename;
/// use medley::types::Identity;
///
/// assert_eq!(parse_filename("A - B.flac"), Some(Identity::new("A", "B")));
/// assert_eq!(parse_filename("A - B [flac].flac"), Some(Identity::new("A", "B")));
/// assert_eq!(parse_filename("no separator.mp3"), None);
/// ```
pub fn parse_filename(filename: &str) -> Option<Identity> {
    let stem = match filename.rfind('.') {
        Some(0) | None => filename,
        Some(dot) => &filename[..dot],
    };
    if stem.is_empty() {
        return None;
    }

    let captures = FILENAME_PATTERN.captures(stem)?;
    let singer = captures.get(1)?.as_str().trim();
    let title = captures.get(2)?.as_str().trim();
    if singer.is_empty() || title.is_empty() {
        return None;
    }

    Some(Identity::new(singer, title))
}
