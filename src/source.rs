//! Source trait and collection for managing music platform clients.
//!
//! This module defines the [`Source`] trait that every platform client
//! implements, and the [`Sources`] registry the orchestrator dispatches to.
//! Platform protocol details (authentication, pagination, rate limits) live
//! entirely inside each implementation.
//!
//! # Examples
//!
//! ```rust
//! use medley::prelude::*;
//! use medley::error::Result;
//!
//! # async fn example() -> Result<()> {
//! let mut sources = Sources::new();
//! // sources.add(NeteaseSource::new(cfg));
//! // sources.add(KugouSource::new(cfg));
//!
//! let report = sources.search("qing tian").limit(10).collect().await?;
//! println!("{} results", report.total_found());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use futures::{StreamExt, stream};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::{
    download::format_filename,
    error::{Error, Result},
    net::HttpClient,
    search::SearchBuilder,
    types::{Candidate, SearchParams},
    verify::LinkVerifier,
};

/// Thread degree a source uses when it does not override
/// [`Source::thread_degree`].
pub const DEFAULT_THREAD_DEGREE: usize = 3;

/// Trait that all music platform clients must implement.
///
/// # Required Methods
///
/// * [`id()`](Source::id) - Unique identifier for the source
/// * [`name()`](Source::name) - Human-readable name
/// * [`search()`](Source::search) - Search the platform
///
/// [`download()`](Source::download) has a default implementation that streams
/// the candidate's `download_url` to disk.
///
/// # Implementation Guidelines
///
/// - Run every link through the verifier you are given, for instance with
///   [`verify_candidates`]; drop candidates it rejects
/// - Set the `source` field of each candidate to [`id()`](Source::id)
/// - Return errors for transport failures; the orchestrator isolates them
///
/// # Examples
///
/// ```rust
/// use medley::prelude::*;
/// use medley::error::Result;
/// use medley::source::verify_candidates;
/// use async_trait::async_trait;
///
/// struct StaticSource;
///
/// #[async_trait]
/// impl Source for StaticSource {
///     fn id(&self) -> &str { "static" }
///     fn name(&self) -> &str { "Static Catalogue" }
///
///     async fn search(&self, params: SearchParams, verifier: &dyn LinkVerifier) -> Result<Vec<Candidate>> {
///         let found = vec![
///             Candidate::new("Artist", params.keyword.clone()).with_source(self.id()),
///         ];
///         Ok(verify_candidates(found, verifier, params.thread_degree).await)
///     }
/// }
/// ```
#[async_trait]
pub trait Source: Send + Sync {
    /// Returns the unique identifier for this source.
    ///
    /// Used as the key in [`Sources`], in progress events and in
    /// [`Candidate::source`].
    fn id(&self) -> &str;

    /// Returns the human-readable name of this source.
    fn name(&self) -> &str;

    /// Internal fan-out this source uses while searching.
    fn thread_degree(&self) -> usize {
        DEFAULT_THREAD_DEGREE
    }

    /// Searches the platform for `params.keyword`.
    ///
    /// At most `params.limit` candidates should be returned. The source may fan
    /// out to `params.thread_degree` concurrent requests internally.
    ///
    /// # Errors
    ///
    /// Any error is caught by the search coordinator and reported as a
    /// `SourceFailed` event for this source only.
    async fn search(
        &self,
        params: SearchParams,
        verifier: &dyn LinkVerifier,
    ) -> Result<Vec<Candidate>>;

    /// Downloads a single candidate into `destination`.
    ///
    /// The download coordinator assigns the save path before calling this and
    /// always passes `thread_degree = 1`. Success is judged by the coordinator
    /// afterwards by checking that the file exists.
    ///
    /// # Default Implementation
    ///
    /// Streams `candidate.download_url` to the assigned save path (or to
    /// `destination` joined with the formatted filename when none is set).
    async fn download(
        &self,
        candidate: &Candidate,
        destination: &Path,
        thread_degree: usize,
    ) -> Result<()> {
        let path = candidate
            .save_path()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| destination.join(format_filename(candidate)));

        if candidate.download_url.trim().is_empty() {
            return Err(Error::download(
                path.display().to_string(),
                "candidate has no download url",
            ));
        }

        let bytes = HttpClient::new(self.id())
            .download_to(&candidate.download_url, &path)
            .await?;

        debug!(
            source = self.id(),
            path = %path.display(),
            bytes,
            thread_degree,
            "candidate written"
        );
        Ok(())
    }
}

/// Runs each candidate's link through `verifier`, `concurrency` at a time.
///
/// Candidates whose link is unusable are dropped (a
/// [`VerificationFailed`](Error::VerificationFailed) is logged at debug level).
/// Survivors get their extension and size filled in from the verifier's
/// description when the platform left them empty. Input order is preserved.
pub async fn verify_candidates(
    candidates: Vec<Candidate>,
    verifier: &dyn LinkVerifier,
    concurrency: usize,
) -> Vec<Candidate> {
    stream::iter(candidates)
        .map(|mut candidate| async move {
            let report = verifier.verify_and_describe(&candidate.download_url).await;
            if !report.usable {
                let err = Error::verification(
                    &candidate.download_url,
                    report.reason.unwrap_or_else(|| "unusable link".to_string()),
                );
                debug!(source = %candidate.source, error = %err, "candidate dropped");
                return None;
            }

            if candidate.extension.is_none() {
                candidate.extension = Some(report.extension);
            }
            if candidate.size.is_none() {
                candidate.size = report.size.map(format_size);
            }
            Some(candidate)
        })
        .buffered(concurrency.max(1))
        .filter_map(|candidate| async move { candidate })
        .collect()
        .await
}

/// Formats a byte count as megabytes with two decimals, e.g. `"3.52MB"`.
pub fn format_size(bytes: u64) -> String {
    format!("{:.2}MB", bytes as f64 / 1024.0 / 1024.0)
}

/// Registry of source clients keyed by id.
///
/// # Examples
///
/// ```rust
/// use medley::prelude::*;
///
/// let sources = Sources::new();
/// assert!(sources.is_empty());
/// assert!(sources.select(&["netease"]).is_err());
/// ```
pub struct Sources {
    sources: Vec<Arc<dyn Source>>,
    by_id: HashMap<String, usize>,
}

impl Sources {
    /// Creates a new empty source collection.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    /// Starts a fluent search across all registered sources.
    pub fn search(&self, keyword: impl Into<String>) -> SearchBuilder<'_> {
        SearchBuilder::new(self, keyword)
    }

    /// Adds a source to the collection.
    ///
    /// A source registered under an id that already exists replaces the
    /// previous one.
    pub fn add(&mut self, source: impl Source + 'static) -> &mut Self {
        self.add_shared(Arc::new(source))
    }

    /// Adds an already shared source.
    pub fn add_shared(&mut self, source: Arc<dyn Source>) -> &mut Self {
        let id = source.id().to_string();
        match self.by_id.get(&id) {
            Some(&index) => self.sources[index] = source,
            None => {
                self.by_id.insert(id, self.sources.len());
                self.sources.push(source);
            }
        }
        self
    }

    /// Retrieves a source by its ID.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Source>> {
        self.by_id
            .get(id)
            .and_then(|&index| self.sources.get(index))
            .cloned()
    }

    /// Returns the IDs of all registered sources in registration order.
    pub fn list_ids(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.id()).collect()
    }

    /// Every registered source, in registration order.
    pub fn all(&self) -> Vec<Arc<dyn Source>> {
        self.sources.clone()
    }

    /// Resolves a selection of ids, keeping the order given.
    ///
    /// Repeated ids are collapsed.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when `ids` is empty or names an unknown source.
    pub fn select<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<Arc<dyn Source>>> {
        if ids.is_empty() {
            return Err(Error::config("no sources selected"));
        }

        let mut selected: Vec<Arc<dyn Source>> = Vec::with_capacity(ids.len());
        for id in ids {
            let id = id.as_ref();
            let source = self
                .get(id)
                .ok_or_else(|| Error::config(format!("unknown source '{}'", id)))?;
            if !selected.iter().any(|s| s.id() == id) {
                selected.push(source);
            }
        }
        Ok(selected)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Default for Sources {
    fn default() -> Self {
        Self::new()
    }
}
