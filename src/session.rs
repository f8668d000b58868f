//! End-to-end search and download flow for one user.
//!
//! A [`Session`] ties the pieces together: it owns the source registry, the
//! settings, a verification mode switch and the progress channel. The
//! presentation layer drives it in two steps, with a user decision in
//! between:
//!
//! 1. [`Session::search`] returns [`SearchResults`] with global indices,
//!    already filtered against the destination library.
//! 2. The user picks entries; [`SearchResults::select`] resolves a
//!    [`Selection`] into candidates.
//! 3. [`Session::download`] rescans the library, drops anything that appeared
//!    in the meantime (or was picked twice), then downloads the rest.
//!
//! Sessions share nothing with each other, so several may run concurrently.
//!
//! # Examples
//!
//! ```rust,no_run
//! use medley::prelude::*;
//! use medley::session::{Selection, Session};
//!
//! # async fn example(sources: Sources) -> medley::Result<()> {
//! let config = Config::interactive();
//! let destination = config.destination.clone();
//! let (session, mut events) = Session::new(sources, config);
//!
//! tokio::spawn(async move {
//!     while let Some(event) = events.recv().await {
//!         println!("{}", event);
//!     }
//! });
//!
//! let results = session.search("qing tian", &["netease", "kugou"], &destination).await?;
//! for entry in results.iter() {
//!     println!("[{}] {}", entry.index, entry.candidate.identity());
//! }
//!
//! let picked = results.select(&Selection::parse("0,2")?)?;
//! let summary = session.download(picked, &destination).await?;
//! println!("{}/{} downloaded", summary.succeeded, summary.total);
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

use crate::{
    config::{Config, validate_config},
    dedupe,
    download::{DownloadCoordinator, DownloadSummary},
    error::{Error, Result},
    library::LibraryIndex,
    progress::{self, ProgressEvent, ProgressReceiver, ProgressSender},
    search::{SearchCoordinator, SearchRequest},
    source::Sources,
    types::Candidate,
    verify::{VerifierSwitch, VerifyMode},
};

/// One user's view of the orchestrator.
pub struct Session {
    sources: Sources,
    config: Config,
    verifier: VerifierSwitch,
    progress: ProgressSender,
}

impl Session {
    /// Creates a session and the receiver for its progress events.
    ///
    /// The session starts in `config.verify_mode`.
    pub fn new(sources: Sources, config: Config) -> (Self, ProgressReceiver) {
        let verifier = VerifierSwitch::new(config.verify_mode);
        Self::with_verifier(sources, config, verifier)
    }

    /// Creates a session around a preconfigured verifier switch.
    pub fn with_verifier(
        sources: Sources,
        config: Config,
        verifier: VerifierSwitch,
    ) -> (Self, ProgressReceiver) {
        let (tx, rx) = progress::channel();
        let session = Self {
            sources,
            config,
            verifier,
            progress: tx,
        };
        (session, rx)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sources(&self) -> &Sources {
        &self.sources
    }

    pub fn verify_mode(&self) -> VerifyMode {
        self.verifier.mode()
    }

    /// Switches verification for every later operation of this session.
    ///
    /// Returns `false` when `mode` was already active.
    pub fn set_verify_mode(&self, mode: VerifyMode) -> bool {
        self.verifier.set_mode(mode)
    }

    /// Searches `keyword` on the sources named by `source_ids`.
    ///
    /// Results already present in `destination` are dropped per source
    /// before indices are assigned. Indices follow source order, then each
    /// source's own result order.
    ///
    /// # Errors
    ///
    /// * [`Error::Config`] - Empty keyword, no or unknown sources, invalid settings
    /// * [`Error::Io`] - `destination` exists but cannot be listed
    ///
    /// A source that fails is reported in [`SearchResults::failures`] instead.
    #[instrument(skip(self, source_ids, destination), fields(destination = %destination.display()))]
    pub async fn search<S: AsRef<str>>(
        &self,
        keyword: &str,
        source_ids: &[S],
        destination: &Path,
    ) -> Result<SearchResults> {
        let result = self.run_search(keyword, source_ids, destination).await;
        self.report_fatal(result)
    }

    async fn run_search<S: AsRef<str>>(
        &self,
        keyword: &str,
        source_ids: &[S],
        destination: &Path,
    ) -> Result<SearchResults> {
        validate_config(&self.config)?;
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(Error::config("search keyword cannot be empty"));
        }
        let selected = self.sources.select(source_ids)?;

        let library = LibraryIndex::scan_with(destination, &self.config.audio_extensions).await?;

        let thread_degrees = selected
            .iter()
            .map(|s| (s.id().to_string(), self.config.thread_degree_for(s.id())))
            .collect();
        let request = SearchRequest::new(keyword, selected, self.verifier.current())
            .with_limit(self.config.per_source_limit)
            .with_thread_degrees(thread_degrees);

        let report = SearchCoordinator::new(self.config.search_workers, self.progress.clone())
            .search_collect(request)
            .await?;

        let mut entries = Vec::with_capacity(report.total_found());
        let mut groups = Vec::with_capacity(report.buckets.len());
        let mut skipped = 0;
        for bucket in report.buckets {
            let filtered = dedupe::filter(bucket.candidates, &library);
            skipped += filtered.skipped;

            let start = entries.len();
            for candidate in filtered.kept {
                entries.push(IndexedCandidate {
                    index: entries.len(),
                    candidate,
                });
            }
            groups.push(SourceGroup {
                source: bucket.source,
                start,
                len: entries.len() - start,
            });
        }

        info!(kept = entries.len(), skipped, "search results ready");
        self.progress
            .send(ProgressEvent::DuplicatesSkipped { skipped });

        Ok(SearchResults {
            keyword: keyword.to_string(),
            entries,
            groups,
            failures: report.failures,
            skipped,
            elapsed: report.elapsed,
        })
    }

    /// Downloads `candidates` into `destination`.
    ///
    /// The library is always rescanned first. Candidates that are now present,
    /// or whose identity appears earlier in `candidates`, are skipped and
    /// counted in a `DuplicatesSkipped` event.
    ///
    /// # Errors
    ///
    /// * [`Error::Config`] - Invalid settings
    /// * [`Error::Io`] - `destination` cannot be listed or created
    ///
    /// Failures of individual downloads are part of the summary.
    #[instrument(skip(self, candidates, destination), fields(selected = candidates.len(), destination = %destination.display()))]
    pub async fn download(
        &self,
        candidates: Vec<Candidate>,
        destination: &Path,
    ) -> Result<DownloadSummary> {
        let result = self.run_download(candidates, destination).await;
        self.report_fatal(result)
    }

    async fn run_download(
        &self,
        candidates: Vec<Candidate>,
        destination: &Path,
    ) -> Result<DownloadSummary> {
        validate_config(&self.config)?;

        let library = LibraryIndex::scan_with(destination, &self.config.audio_extensions).await?;
        let filtered = dedupe::filter_selection(candidates, &library);
        info!(
            kept = filtered.kept.len(),
            skipped = filtered.skipped,
            "selection re-checked against library"
        );
        self.progress.send(ProgressEvent::DuplicatesSkipped {
            skipped: filtered.skipped,
        });

        DownloadCoordinator::new(&self.sources, self.progress.clone())
            .download_collect(filtered.kept, destination, self.config.download_concurrency)
            .await
    }

    fn report_fatal<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.progress.send(ProgressEvent::Fatal {
                error: e.to_string(),
            });
        }
        result
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("sources", &self.sources.list_ids())
            .field("config", &self.config)
            .field("verify_mode", &self.verifier.mode())
            .finish()
    }
}

/// A candidate with its position in the merged result list.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedCandidate {
    pub index: usize,
    pub candidate: Candidate,
}

#[derive(Debug, Clone)]
struct SourceGroup {
    source: String,
    start: usize,
    len: usize,
}

/// Merged, library-filtered results of [`Session::search`].
#[derive(Debug)]
pub struct SearchResults {
    pub keyword: String,
    entries: Vec<IndexedCandidate>,
    groups: Vec<SourceGroup>,
    /// Sources that failed, in dispatch order.
    pub failures: Vec<(String, Error)>,
    /// Candidates dropped because they already exist locally.
    pub skipped: usize,
    pub elapsed: Duration,
}

impl SearchResults {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&IndexedCandidate> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexedCandidate> {
        self.entries.iter()
    }

    /// Entries grouped by source, in source order.
    ///
    /// Sources that answered but had every result filtered out still appear,
    /// with an empty slice.
    pub fn by_source(&self) -> impl Iterator<Item = (&str, &[IndexedCandidate])> {
        self.groups.iter().map(|g| {
            (
                g.source.as_str(),
                &self.entries[g.start..g.start + g.len],
            )
        })
    }

    /// Resolves a user selection into candidates.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when an index is out of range.
    pub fn select(&self, selection: &Selection) -> Result<Vec<Candidate>> {
        match selection {
            Selection::All => Ok(self.entries.iter().map(|e| e.candidate.clone()).collect()),
            Selection::Indices(indices) => indices
                .iter()
                .map(|&i| {
                    self.entries
                        .get(i)
                        .map(|e| e.candidate.clone())
                        .ok_or_else(|| {
                            Error::config(format!(
                                "index {} is out of range, {} results available",
                                i,
                                self.entries.len()
                            ))
                        })
                })
                .collect(),
        }
    }

    pub fn into_candidates(self) -> Vec<Candidate> {
        self.entries.into_iter().map(|e| e.candidate).collect()
    }
}

/// Which results the user picked.
///
/// ```rust
/// use medley::session::Selection;
///
/// assert_eq!(Selection::parse("ALL").unwrap(), Selection::All);
/// assert_eq!(Selection::parse("0, 2 3,2").unwrap(), Selection::Indices(vec![0, 2, 3]));
/// assert!(Selection::parse("1,two").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    /// Distinct indices in the order given.
    Indices(Vec<usize>),
}

impl Selection {
    /// Parses `all` or a list of indices separated by commas or spaces.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for empty or non-numeric input.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.eq_ignore_ascii_case("all") {
            return Ok(Selection::All);
        }

        let mut seen = HashSet::new();
        let mut indices = Vec::new();
        for token in input
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            let index: usize = token
                .parse()
                .map_err(|_| Error::config(format!("'{}' is not a valid index", token)))?;
            if seen.insert(index) {
                indices.push(index);
            }
        }

        if indices.is_empty() {
            return Err(Error::config("nothing selected"));
        }
        Ok(Selection::Indices(indices))
    }
}

impl FromStr for Selection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Selection::parse(s)
    }
}
