//! Concurrent search across source clients and the fluent search builder.
//!
//! [`SearchCoordinator`] fans one keyword out to every selected source with a
//! bounded worker pool. Each source's answer (or error) comes back as a
//! [`SourceOutcome`] in arrival order; one failing or panicking client never
//! affects the others.
//!
//! [`SearchBuilder`] wraps the coordinator in a chainable API hanging off
//! [`Sources::search`].
//!
//! # Examples
//!
//! ```rust
//! use medley::prelude::*;
//! # use medley::error::Result;
//!
//! # async fn example() -> Result<()> {
//! # let mut sources = Sources::new();
//! # struct Dummy;
//! # #[async_trait::async_trait]
//! # impl Source for Dummy {
//! #     fn id(&self) -> &str { "dummy" }
//! #     fn name(&self) -> &str { "Dummy" }
//! #     async fn search(&self, _: SearchParams, _: &dyn LinkVerifier) -> Result<Vec<Candidate>> { Ok(vec![]) }
//! # }
//! # sources.add(Dummy);
//! // Everything in one list, dispatch order preserved
//! let songs = sources.search("qing tian").limit(10).flatten().await?;
//!
//! // One entry per source, failures included
//! for (source, result) in sources.search("qing tian").group().await? {
//!     match result {
//!         Ok(found) => println!("{}: {}", source, found.len()),
//!         Err(e) => println!("{}: {}", source, e),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use futures::FutureExt;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, info, instrument, warn};

use crate::{
    error::{Error, Result, panic_message},
    progress::{PhaseCounter, ProgressEvent, ProgressSender},
    source::{Source, Sources},
    types::{Candidate, SearchParams},
    verify::{FastVerifier, LinkVerifier},
};

/// Search worker cap for one-shot command line use.
pub const CLI_SEARCH_WORKERS: usize = 10;
/// Search worker cap for interactive front ends.
pub const INTERACTIVE_SEARCH_WORKERS: usize = 6;

/// Everything one search phase needs.
#[derive(Clone)]
pub struct SearchRequest {
    pub keyword: String,
    /// Sources to query, in dispatch order.
    pub sources: Vec<Arc<dyn Source>>,
    /// Maximum results kept per source.
    pub limit: usize,
    /// Verifier snapshot handed to every source.
    pub verifier: Arc<dyn LinkVerifier>,
    /// Per-source thread degree overrides keyed by source id.
    pub thread_degrees: HashMap<String, usize>,
}

impl SearchRequest {
    pub fn new(
        keyword: impl Into<String>,
        sources: Vec<Arc<dyn Source>>,
        verifier: Arc<dyn LinkVerifier>,
    ) -> Self {
        Self {
            keyword: keyword.into(),
            sources,
            limit: SearchParams::default().limit,
            verifier,
            thread_degrees: HashMap::new(),
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_thread_degrees(mut self, thread_degrees: HashMap<String, usize>) -> Self {
        self.thread_degrees = thread_degrees;
        self
    }

    /// Rejects requests that cannot be dispatched.
    pub fn validate(&self) -> Result<()> {
        if self.keyword.trim().is_empty() {
            return Err(Error::config("search keyword cannot be empty"));
        }
        if self.sources.is_empty() {
            return Err(Error::config("no sources selected"));
        }
        if self.limit == 0 {
            return Err(Error::config("per-source limit must be at least 1"));
        }
        Ok(())
    }

    fn params_for(&self, source: &dyn Source) -> SearchParams {
        SearchParams {
            keyword: self.keyword.trim().to_string(),
            limit: self.limit,
            thread_degree: self
                .thread_degrees
                .get(source.id())
                .copied()
                .unwrap_or_else(|| source.thread_degree())
                .max(1),
        }
    }
}

/// What one source produced.
#[derive(Debug)]
pub struct SourceOutcome {
    /// Id of the source.
    pub source: String,
    /// Dispatch position of the source.
    pub index: usize,
    /// Candidates stamped with the source id, or the isolated failure.
    pub result: Result<Vec<Candidate>>,
    pub elapsed: Duration,
}

/// Results of one source inside a [`SearchReport`].
#[derive(Debug, Clone)]
pub struct SourceBucket {
    pub source: String,
    pub candidates: Vec<Candidate>,
    pub elapsed: Duration,
}

/// Aggregated outcome of a whole search phase.
#[derive(Debug)]
pub struct SearchReport {
    /// Successful sources in dispatch order.
    pub buckets: Vec<SourceBucket>,
    /// Failed sources in dispatch order.
    pub failures: Vec<(String, Error)>,
    /// Source ids in the order they reported.
    pub arrival: Vec<String>,
    pub elapsed: Duration,
}

impl SearchReport {
    pub fn total_found(&self) -> usize {
        self.buckets.iter().map(|b| b.candidates.len()).sum()
    }

    /// Iterates over every candidate, bucket by bucket.
    pub fn candidates(&self) -> impl Iterator<Item = &Candidate> {
        self.buckets.iter().flat_map(|b| b.candidates.iter())
    }

    pub fn into_candidates(self) -> Vec<Candidate> {
        self.buckets
            .into_iter()
            .flat_map(|b| b.candidates)
            .collect()
    }
}

/// Bounded fan-out of a keyword to many sources.
#[derive(Debug, Clone)]
pub struct SearchCoordinator {
    max_workers: usize,
    progress: ProgressSender,
}

impl SearchCoordinator {
    /// Creates a coordinator running at most `max_workers` searches at once.
    pub fn new(max_workers: usize, progress: ProgressSender) -> Self {
        Self {
            max_workers: max_workers.max(1),
            progress,
        }
    }

    /// Coordinator sized for command line use.
    pub fn cli(progress: ProgressSender) -> Self {
        Self::new(CLI_SEARCH_WORKERS, progress)
    }

    /// Coordinator sized for interactive front ends.
    pub fn interactive(progress: ProgressSender) -> Self {
        Self::new(INTERACTIVE_SEARCH_WORKERS, progress)
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Dispatches the request and streams one outcome per source.
    ///
    /// The pool size is `min(sources, max_workers)`. Outcomes arrive in
    /// completion order; a `SourceCompleted` or `SourceFailed` event is sent
    /// for each, with a percentage that grows monotonically to exactly 100.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for an empty keyword, an empty source list or a zero
    /// limit. Nothing is dispatched in that case.
    #[instrument(skip(self, request), fields(keyword = %request.keyword, sources = request.sources.len()))]
    pub fn search_all(&self, request: SearchRequest) -> Result<BoxStream<'static, SourceOutcome>> {
        request.validate()?;

        let total = request.sources.len();
        let workers = total.min(self.max_workers);
        info!(workers, limit = request.limit, "search phase started");
        self.progress.send(ProgressEvent::SearchStarted {
            keyword: request.keyword.clone(),
            sources: total,
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let semaphore = Arc::new(Semaphore::new(workers));
        let counter = Arc::new(PhaseCounter::new(total));
        let progress = self.progress.clone();
        let request = Arc::new(request);

        tokio::spawn(async move {
            for (index, source) in request.sources.iter().enumerate() {
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    warn!("search pool closed before every source was dispatched");
                    break;
                };

                let tx = tx.clone();
                let counter = Arc::clone(&counter);
                let progress = progress.clone();
                let request = Arc::clone(&request);
                let source = Arc::clone(source);

                tokio::spawn(async move {
                    let _permit = permit;
                    let outcome = run_source(index, source, &request).await;

                    counter.complete(|_, percent| {
                        let event = match &outcome.result {
                            Ok(found) => ProgressEvent::SourceCompleted {
                                source: outcome.source.clone(),
                                count: found.len(),
                                percent,
                            },
                            Err(e) => ProgressEvent::SourceFailed {
                                source: outcome.source.clone(),
                                error: e.to_string(),
                                percent,
                            },
                        };
                        progress.send(event);
                    });
                    let _ = tx.send(outcome);
                });
            }
        });

        Ok(stream::poll_fn(move |cx| rx.poll_recv(cx)).boxed())
    }

    /// Runs [`search_all`](Self::search_all) to the end.
    ///
    /// Buckets are ordered by dispatch position regardless of arrival order.
    /// Emits `SearchFinished` with the number of candidates found.
    pub async fn search_collect(&self, request: SearchRequest) -> Result<SearchReport> {
        let started = Instant::now();
        let total = request.sources.len();
        let mut outcomes = self.search_all(request)?;

        let mut slots: Vec<Option<SourceOutcome>> = (0..total).map(|_| None).collect();
        let mut arrival = Vec::with_capacity(total);
        while let Some(outcome) = outcomes.next().await {
            arrival.push(outcome.source.clone());
            if let Some(slot) = slots.get_mut(outcome.index) {
                *slot = Some(outcome);
            }
        }

        let mut buckets = Vec::new();
        let mut failures = Vec::new();
        for outcome in slots.into_iter().flatten() {
            match outcome.result {
                Ok(candidates) => buckets.push(SourceBucket {
                    source: outcome.source,
                    candidates,
                    elapsed: outcome.elapsed,
                }),
                Err(e) => failures.push((outcome.source, e)),
            }
        }

        let report = SearchReport {
            buckets,
            failures,
            arrival,
            elapsed: started.elapsed(),
        };
        let total_found = report.total_found();
        info!(
            total_found,
            failed = report.failures.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "search phase finished"
        );
        self.progress
            .send(ProgressEvent::SearchFinished { total_found });
        Ok(report)
    }
}

/// One search task, with errors and panics turned into a failed outcome.
async fn run_source(index: usize, source: Arc<dyn Source>, request: &SearchRequest) -> SourceOutcome {
    let started = Instant::now();
    let id = panic::catch_unwind(AssertUnwindSafe(|| source.id().to_string()))
        .unwrap_or_else(|_| format!("source #{}", index));

    let attempt = AssertUnwindSafe(async {
        let params = request.params_for(source.as_ref());
        debug!(source = %id, thread_degree = params.thread_degree, "source dispatched");
        source.search(params, request.verifier.as_ref()).await
    })
    .catch_unwind()
    .await;

    let result = match attempt {
        Ok(Ok(mut found)) => {
            found.truncate(request.limit);
            for candidate in &mut found {
                candidate.source = id.clone();
            }
            debug!(source = %id, count = found.len(), "source completed");
            Ok(found)
        }
        Ok(Err(e)) => {
            warn!(source = %id, error = %e, "source failed");
            Err(match e {
                Error::SourceUnavailable { .. } => e,
                other => Error::source_unavailable(&id, other.to_string()),
            })
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(source = %id, error = %message, "source panicked");
            Err(Error::source_unavailable(&id, message))
        }
    };

    SourceOutcome {
        source: id,
        index,
        result,
        elapsed: started.elapsed(),
    }
}

/// A fluent search builder over a [`Sources`] registry.
///
/// # Execution Strategies
///
/// - [`collect()`](SearchBuilder::collect) - Full [`SearchReport`]
/// - [`flatten()`](SearchBuilder::flatten) - All candidates in one vector
/// - [`group()`](SearchBuilder::group) - One result per source, failures included
/// - [`from_source()`](SearchBuilder::from_source) - A single source only
/// - [`build()`](SearchBuilder::build) - Just the search parameters
///
/// Sources are queried with the fast verifier and no progress reporting
/// unless configured otherwise.
pub struct SearchBuilder<'a> {
    sources: &'a Sources,
    keyword: String,
    limit: usize,
    only: Option<Vec<String>>,
    workers: usize,
    verifier: Arc<dyn LinkVerifier>,
    progress: ProgressSender,
}

impl<'a> SearchBuilder<'a> {
    /// This method is called internally by [`Sources::search()`](crate::source::Sources::search).
    pub(crate) fn new(sources: &'a Sources, keyword: impl Into<String>) -> Self {
        Self {
            sources,
            keyword: keyword.into(),
            limit: SearchParams::default().limit,
            only: None,
            workers: CLI_SEARCH_WORKERS,
            verifier: Arc::new(FastVerifier),
            progress: ProgressSender::disabled(),
        }
    }

    /// Sets the maximum number of results per source.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Restricts the search to the given source ids.
    pub fn only<S: AsRef<str>>(mut self, ids: &[S]) -> Self {
        self.only = Some(ids.iter().map(|s| s.as_ref().to_string()).collect());
        self
    }

    /// Caps the number of sources searched at once.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Uses `verifier` for every link found.
    pub fn verifier(mut self, verifier: Arc<dyn LinkVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Reports progress on `progress`.
    pub fn progress(mut self, progress: ProgressSender) -> Self {
        self.progress = progress;
        self
    }

    /// Executes the search and returns the full report.
    pub async fn collect(self) -> Result<SearchReport> {
        let request = self.request()?;
        SearchCoordinator::new(self.workers, self.progress)
            .search_collect(request)
            .await
    }

    /// Executes the search and returns every candidate in dispatch order.
    ///
    /// Failed sources are skipped.
    pub async fn flatten(self) -> Result<Vec<Candidate>> {
        Ok(self.collect().await?.into_candidates())
    }

    /// Executes the search and returns one entry per source in dispatch order.
    pub async fn group(self) -> Result<Vec<(String, Result<Vec<Candidate>>)>> {
        let request = self.request()?;
        let total = request.sources.len();
        let mut outcomes = SearchCoordinator::new(self.workers, self.progress).search_all(request)?;

        let mut slots: Vec<Option<SourceOutcome>> = (0..total).map(|_| None).collect();
        while let Some(outcome) = outcomes.next().await {
            if let Some(slot) = slots.get_mut(outcome.index) {
                *slot = Some(outcome);
            }
        }

        Ok(slots
            .into_iter()
            .flatten()
            .map(|o| (o.source, o.result))
            .collect())
    }

    /// Executes the search on a specific source only.
    ///
    /// # Errors
    ///
    /// * [`Error::Config`] if the source doesn't exist
    /// * [`Error::SourceUnavailable`] if the search fails
    pub async fn from_source(self, source_id: &str) -> Result<Vec<Candidate>> {
        let sources = self.sources.select(&[source_id])?;
        let request = SearchRequest::new(self.keyword, sources, self.verifier).with_limit(self.limit);
        let mut outcomes = SearchCoordinator::new(1, self.progress).search_all(request)?;

        match outcomes.next().await {
            Some(outcome) => outcome.result,
            None => Err(Error::source_unavailable(source_id, "search task ended without a result")),
        }
    }

    /// Builds the parameters a source would receive, without searching.
    pub fn build(self) -> SearchParams {
        SearchParams {
            keyword: self.keyword,
            limit: self.limit,
            ..Default::default()
        }
    }

    fn request(&self) -> Result<SearchRequest> {
        let sources = match &self.only {
            Some(ids) => self.sources.select(ids)?,
            None => self.sources.all(),
        };
        Ok(SearchRequest::new(self.keyword.clone(), sources, Arc::clone(&self.verifier)).with_limit(self.limit))
    }
}
