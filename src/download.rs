//! Concurrent download of selected candidates.
//!
//! [`DownloadCoordinator`] runs a bounded worker pool over a list of
//! candidates. Each worker formats the filename, assigns the save path, asks
//! the owning [`Source`] to fetch the file and then checks that the file really
//! exists. Outcomes are streamed back in completion order; a failure only ever
//! affects its own candidate.
//!
//! Partially written files are left in place when a download fails.
//!
//! # Examples
//!
//! ```rust,no_run
//! use medley::prelude::*;
//! use medley::download::DownloadCoordinator;
//! use medley::progress;
//! use std::path::Path;
//!
//! # async fn example(sources: Sources, picked: Vec<Candidate>) -> medley::Result<()> {
//! let (tx, _rx) = progress::channel();
//! let coordinator = DownloadCoordinator::new(&sources, tx);
//!
//! let summary = coordinator
//!     .download_collect(picked, Path::new("./music"), 5)
//!     .await?;
//! println!("{}/{} downloaded", summary.succeeded, summary.total);
//! # Ok(())
//! # }
//! ```

use futures::FutureExt;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, info, instrument, warn};

use crate::{
    error::{Error, Result, panic_message},
    progress::{PhaseCounter, ProgressEvent, ProgressSender},
    source::{Source, Sources},
    types::Candidate,
};

/// Default number of simultaneous downloads.
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 5;

/// Longest file name produced, in bytes.
const MAX_FILENAME_BYTES: usize = 200;

/// Thread degree every single download runs with.
const PER_DOWNLOAD_THREAD_DEGREE: usize = 1;

/// Result of one candidate's download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadOutcome {
    Success { size_bytes: u64, path: PathBuf },
    Failure { reason: String },
}

impl DownloadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DownloadOutcome::Success { .. })
    }
}

/// One finished job as yielded by [`DownloadCoordinator::download_all`].
#[derive(Debug, Clone)]
pub struct DownloadCompletion {
    /// Position of the candidate in the input list.
    pub index: usize,
    /// The candidate, with its save path assigned.
    pub candidate: Candidate,
    pub outcome: DownloadOutcome,
    /// Time spent in flight.
    pub elapsed: Duration,
}

/// Everything a download phase produced.
#[derive(Debug, Clone)]
pub struct DownloadSummary {
    /// Completions in input order.
    pub outcomes: Vec<DownloadCompletion>,
    pub succeeded: usize,
    pub total: usize,
    pub elapsed: Duration,
}

impl DownloadSummary {
    pub fn failed(&self) -> usize {
        self.total - self.succeeded
    }

    /// Iterates over the failed completions.
    pub fn failures(&self) -> impl Iterator<Item = &DownloadCompletion> {
        self.outcomes.iter().filter(|c| !c.outcome.is_success())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobStatus {
    Pending,
    InFlight,
    Done,
    Failed,
}

/// Bookkeeping for one candidate while it moves through the pool.
#[derive(Debug)]
pub(crate) struct Job {
    index: usize,
    candidate: Candidate,
    status: JobStatus,
    queued_at: Instant,
    started_at: Option<Instant>,
}

impl Job {
    fn new(index: usize, candidate: Candidate) -> Self {
        Self {
            index,
            candidate,
            status: JobStatus::Pending,
            queued_at: Instant::now(),
            started_at: None,
        }
    }

    fn start(&mut self) {
        debug_assert_eq!(self.status, JobStatus::Pending);
        self.status = JobStatus::InFlight;
        self.started_at = Some(Instant::now());
        debug!(
            index = self.index,
            waited_ms = self.queued_at.elapsed().as_millis() as u64,
            "job started"
        );
    }

    fn finish(mut self, outcome: DownloadOutcome) -> DownloadCompletion {
        self.status = if outcome.is_success() {
            JobStatus::Done
        } else {
            JobStatus::Failed
        };
        debug!(index = self.index, status = ?self.status, "job finished");
        DownloadCompletion {
            index: self.index,
            elapsed: self.started_at.unwrap_or(self.queued_at).elapsed(),
            candidate: self.candidate,
            outcome,
        }
    }
}

/// Bounded worker pool for the download phase.
///
/// The coordinator takes a snapshot of the registry when it is created.
/// Candidates whose `source` is not in that snapshot fail individually.
pub struct DownloadCoordinator {
    sources: HashMap<String, Arc<dyn Source>>,
    progress: ProgressSender,
}

impl DownloadCoordinator {
    pub fn new(sources: &Sources, progress: ProgressSender) -> Self {
        Self {
            sources: sources
                .all()
                .into_iter()
                .map(|s| (s.id().to_string(), s))
                .collect(),
            progress,
        }
    }

    /// Starts downloading `candidates` into `destination`.
    ///
    /// At most `concurrency` downloads run at once. The returned stream yields
    /// one [`DownloadCompletion`] per candidate, in completion order, and ends
    /// after the last one. Dropping the stream early does not stop the workers.
    ///
    /// # Errors
    ///
    /// * [`Error::Config`] - `concurrency` is zero
    /// * [`Error::Io`] - `destination` cannot be created; nothing is dispatched
    #[instrument(
        skip(self, candidates, destination),
        fields(total = candidates.len(), destination = %destination.display())
    )]
    pub async fn download_all(
        &self,
        candidates: Vec<Candidate>,
        destination: &Path,
        concurrency: usize,
    ) -> Result<BoxStream<'static, DownloadCompletion>> {
        if concurrency == 0 {
            return Err(Error::config("download concurrency must be at least 1"));
        }
        fs::create_dir_all(destination).await?;

        let total = candidates.len();
        info!(total, concurrency, "download phase started");
        self.progress.send(ProgressEvent::DownloadStarted {
            total,
            destination: destination.to_path_buf(),
        });

        let jobs: Vec<(Job, Option<Arc<dyn Source>>)> = candidates
            .into_iter()
            .enumerate()
            .map(|(index, candidate)| {
                let source = self.sources.get(&candidate.source).cloned();
                (Job::new(index, candidate), source)
            })
            .collect();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let counter = Arc::new(PhaseCounter::new(total));
        let destination = destination.to_path_buf();
        let progress = self.progress.clone();

        tokio::spawn(async move {
            for (job, source) in jobs {
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    warn!("download pool closed before every job was dispatched");
                    break;
                };

                let tx = tx.clone();
                let counter = Arc::clone(&counter);
                let progress = progress.clone();
                let destination = destination.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    let completion = run_job(job, source, &destination).await;
                    let filename = completion
                        .candidate
                        .save_path()
                        .and_then(Path::file_name)
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();

                    counter.complete(|current, _| {
                        progress.send(ProgressEvent::DownloadProgress {
                            current,
                            total: counter.total(),
                            filename,
                        })
                    });
                    let _ = tx.send(completion);
                });
            }
        });

        Ok(stream::poll_fn(move |cx| rx.poll_recv(cx)).boxed())
    }

    /// Runs [`download_all`](Self::download_all) to the end and summarizes it.
    ///
    /// Emits `DownloadFinished` once every candidate has an outcome.
    pub async fn download_collect(
        &self,
        candidates: Vec<Candidate>,
        destination: &Path,
        concurrency: usize,
    ) -> Result<DownloadSummary> {
        let started = Instant::now();
        let total = candidates.len();
        let mut completions = self.download_all(candidates, destination, concurrency).await?;

        let mut slots: Vec<Option<DownloadCompletion>> = (0..total).map(|_| None).collect();
        while let Some(completion) = completions.next().await {
            if let Some(slot) = slots.get_mut(completion.index) {
                *slot = Some(completion);
            }
        }

        let outcomes: Vec<DownloadCompletion> = slots.into_iter().flatten().collect();
        let succeeded = outcomes.iter().filter(|c| c.outcome.is_success()).count();

        info!(succeeded, total, "download phase finished");
        self.progress
            .send(ProgressEvent::DownloadFinished { succeeded, total });

        Ok(DownloadSummary {
            outcomes,
            succeeded,
            total,
            elapsed: started.elapsed(),
        })
    }
}

/// One worker, end to end.
async fn run_job(
    mut job: Job,
    source: Option<Arc<dyn Source>>,
    destination: &Path,
) -> DownloadCompletion {
    job.start();

    let filename = format_filename(&job.candidate);
    job.candidate.assign_save_path(destination.join(&filename));
    let path = job
        .candidate
        .save_path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| destination.join(&filename));

    let Some(source) = source else {
        let reason = format!("unknown source '{}'", job.candidate.source);
        warn!(file = %filename, %reason, "download skipped");
        return job.finish(DownloadOutcome::Failure { reason });
    };

    let attempt = AssertUnwindSafe(source.download(
        &job.candidate,
        destination,
        PER_DOWNLOAD_THREAD_DEGREE,
    ))
    .catch_unwind()
    .await;

    let outcome = match attempt {
        Ok(Ok(())) => match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => DownloadOutcome::Success {
                size_bytes: meta.len(),
                path,
            },
            _ => DownloadOutcome::Failure {
                reason: Error::download(&filename, "output file missing after download")
                    .to_string(),
            },
        },
        Ok(Err(e)) => DownloadOutcome::Failure {
            reason: e.to_string(),
        },
        Err(payload) => DownloadOutcome::Failure {
            reason: Error::download(&filename, panic_message(payload.as_ref())).to_string(),
        },
    };

    if let DownloadOutcome::Failure { reason } = &outcome {
        warn!(source = source.id(), file = %filename, %reason, "download failed");
    }
    job.finish(outcome)
}

/// Builds the on-disk name for a candidate.
///
/// The shape is `singer - title (album) [quality].ext`, without the bracket
/// part when no quality label is known. The result is sanitized with
/// [`sanitize_filename`] and always keeps its extension.
///
/// ```rust
/// use medley::download::format_filename;
/// use medley::types::Candidate;
///
/// let mut song = Candidate::new("AC/DC", "T.N.T.");
/// song.album = Some("High Voltage".into());
/// song.quality = Some("320k".into());
///
/// assert_eq!(format_filename(&song), "AC_DC - T.N.T. (High Voltage) [320k].mp3");
/// ```
pub fn format_filename(candidate: &Candidate) -> String {
    let stem = match candidate.quality_label() {
        Some(quality) => format!(
            "{} - {} ({}) [{}]",
            candidate.singer_label(),
            candidate.title_label(),
            candidate.album_label(),
            quality
        ),
        None => format!(
            "{} - {} ({})",
            candidate.singer_label(),
            candidate.title_label(),
            candidate.album_label()
        ),
    };

    let extension = sanitize_with_limit(candidate.extension_label(), 10);
    let stem = sanitize_with_limit(&stem, MAX_FILENAME_BYTES - extension.len() - 1);
    format!("{}.{}", stem, extension)
}

/// Sanitizes a filename by replacing invalid characters.
///
/// `<>:"/\|?*` become `_`, control characters are removed and leading or
/// trailing dots and spaces are stripped. The result is capped at 200 bytes on
/// a character boundary; an empty result becomes `untitled`.
///
/// # Examples
///
/// ```rust
/// use medley::download::sanitize_filename;
///
/// assert_eq!(sanitize_filename("Who? Me: Yes"), "Who_ Me_ Yes");
/// assert_eq!(sanitize_filename(" ..hidden. "), "hidden");
/// assert_eq!(sanitize_filename("..."), "untitled");
/// ```
pub fn sanitize_filename(name: &str) -> String {
    sanitize_with_limit(name, MAX_FILENAME_BYTES)
}

fn sanitize_with_limit(name: &str, max_bytes: usize) -> String {
    let replaced = replace_invalid_chars(name);
    let mut sanitized = trim_edges(&replaced).to_string();
    if sanitized.len() > max_bytes {
        let mut cut = max_bytes;
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
        sanitized = trim_edges(&sanitized).to_string();
    }

    if sanitized.is_empty() {
        sanitized = "untitled".to_string();
    }
    sanitized
}

/// Character-level part of [`sanitize_filename`]: `<>:"/\|?*` become `_` and
/// control characters are dropped. Nothing is trimmed or truncated.
pub(crate) fn replace_invalid_chars(name: &str) -> String {
    const INVALID_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

    name.chars()
        .filter(|c| !c.is_control())
        .map(|c| if INVALID_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

fn trim_edges(s: &str) -> &str {
    s.trim_matches(|c: char| c == '.' || c.is_whitespace())
}

/// Extracts the file extension from a URL.
///
/// Query and fragment are ignored and the last path segment is
/// percent-decoded. Extensions longer than ten characters or containing
/// anything but ASCII letters and digits are rejected.
///
/// # Examples
///
/// ```rust
/// use medley::download::extract_extension;
///
/// assert_eq!(extract_extension("https://cdn.example.com/a/song.FLAC?vkey=1"), Some("flac".to_string()));
/// assert_eq!(extract_extension("https://cdn.example.com/stream"), None);
/// assert_eq!(extract_extension("https://example.com"), None);
/// ```
pub fn extract_extension(url: &str) -> Option<String> {
    let segment = match url::Url::parse(url) {
        Ok(parsed) => parsed.path_segments()?.next_back()?.to_string(),
        Err(_) => {
            let clean = url.split(['?', '#']).next()?;
            clean.rsplit('/').next()?.to_string()
        }
    };

    let decoded = urlencoding::decode(&segment)
        .map(|d| d.into_owned())
        .unwrap_or(segment);

    let (_, ext) = decoded.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 10 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
