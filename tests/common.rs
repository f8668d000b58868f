//! Common test utilities
//!
//! Scriptable mock sources shared by all integration test modules.
// Common test utilities - all must be public

use async_trait::async_trait;
use medley::prelude::*;
use medley::progress::{ProgressEvent, ProgressReceiver};
use medley::source::verify_candidates;
use medley::{Error, Result, format_filename};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[allow(dead_code)]
pub const MOCK_AUDIO: &[u8] = b"ID3\x04\x00mock audio payload";

/// Installs a test subscriber once; honours `RUST_LOG`.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Tracks how many calls are running at once and the highest value seen.
#[derive(Debug, Default)]
pub struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

#[allow(dead_code)]
impl InFlight {
    pub fn enter(self: &Arc<Self>) -> InFlightGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(Arc::clone(self))
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }
}

pub struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchBehavior {
    Answer,
    Fail,
    Panic,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadBehavior {
    /// Writes [`MOCK_AUDIO`] to the save path.
    Write,
    /// Reports success without writing anything.
    SkipWrite,
    Fail,
    Panic,
}

/// Source client whose behaviour is scripted by the test.
#[allow(dead_code)]
pub struct MockSource {
    id: String,
    hits: Vec<(String, String)>,
    delay: Duration,
    search: SearchBehavior,
    download: DownloadBehavior,
    pub in_flight: Arc<InFlight>,
    pub search_calls: Arc<AtomicUsize>,
    pub download_calls: Arc<AtomicUsize>,
    pub max_thread_degree: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl MockSource {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            hits: Vec::new(),
            delay: Duration::ZERO,
            search: SearchBehavior::Answer,
            download: DownloadBehavior::Write,
            in_flight: Arc::new(InFlight::default()),
            search_calls: Arc::new(AtomicUsize::new(0)),
            download_calls: Arc::new(AtomicUsize::new(0)),
            max_thread_degree: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_hits(mut self, hits: &[(&str, &str)]) -> Self {
        self.hits = hits
            .iter()
            .map(|(s, t)| (s.to_string(), t.to_string()))
            .collect();
        self
    }

    pub fn with_delay(mut self, millis: u64) -> Self {
        self.delay = Duration::from_millis(millis);
        self
    }

    pub fn failing(mut self) -> Self {
        self.search = SearchBehavior::Fail;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.search = SearchBehavior::Panic;
        self
    }

    pub fn downloads(mut self, behavior: DownloadBehavior) -> Self {
        self.download = behavior;
        self
    }

    /// Shares an in-flight tracker with other mocks.
    pub fn tracked_by(mut self, tracker: &Arc<InFlight>) -> Self {
        self.in_flight = Arc::clone(tracker);
        self
    }

    /// A candidate as this source would return it.
    pub fn candidate(&self, singer: &str, title: &str) -> Candidate {
        let mut candidate = Candidate::new(singer, title).with_source(self.id.as_str());
        candidate.download_url = format!("https://mock.invalid/{}/{}.mp3", self.id, title);
        candidate
    }
}

#[async_trait]
impl Source for MockSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.id
    }

    async fn search(&self, params: SearchParams, verifier: &dyn LinkVerifier) -> Result<Vec<Candidate>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.in_flight.enter();
        tokio::time::sleep(self.delay).await;

        match self.search {
            SearchBehavior::Answer => {}
            SearchBehavior::Fail => {
                return Err(Error::Other(format!("{} is down", self.id)));
            }
            SearchBehavior::Panic => panic!("{} exploded", self.id),
        }

        let found = self
            .hits
            .iter()
            .take(params.limit)
            .map(|(s, t)| self.candidate(s, t))
            .collect();
        Ok(verify_candidates(found, verifier, params.thread_degree).await)
    }

    async fn download(&self, candidate: &Candidate, destination: &Path, thread_degree: usize) -> Result<()> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        self.max_thread_degree.fetch_max(thread_degree, Ordering::SeqCst);
        let _guard = self.in_flight.enter();
        tokio::time::sleep(self.delay).await;

        let path = candidate
            .save_path()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| destination.join(format_filename(candidate)));

        match self.download {
            DownloadBehavior::Write => {
                tokio::fs::write(&path, MOCK_AUDIO).await?;
                Ok(())
            }
            DownloadBehavior::SkipWrite => Ok(()),
            DownloadBehavior::Fail => Err(Error::download(
                path.display().to_string(),
                "HTTP 403",
            )),
            DownloadBehavior::Panic => panic!("download of {} exploded", candidate.title),
        }
    }
}

/// Writes empty files with the given names into `dir`.
#[allow(dead_code)]
pub fn touch_all(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|name| {
            let path = dir.join(name);
            std::fs::write(&path, b"").unwrap();
            path
        })
        .collect()
}

/// Collects every event queued so far.
#[allow(dead_code)]
pub fn drain(rx: &mut ProgressReceiver) -> Vec<ProgressEvent> {
    rx.drain()
}

/// Percentages of the per-source completion events, in emission order.
#[allow(dead_code)]
pub fn search_percents(events: &[ProgressEvent]) -> Vec<f64> {
    events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::SourceCompleted { percent, .. }
            | ProgressEvent::SourceFailed { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect()
}
