//! Progress events and the channel that carries them to the presentation layer.
//!
//! Coordinators never print. They push [`ProgressEvent`]s into a
//! [`ProgressSender`]; a CLI, TUI or GUI drains the matching
//! [`ProgressReceiver`] at its own pace, either by awaiting
//! [`recv`](ProgressReceiver::recv) or by polling [`drain`](ProgressReceiver::drain)
//! from a UI tick.
//!
//! Events from one coordinator arrive in emission order. A session runs its
//! search phase to completion before starting the download phase, so the two
//! phases never interleave.
//!
//! # Examples
//!
//! ```rust
//! use medley::progress::{self, ProgressEvent};
//!
//! # async fn example() {
//! let (tx, mut rx) = progress::channel();
//! tx.send(ProgressEvent::SearchFinished { total_found: 12 });
//! drop(tx);
//!
//! while let Some(event) = rx.recv().await {
//!     println!("{}", event);
//! }
//! # }
//! ```

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Something a presentation layer may want to show.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A search phase was dispatched.
    SearchStarted { keyword: String, sources: usize },
    /// One source returned results.
    SourceCompleted {
        source: String,
        count: usize,
        percent: f64,
    },
    /// One source failed; the others are unaffected.
    SourceFailed {
        source: String,
        error: String,
        percent: f64,
    },
    /// Every source of the search has reported.
    SearchFinished { total_found: usize },
    /// Candidates were dropped because they already exist locally.
    DuplicatesSkipped { skipped: usize },
    /// A download phase was dispatched.
    DownloadStarted { total: usize, destination: PathBuf },
    /// One download finished, successfully or not.
    DownloadProgress {
        current: usize,
        total: usize,
        filename: String,
    },
    /// Every download of the phase has finished.
    DownloadFinished { succeeded: usize, total: usize },
    /// The operation could not run at all.
    Fatal { error: String },
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::SearchStarted { keyword, sources } => {
                write!(f, "searching '{}' on {} sources", keyword, sources)
            }
            ProgressEvent::SourceCompleted {
                source,
                count,
                percent,
            } => write!(f, "[{:5.1}%] {} found {}", percent, source, count),
            ProgressEvent::SourceFailed {
                source,
                error,
                percent,
            } => write!(f, "[{:5.1}%] {} failed: {}", percent, source, error),
            ProgressEvent::SearchFinished { total_found } => {
                write!(f, "search finished, {} found", total_found)
            }
            ProgressEvent::DuplicatesSkipped { skipped } => {
                write!(f, "skipped {} already in library", skipped)
            }
            ProgressEvent::DownloadStarted { total, destination } => {
                write!(f, "downloading {} to {}", total, destination.display())
            }
            ProgressEvent::DownloadProgress {
                current,
                total,
                filename,
            } => write!(f, "[{}/{}] {}", current, total, filename),
            ProgressEvent::DownloadFinished { succeeded, total } => {
                write!(f, "download finished, {}/{} succeeded", succeeded, total)
            }
            ProgressEvent::Fatal { error } => write!(f, "fatal: {}", error),
        }
    }
}

/// Creates a connected sender/receiver pair.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressSender { tx: Some(tx) }, ProgressReceiver { rx })
}

/// Producer half of the progress channel.
///
/// Cloning is cheap. Sending never blocks and never fails the producer: once
/// the receiver is gone, events are discarded.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSender {
    /// A sender that discards everything, for callers that don't need events.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn send(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

/// Consumer half of the progress channel.
#[derive(Debug)]
pub struct ProgressReceiver {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressReceiver {
    /// Waits for the next event; `None` once every sender is dropped.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    /// Returns the next event if one is queued.
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        self.rx.try_recv().ok()
    }

    /// Takes every queued event without waiting.
    pub fn drain(&mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Completion counter for one phase run.
///
/// The counter lives as long as a single `search_all`/`download_all` call,
/// so concurrent sessions never share it. [`complete`](PhaseCounter::complete)
/// runs the caller's closure while the lock is held, which keeps emitted
/// percentages in counter order.
#[derive(Debug)]
pub struct PhaseCounter {
    total: usize,
    completed: Mutex<usize>,
}

impl PhaseCounter {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: Mutex::new(0),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn completed(&self) -> usize {
        *self.completed.lock()
    }

    /// Records one finished task and hands `(completed, percent)` to `report`
    /// before releasing the lock.
    pub fn complete<R>(&self, report: impl FnOnce(usize, f64) -> R) -> R {
        let mut completed = self.completed.lock();
        *completed += 1;
        let current = *completed;
        report(current, percent(current, self.total))
    }
}

/// `completed / total` as a percentage; exactly `100.0` when they are equal.
pub fn percent(completed: usize, total: usize) -> f64 {
    if total == 0 || completed >= total {
        return 100.0;
    }
    completed as f64 * 100.0 / total as f64
}
