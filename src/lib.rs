//! # Medley - Concurrent multi-source music search and download
//!
//! Medley searches one keyword across many independent music platforms at
//! once, merges the answers, drops songs that already exist in the local
//! library, and downloads the songs the user picks with bounded parallelism.
//! Progress is reported as a stream of events so that any front end (command
//! line, terminal UI, GUI) can render it.
//!
//! ## Features
//!
//! - **Bounded fan-out**: Searches and downloads run on semaphore-gated worker pools
//! - **Failure isolation**: One broken platform or link never ends the session
//! - **Library-aware**: Results already on disk are filtered out, twice
//! - **Switchable verification**: Check every link, or trust them for speed
//! - **Ordered progress**: Monotonic percentages delivered over a channel
//! - **Pluggable sources**: Implement [`Source`] for any platform
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use medley::prelude::*;
//! use medley::error::Result;
//! use medley::session::{Selection, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let sources = Sources::new();
//!     // sources.add(NeteaseSource::new(...));
//!
//!     let config = Config::default();
//!     let destination = config.destination.clone();
//!     let (session, mut events) = Session::new(sources, config);
//!
//!     tokio::spawn(async move {
//!         while let Some(event) = events.recv().await {
//!             println!("{}", event);
//!         }
//!     });
//!
//!     let results = session.search("ten years", &["netease"], &destination).await?;
//!     let picked = results.select(&Selection::All)?;
//!     let summary = session.download(picked, &destination).await?;
//!
//!     println!("{}/{} downloaded", summary.succeeded, summary.total);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//!
//! - [`source`]: Core trait and registry for platform clients
//! - [`search`]: Search coordinator and fluent search builder
//! - [`download`]: Download coordinator and filename rules
//! - [`library`]: Index of songs already on disk
//! - [`dedupe`]: Filters against the library index
//! - [`verify`]: Link verification strategies and the mode switch
//! - [`progress`]: Progress events and channel
//! - [`session`]: The two-step search/download flow
//! - [`config`]: TOML-loadable settings
//! - [`types`]: Candidates, identities and search parameters
//! - [`net`]: HTTP client and JSON helpers
//! - [`error`]: Error handling
//!
//! ## Logging
//!
//! Medley emits [`tracing`](https://docs.rs/tracing) spans and events but
//! never installs a subscriber; that is left to the application.

pub mod config;
pub mod dedupe;
pub mod download;
pub mod error;
pub mod library;
pub mod net;
pub mod progress;
pub mod search;
pub mod session;
pub mod source;
pub mod types;
pub mod verify;

/// Prelude module for convenient imports.
///
/// ```rust
/// use medley::prelude::*;
///
/// // Now you have access to:
/// // - Sources, Source trait
/// // - SearchBuilder, CandidateListExt
/// // - Candidate, Identity, SearchParams
/// // - LinkVerifier, VerifyMode
/// // - Config, ProgressEvent
/// ```
pub mod prelude {
    pub use crate::{
        config::Config,
        dedupe::CandidateListExt,
        progress::ProgressEvent,
        search::SearchBuilder,
        source::{Source, Sources},
        types::{Candidate, CandidateBuilder, Identity, SearchParams},
        verify::{LinkVerifier, VerifyMode},
    };
}

// Re-export main types at crate root for direct access
pub use config::Config;
pub use download::{DownloadOutcome, DownloadSummary, format_filename, sanitize_filename};
pub use error::{Error, Result};
pub use progress::ProgressEvent;
pub use search::SearchBuilder;
pub use session::{SearchResults, Selection, Session};
pub use source::{Source, Sources};
pub use types::{Candidate, Identity, SearchParams};
pub use verify::{LinkVerifier, VerifyMode};
