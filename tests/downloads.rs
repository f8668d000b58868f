//! Download coordinator tests
//!
//! Worker pool bounds, per-candidate failure isolation, filenames and the
//! default HTTP download path.

use async_trait::async_trait;
use medley::download::{DownloadCoordinator, DownloadOutcome};
use medley::library::parse_filename;
use medley::prelude::*;
use medley::progress::{self, ProgressEvent, ProgressSender};
use medley::{Result, format_filename, sanitize_filename};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::{DownloadBehavior, InFlight, MOCK_AUDIO, MockSource, init_tracing};

/// Source that relies on the default HTTP download.
struct HttpOnly;

#[async_trait]
impl Source for HttpOnly {
    fn id(&self) -> &str {
        "http"
    }

    fn name(&self) -> &str {
        "HTTP only"
    }

    async fn search(&self, _: SearchParams, _: &dyn LinkVerifier) -> Result<Vec<Candidate>> {
        Ok(vec![])
    }
}

#[cfg(test)]
mod download_tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrency_bound_and_counter() {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let tracker = Arc::new(InFlight::default());
        let mock = MockSource::new("m").with_delay(30).tracked_by(&tracker);
        let candidates: Vec<_> = (0..10)
            .map(|i| mock.candidate("Singer", &format!("Song {}", i)))
            .collect();
        let degree = Arc::clone(&mock.max_thread_degree);

        let mut sources = Sources::new();
        sources.add(mock);
        let (tx, mut rx) = progress::channel();

        let summary = DownloadCoordinator::new(&sources, tx)
            .download_collect(candidates, dir.path(), 3)
            .await
            .unwrap();

        assert!(tracker.peak() <= 3, "peak was {}", tracker.peak());
        assert_eq!(summary.total, 10);
        assert_eq!(summary.succeeded, 10);
        assert_eq!(degree.load(Ordering::SeqCst), 1);

        let currents: Vec<_> = rx
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::DownloadProgress { current, total, .. } => {
                    assert_eq!(total, 10);
                    Some(current)
                }
                _ => None,
            })
            .collect();
        assert_eq!(currents, (1..=10).collect::<Vec<_>>());

        for completion in &summary.outcomes {
            match &completion.outcome {
                DownloadOutcome::Success { size_bytes, path } => {
                    assert_eq!(*size_bytes, MOCK_AUDIO.len() as u64);
                    assert!(path.exists());
                    assert_eq!(completion.candidate.save_path(), Some(path.as_path()));
                }
                other => panic!("unexpected outcome {:?}", other),
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failures_are_isolated() {
        let dir = TempDir::new().unwrap();
        let good = MockSource::new("good");
        let broken = MockSource::new("broken").downloads(DownloadBehavior::Fail);
        let liar = MockSource::new("liar").downloads(DownloadBehavior::SkipWrite);
        let crash = MockSource::new("crash").downloads(DownloadBehavior::Panic);

        let mut ghost = Candidate::new("Nobody", "Nowhere").with_source("ghost");
        ghost.download_url = "https://mock.invalid/ghost.mp3".into();

        let candidates = vec![
            good.candidate("A", "One"),
            broken.candidate("B", "Two"),
            liar.candidate("C", "Three"),
            crash.candidate("D", "Four"),
            ghost,
            good.candidate("E", "Five"),
        ];

        let mut sources = Sources::new();
        sources.add(good).add(broken).add(liar).add(crash);

        let summary = DownloadCoordinator::new(&sources, ProgressSender::disabled())
            .download_collect(candidates, dir.path(), 2)
            .await
            .unwrap();

        assert_eq!(summary.total, 6);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed(), 4);

        let reasons: Vec<_> = summary
            .outcomes
            .iter()
            .map(|c| match &c.outcome {
                DownloadOutcome::Success { .. } => "ok".to_string(),
                DownloadOutcome::Failure { reason } => reason.clone(),
            })
            .collect();

        assert_eq!(reasons[0], "ok");
        assert!(reasons[1].contains("HTTP 403"));
        assert!(reasons[2].contains("missing"));
        assert!(reasons[3].contains("panicked"));
        assert!(reasons[4].contains("unknown source"));
        assert_eq!(reasons[5], "ok");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_failures_do_not_stall_the_counter() {
        let dir = TempDir::new().unwrap();
        let tracker = Arc::new(InFlight::default());
        let mocks = [
            MockSource::new("good"),
            MockSource::new("broken").downloads(DownloadBehavior::Fail),
            MockSource::new("liar").downloads(DownloadBehavior::SkipWrite),
            MockSource::new("crash").downloads(DownloadBehavior::Panic),
        ]
        .map(|m| m.with_delay(20).tracked_by(&tracker));

        // good, broken, liar, crash, good, broken, ...
        let candidates: Vec<_> = (0..10)
            .map(|i| mocks[i % 4].candidate("Singer", &format!("Track {}", i)))
            .collect();

        let mut sources = Sources::new();
        for mock in mocks {
            sources.add(mock);
        }
        let (tx, mut rx) = progress::channel();

        let summary = DownloadCoordinator::new(&sources, tx)
            .download_collect(candidates, dir.path(), 3)
            .await
            .unwrap();

        assert!(tracker.peak() <= 3, "peak was {}", tracker.peak());
        assert_eq!(tracker.current(), 0);
        assert_eq!(summary.total, 10);
        assert_eq!(summary.outcomes.len(), 10);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failed(), 7);

        let currents: Vec<_> = rx
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::DownloadProgress { current, .. } => Some(current),
                _ => None,
            })
            .collect();
        assert_eq!(currents, (1..=10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_outcomes_keep_input_order() {
        let dir = TempDir::new().unwrap();
        let slow = MockSource::new("slow").with_delay(80);
        let fast = MockSource::new("fast");
        let candidates = vec![slow.candidate("A", "Slow"), fast.candidate("B", "Fast")];

        let mut sources = Sources::new();
        sources.add(slow).add(fast);

        let summary = DownloadCoordinator::new(&sources, ProgressSender::disabled())
            .download_collect(candidates, dir.path(), 2)
            .await
            .unwrap();

        let titles: Vec<_> = summary
            .outcomes
            .iter()
            .map(|c| c.candidate.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Slow", "Fast"]);
        assert_eq!(summary.outcomes[0].index, 0);
    }

    #[tokio::test]
    async fn test_uncreatable_destination_is_hard_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let mock = MockSource::new("m");
        let calls = Arc::clone(&mock.download_calls);
        let candidates = vec![mock.candidate("A", "B")];
        let mut sources = Sources::new();
        sources.add(mock);

        let result = DownloadCoordinator::new(&sources, ProgressSender::disabled())
            .download_collect(candidates, &blocker.join("music"), 2)
            .await;

        assert!(matches!(result, Err(medley::Error::Io(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_concurrency_rejected() {
        let dir = TempDir::new().unwrap();
        let sources = Sources::new();
        let result = DownloadCoordinator::new(&sources, ProgressSender::disabled())
            .download_collect(vec![], dir.path(), 0)
            .await;
        assert!(result.unwrap_err().is_config());
    }

    #[tokio::test]
    async fn test_empty_selection_finishes() {
        let dir = TempDir::new().unwrap();
        let sources = Sources::new();
        let (tx, mut rx) = progress::channel();

        let summary = DownloadCoordinator::new(&sources, tx)
            .download_collect(vec![], &dir.path().join("new"), 5)
            .await
            .unwrap();

        assert_eq!(summary.total, 0);
        assert!(dir.path().join("new").is_dir());
        assert!(matches!(
            rx.drain().last(),
            Some(ProgressEvent::DownloadFinished { succeeded: 0, total: 0 })
        ));
    }

    #[tokio::test]
    async fn test_default_download_streams_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/song.flac"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(MOCK_AUDIO.to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/gone.mp3"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let mut found = Candidate::new("Artist", "Song").with_source("http");
        found.download_url = format!("{}/files/song.flac", server.uri());
        found.extension = Some("flac".into());
        let mut gone = Candidate::new("Artist", "Gone").with_source("http");
        gone.download_url = format!("{}/files/gone.mp3", server.uri());

        let mut sources = Sources::new();
        sources.add(HttpOnly);

        let summary = DownloadCoordinator::new(&sources, ProgressSender::disabled())
            .download_collect(vec![found, gone], dir.path(), 2)
            .await
            .unwrap();

        match &summary.outcomes[0].outcome {
            DownloadOutcome::Success { size_bytes, path } => {
                assert_eq!(*size_bytes, MOCK_AUDIO.len() as u64);
                assert_eq!(
                    path.file_name().unwrap().to_str().unwrap(),
                    "Artist - Song (Unknown Album).flac"
                );
                assert_eq!(std::fs::read(path).unwrap(), MOCK_AUDIO);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        match &summary.outcomes[1].outcome {
            DownloadOutcome::Failure { reason } => assert!(reason.contains("404")),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_filename_sanitization() {
        let test_cases = vec![
            ("Normal Song", "Normal Song"),
            ("AC/DC\\Live", "AC_DC_Live"),
            ("What?*", "What__"),
            ("\"Quoted\" <Live>", "_Quoted_ _Live_"),
            ("Pipes|Here", "Pipes_Here"),
            ("   Spaced   Song   ", "Spaced   Song"),
            ("..Dots..", "Dots"),
            ("Bell\u{7}Song", "BellSong"),
            ("", "untitled"),
            ("...", "untitled"),
        ];

        for (input, expected) in test_cases {
            assert_eq!(sanitize_filename(input), expected, "input {:?}", input);
        }
    }

    #[test]
    fn test_formatted_names_parse_back_to_identity() {
        let cases = [
            ("A/B", "C:D", "a_b", "c_d"),
            ("Eason Chan", "Ten Years", "eason chan", "ten years"),
            ("  Spaced ", " Out ", "spaced", "out"),
            ("X", "Y - Remix", "x", "y - remix"),
        ];

        for (singer, title, want_singer, want_title) in cases {
            let mut song = Candidate::new(singer, title);
            song.quality = Some("flac".into());
            let name = format_filename(&song);
            let identity = parse_filename(&name).unwrap().normalized();
            assert_eq!(identity, Identity::new(want_singer, want_title), "{}", name);

            let expected = song.identity().normalized();
            assert_eq!(identity.singer, sanitize_filename(&expected.singer));
            assert_eq!(identity.title, sanitize_filename(&expected.title));
        }
    }
}
