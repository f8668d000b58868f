//! Link verifier tests
//!
//! The thorough strategy against a mock HTTP server, and the fast strategy
//! without any network at all.

use medley::prelude::*;
use medley::source::verify_candidates;
use medley::verify::{FastVerifier, ThoroughVerifier};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn head_with(server: &MockServer, route: &str, status: u16, content_type: Option<&str>) {
    let mut response = ResponseTemplate::new(status);
    if let Some(ct) = content_type {
        response = response.insert_header("content-type", ct);
    }
    Mock::given(method("HEAD"))
        .and(path(route))
        .respond_with(response)
        .mount(server)
        .await;
}

#[cfg(test)]
mod verify_tests {
    use super::*;

    #[tokio::test]
    async fn test_audio_link_is_usable() {
        let server = MockServer::start().await;
        head_with(&server, "/a.mp3", 200, Some("audio/mpeg")).await;

        let check = ThoroughVerifier::new()
            .verify(&format!("{}/a.mp3", server.uri()))
            .await;
        assert!(check.usable);
        assert_eq!(check.content_type.as_deref(), Some("audio/mpeg"));
    }

    #[tokio::test]
    async fn test_html_link_is_rejected() {
        let server = MockServer::start().await;
        head_with(&server, "/login", 200, Some("text/html; charset=utf-8")).await;

        let check = ThoroughVerifier::new()
            .verify(&format!("{}/login", server.uri()))
            .await;
        assert!(!check.usable);
        assert_eq!(check.content_type.as_deref(), Some("text/html"));
        assert!(check.reason.unwrap().contains("text/html"));
    }

    #[tokio::test]
    async fn test_missing_link_is_rejected() {
        let server = MockServer::start().await;
        head_with(&server, "/gone.mp3", 404, None).await;

        let report = ThoroughVerifier::new()
            .verify_and_describe(&format!("{}/gone.mp3", server.uri()))
            .await;
        assert!(!report.usable);
        assert!(report.reason.is_some());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_rejected() {
        let check = ThoroughVerifier::new().verify("http://127.0.0.1:9/a.mp3").await;
        assert!(!check.usable);
    }

    #[tokio::test]
    async fn test_head_rejected_falls_back_to_ranged_get() {
        let server = MockServer::start().await;
        head_with(&server, "/track", 405, None).await;
        Mock::given(method("GET"))
            .and(path("/track"))
            .and(header("range", "bytes=0-0"))
            .respond_with(
                ResponseTemplate::new(206)
                    .insert_header("content-type", "audio/flac")
                    .insert_header("content-range", "bytes 0-0/5000")
                    .set_body_bytes(vec![0u8]),
            )
            .mount(&server)
            .await;

        let report = ThoroughVerifier::new()
            .verify_and_describe(&format!("{}/track", server.uri()))
            .await;
        assert!(report.usable);
        assert_eq!(report.size, Some(5000));
        assert_eq!(report.extension, "flac");
    }

    #[tokio::test]
    async fn test_inspect_guesses_extension_from_content_type() {
        let server = MockServer::start().await;
        head_with(&server, "/stream", 200, Some("audio/ogg")).await;

        let details = ThoroughVerifier::new()
            .inspect(&format!("{}/stream", server.uri()))
            .await;
        assert_eq!(details.extension, "ogg");
        assert!(details.resolved_url.ends_with("/stream"));
    }

    #[tokio::test]
    async fn test_sources_drop_rejected_candidates() {
        let server = MockServer::start().await;
        head_with(&server, "/good.mp3", 200, Some("audio/mpeg")).await;
        head_with(&server, "/bad", 200, Some("application/json")).await;

        let mut good = Candidate::new("A", "Good");
        good.download_url = format!("{}/good.mp3", server.uri());
        let mut bad = Candidate::new("A", "Bad");
        bad.download_url = format!("{}/bad", server.uri());

        let kept = verify_candidates(vec![good, bad], &ThoroughVerifier::new(), 2).await;
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].title, "Good");
        assert_eq!(kept[0].extension.as_deref(), Some("mp3"));
    }

    #[tokio::test]
    async fn test_fast_verifier_accepts_anything() {
        let report = FastVerifier
            .verify_and_describe("https://unreachable.invalid/x/song.wav?sig=abc")
            .await;
        assert!(report.usable);
        assert_eq!(report.content_type.as_deref(), Some("audio/mpeg"));
        assert_eq!(report.size, None);
        assert_eq!(report.extension, "wav");
    }
}
