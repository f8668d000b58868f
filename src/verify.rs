//! Link verification strategies and the per-session mode switch.
//!
//! Source clients call a [`LinkVerifier`] for every download link they find.
//! Two interchangeable strategies exist:
//!
//! - [`ThoroughVerifier`] checks each link over the network and rejects unreachable links
//!   and non-audio content.
//! - [`FastVerifier`] performs no I/O at all. It assumes the link works and
//!   guesses the extension from the URL, trading accuracy for latency.
//!
//! The active strategy is selected through a [`VerifierSwitch`] owned by each
//! [`Session`](crate::session::Session). Operations snapshot the verifier when
//! they are dispatched, so switching affects every later operation and never
//! one that is already running.
//!
//! # Examples
//!
//! ```rust
//! use medley::verify::{VerifierSwitch, VerifyMode};
//!
//! # async fn example() {
//! let switch = VerifierSwitch::new(VerifyMode::Fast);
//!
//! let report = switch.current().verify_and_describe("https://cdn.example.com/a.flac?k=1").await;
//! assert!(report.usable);
//! assert_eq!(report.extension, "flac");
//!
//! assert!(switch.set_mode(VerifyMode::Thorough));
//! assert!(!switch.set_mode(VerifyMode::Thorough)); // already active
//! # }
//! ```

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::download::extract_extension;
use crate::net::HttpClient;
use crate::types::DEFAULT_EXTENSION;

/// Content type reported by the fast strategy.
const ASSUMED_CONTENT_TYPE: &str = "audio/mpeg";

/// Result of [`LinkVerifier::verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkCheck {
    pub usable: bool,
    pub content_type: Option<String>,
    pub size: Option<u64>,
    /// Why the link was rejected, when `usable` is `false`.
    pub reason: Option<String>,
}

/// Result of [`LinkVerifier::inspect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkDetails {
    pub size: Option<u64>,
    pub content_type: Option<String>,
    pub extension: String,
    pub resolved_url: String,
}

/// Combined answer of [`LinkVerifier::verify_and_describe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkReport {
    pub usable: bool,
    pub content_type: Option<String>,
    pub size: Option<u64>,
    pub extension: String,
    pub reason: Option<String>,
}

/// Checks whether a candidate's download link is usable.
///
/// Implementations never fail: every problem is expressed as
/// `usable = false` so that a bad link only drops that one candidate.
#[async_trait]
pub trait LinkVerifier: Send + Sync {
    /// Which strategy this is.
    fn mode(&self) -> VerifyMode;

    /// Checks that `url` points at reachable audio content.
    async fn verify(&self, url: &str) -> LinkCheck;

    /// Gathers metadata about `url` without downloading it.
    async fn inspect(&self, url: &str) -> LinkDetails;

    /// Verifies `url` and describes it in one call.
    ///
    /// The default implementation only inspects links that passed verification.
    async fn verify_and_describe(&self, url: &str) -> LinkReport {
        let check = self.verify(url).await;
        if !check.usable {
            return LinkReport {
                usable: false,
                content_type: check.content_type,
                size: check.size,
                extension: guess_extension(None, url),
                reason: check.reason,
            };
        }

        let details = self.inspect(url).await;
        LinkReport {
            usable: true,
            content_type: details.content_type.or(check.content_type),
            size: details.size.or(check.size),
            extension: details.extension,
            reason: None,
        }
    }
}

/// Verification strategy selector.
///
/// ```rust
/// use medley::verify::VerifyMode;
///
/// assert_eq!("fast".parse::<VerifyMode>().unwrap(), VerifyMode::Fast);
/// assert_eq!("Thorough".parse::<VerifyMode>().unwrap(), VerifyMode::Thorough);
/// assert!("sloppy".parse::<VerifyMode>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyMode {
    #[default]
    Fast,
    Thorough,
}

impl fmt::Display for VerifyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyMode::Fast => f.write_str("fast"),
            VerifyMode::Thorough => f.write_str("thorough"),
        }
    }
}

impl FromStr for VerifyMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(VerifyMode::Fast),
            "thorough" | "normal" | "standard" => Ok(VerifyMode::Thorough),
            other => Err(crate::Error::config(format!(
                "unknown verify mode '{}', expected 'fast' or 'thorough'",
                other
            ))),
        }
    }
}

/// Strategy that trusts every link and never touches the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct FastVerifier;

#[async_trait]
impl LinkVerifier for FastVerifier {
    fn mode(&self) -> VerifyMode {
        VerifyMode::Fast
    }

    async fn verify(&self, _url: &str) -> LinkCheck {
        LinkCheck {
            usable: true,
            content_type: Some(ASSUMED_CONTENT_TYPE.to_string()),
            size: None,
            reason: None,
        }
    }

    async fn inspect(&self, url: &str) -> LinkDetails {
        LinkDetails {
            size: None,
            content_type: Some(ASSUMED_CONTENT_TYPE.to_string()),
            extension: guess_extension(None, url),
            resolved_url: url.to_string(),
        }
    }

    async fn verify_and_describe(&self, url: &str) -> LinkReport {
        LinkReport {
            usable: true,
            content_type: Some(ASSUMED_CONTENT_TYPE.to_string()),
            size: None,
            extension: guess_extension(None, url),
            reason: None,
        }
    }
}

/// Strategy that inspects each link over HTTP.
#[derive(Debug, Clone)]
pub struct ThoroughVerifier {
    client: HttpClient,
}

impl ThoroughVerifier {
    pub fn new() -> Self {
        Self {
            client: HttpClient::new("verifier"),
        }
    }

    /// Uses a custom client, for instance one carrying platform headers.
    pub fn with_client(client: HttpClient) -> Self {
        Self { client }
    }
}

impl Default for ThoroughVerifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LinkVerifier for ThoroughVerifier {
    fn mode(&self) -> VerifyMode {
        VerifyMode::Thorough
    }

    async fn verify(&self, url: &str) -> LinkCheck {
        match self.client.inspect(url).await {
            Ok(head) => {
                let usable = head.content_type.as_deref().is_none_or(is_audio_type);
                let reason = (!usable).then(|| {
                    format!(
                        "non-audio content type {}",
                        head.content_type.as_deref().unwrap_or("unknown")
                    )
                });
                debug!(url, usable, content_type = ?head.content_type, "link verified");
                LinkCheck {
                    usable,
                    content_type: head.content_type,
                    size: head.content_length,
                    reason,
                }
            }
            Err(e) => {
                debug!(url, error = %e, "link unreachable");
                LinkCheck {
                    usable: false,
                    content_type: None,
                    size: None,
                    reason: Some(e.to_string()),
                }
            }
        }
    }

    async fn inspect(&self, url: &str) -> LinkDetails {
        match self.client.inspect(url).await {
            Ok(head) => LinkDetails {
                size: head.content_length,
                extension: guess_extension(head.content_type.as_deref(), &head.final_url),
                content_type: head.content_type,
                resolved_url: head.final_url,
            },
            Err(_) => LinkDetails {
                size: None,
                content_type: None,
                extension: guess_extension(None, url),
                resolved_url: url.to_string(),
            },
        }
    }

    async fn verify_and_describe(&self, url: &str) -> LinkReport {
        // One request answers both questions.
        match self.client.inspect(url).await {
            Ok(head) => {
                let usable = head.content_type.as_deref().is_none_or(is_audio_type);
                LinkReport {
                    usable,
                    extension: guess_extension(head.content_type.as_deref(), &head.final_url),
                    reason: (!usable).then(|| "non-audio content type".to_string()),
                    content_type: head.content_type,
                    size: head.content_length,
                }
            }
            Err(e) => LinkReport {
                usable: false,
                content_type: None,
                size: None,
                extension: guess_extension(None, url),
                reason: Some(e.to_string()),
            },
        }
    }
}

/// Holds the verification strategy a session hands to its operations.
///
/// Each [`Session`](crate::session::Session) owns one switch, so independent
/// sessions never observe each other's mode.
pub struct VerifierSwitch {
    fast: Arc<dyn LinkVerifier>,
    thorough: Arc<dyn LinkVerifier>,
    active: RwLock<VerifyMode>,
}

impl VerifierSwitch {
    /// Creates a switch using the built-in strategies.
    pub fn new(mode: VerifyMode) -> Self {
        Self::with_strategies(mode, Arc::new(FastVerifier), Arc::new(ThoroughVerifier::new()))
    }

    /// Creates a switch with custom strategies for each mode.
    pub fn with_strategies(
        mode: VerifyMode,
        fast: Arc<dyn LinkVerifier>,
        thorough: Arc<dyn LinkVerifier>,
    ) -> Self {
        Self {
            fast,
            thorough,
            active: RwLock::new(mode),
        }
    }

    /// Returns the active mode.
    pub fn mode(&self) -> VerifyMode {
        *self.active.read()
    }

    /// Selects `mode` for every operation issued from now on.
    ///
    /// Returns `false` (and changes nothing) when `mode` is already active.
    pub fn set_mode(&self, mode: VerifyMode) -> bool {
        let mut active = self.active.write();
        if *active == mode {
            return false;
        }
        info!(from = %*active, to = %mode, "verification mode switched");
        *active = mode;
        true
    }

    /// Snapshot of the verifier for the active mode.
    pub fn current(&self) -> Arc<dyn LinkVerifier> {
        match self.mode() {
            VerifyMode::Fast => Arc::clone(&self.fast),
            VerifyMode::Thorough => Arc::clone(&self.thorough),
        }
    }
}

impl fmt::Debug for VerifierSwitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifierSwitch")
            .field("mode", &self.mode())
            .finish()
    }
}

/// Returns `true` for media types that carry audio.
pub fn is_audio_type(content_type: &str) -> bool {
    let ct = content_type.trim().to_ascii_lowercase();
    ct.starts_with("audio/") || ct == "application/octet-stream" || ct == "binary/octet-stream"
}

/// Picks a file extension from the content type, then the URL, then `mp3`.
pub fn guess_extension(content_type: Option<&str>, url: &str) -> String {
    let from_type = content_type.and_then(|ct| match ct {
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        "audio/mp4" | "audio/x-m4a" | "audio/m4a" => Some("m4a"),
        "audio/aac" => Some("aac"),
        "audio/ogg" => Some("ogg"),
        "audio/wav" | "audio/x-wav" | "audio/wave" => Some("wav"),
        "audio/x-ms-wma" => Some("wma"),
        "audio/ape" | "audio/x-ape" => Some("ape"),
        _ => None,
    });

    from_type
        .map(str::to_string)
        .or_else(|| extract_extension(url))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fast_verifier_never_rejects() {
        let report = FastVerifier
            .verify_and_describe("not even a url")
            .await;
        assert!(report.usable);
        assert_eq!(report.size, None);
        assert_eq!(report.extension, "mp3");
    }

    #[tokio::test]
    async fn test_fast_inspect_extension() {
        let details = FastVerifier
            .inspect("https://cdn.example.com/path/song.m4a?vkey=abc#x")
            .await;
        assert_eq!(details.extension, "m4a");
        assert_eq!(details.resolved_url, "https://cdn.example.com/path/song.m4a?vkey=abc#x");
    }

    #[test]
    fn test_switch_is_idempotent() {
        let switch = VerifierSwitch::new(VerifyMode::Fast);
        assert!(!switch.set_mode(VerifyMode::Fast));
        assert_eq!(switch.current().mode(), VerifyMode::Fast);

        assert!(switch.set_mode(VerifyMode::Thorough));
        assert_eq!(switch.current().mode(), VerifyMode::Thorough);
        assert!(!switch.set_mode(VerifyMode::Thorough));
    }

    #[test]
    fn test_audio_types() {
        assert!(is_audio_type("audio/mpeg"));
        assert!(is_audio_type("Audio/FLAC"));
        assert!(is_audio_type("application/octet-stream"));
        assert!(!is_audio_type("text/html"));
        assert!(!is_audio_type("application/json"));
    }

    #[test]
    fn test_guess_extension_prefers_content_type() {
        assert_eq!(guess_extension(Some("audio/flac"), "https://x/a.mp3"), "flac");
        assert_eq!(guess_extension(Some("application/octet-stream"), "https://x/a.ogg"), "ogg");
        assert_eq!(guess_extension(None, "https://x/stream"), "mp3");
    }
}
