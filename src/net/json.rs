//! JSON extraction helpers for raw source metadata.
//!
//! Source clients keep whatever their platform returned in
//! [`Candidate::raw`](crate::types::Candidate::raw). These helpers navigate that
//! payload with dot notation so the orchestrator can recover labels (quality,
//! size) that a client did not copy into the typed fields.
//!
//! # Examples
//!
//! ```rust
//! use medley::net::json;
//! use serde_json::json;
//!
//! let raw = json!({
//!     "download": {
//!         "data": { "quality": "320k", "size": 9437184 }
//!     }
//! });
//!
//! assert_eq!(json::extract_label(&raw, "download.data.quality").as_deref(), Some("320k"));
//! assert_eq!(json::extract_label(&raw, "download.data.size").as_deref(), Some("9437184"));
//! assert_eq!(json::extract_label(&raw, "download.data.bitrate"), None);
//! ```

use serde_json::Value;

/// Extracts a value from nested JSON using dot notation.
///
/// Returns `None` as soon as one segment of the path is missing or the
/// current value is not an object.
///
/// # Examples
///
/// ```rust
/// use medley::net::json;
/// use serde_json::json;
///
/// let data = json!({ "song": { "album": "Fantasy" } });
///
/// let album = json::extract_path(&data, "song.album");
/// assert_eq!(album.and_then(|v| v.as_str()), Some("Fantasy"));
/// assert!(json::extract_path(&data, "song.singer").is_none());
/// ```
pub fn extract_path<'a>(json: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = json;

    for key in path.split('.') {
        current = current.as_object()?.get(key)?;
    }

    Some(current)
}

/// Extracts a display label at `path`.
///
/// Strings are trimmed and numbers are rendered as-is. Empty strings, `null`,
/// objects and arrays yield `None`.
pub fn extract_label(json: &Value, path: &str) -> Option<String> {
    match extract_path(json, path)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
