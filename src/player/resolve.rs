//! Turning a track's audio reference into something a backend can load.
//!
//! Catalog rows store either a full URL (`https://...`, `file://...`) or a
//! path inside the public storage bucket (`albums/a1/01 Intro.mp3`). Paths
//! are joined onto the configured storage base with each segment
//! percent-encoded. Without a base, references are passed through as-is.

use std::borrow::Cow;

use reqwest::Url;

use super::PlaybackError;
use crate::error::{Error, Result};

/// Schemes that are already loadable without a storage base.
const ABSOLUTE_SCHEMES: &[&str] = &["http", "https", "file", "data", "blob"];

/// Resolves audio references against the storage base URL.
#[derive(Debug, Clone, Default)]
pub struct SourceResolver {
    base: Option<Url>,
}

impl SourceResolver {
    /// Create a resolver. `base` is the public URL of the audio bucket.
    pub fn new(base: Option<&str>) -> Result<Self> {
        let base = match base.map(str::trim).filter(|b| !b.is_empty()) {
            Some(raw) => {
                let with_slash = if raw.ends_with('/') {
                    raw.to_string()
                } else {
                    format!("{}/", raw)
                };
                let url = Url::parse(&with_slash)
                    .map_err(|e| Error::config(format!("Invalid storage base '{}': {}", raw, e)))?;
                Some(url)
            }
            None => None,
        };
        Ok(Self { base })
    }

    /// The configured base, if any.
    pub fn base(&self) -> Option<&str> {
        self.base.as_ref().map(Url::as_str)
    }

    /// Resolve a reference to a loadable URL.
    pub fn resolve(&self, reference: &str) -> std::result::Result<String, PlaybackError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(PlaybackError::ResourceLoadFailure(
                "empty audio reference".to_string(),
            ));
        }

        if is_absolute(reference) {
            return Ok(reference.to_string());
        }

        let Some(base) = &self.base else {
            return Ok(reference.to_string());
        };

        let (path, query) = match reference.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (reference, None),
        };
        let mut encoded = encode_path(path.trim_start_matches('/'));
        if let Some(query) = query {
            encoded.push('?');
            encoded.push_str(query);
        }

        base.join(&encoded)
            .map(String::from)
            .map_err(|e| PlaybackError::ResourceLoadFailure(format!("{}: {}", reference, e)))
    }
}

fn is_absolute(reference: &str) -> bool {
    match Url::parse(reference) {
        Ok(url) => ABSOLUTE_SCHEMES.contains(&url.scheme()),
        Err(_) => false,
    }
}

/// Percent-encode each path segment, leaving already-encoded segments alone.
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if is_percent_encoded(segment) {
                Cow::Borrowed(segment)
            } else {
                urlencoding::encode(segment)
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// A segment counts as encoded when it has at least one `%` and every `%`
/// starts a valid `%XX` escape.
fn is_percent_encoded(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    let mut escapes = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            match bytes.get(i + 1..i + 3) {
                Some([hi, lo]) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => {
                    escapes += 1;
                    i += 3;
                    continue;
                }
                _ => return false,
            }
        }
        i += 1;
    }
    escapes > 0
}
