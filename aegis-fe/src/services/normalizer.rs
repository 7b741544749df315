//! Text normalization and content fingerprinting
//!
//! Raw submissions are stripped of markup and executable content, control
//! characters are dropped and whitespace is collapsed. The SHA-256 digest of
//! the sanitized text is the deduplication key: byte-identical sanitized text
//! always yields the same fingerprint.

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Elements whose entire body is removed, not just the tags
const EXECUTABLE_ELEMENTS: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "noscript", "template",
];

/// Rejection reasons for a submission, raised before any classification
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("Feedback is empty after sanitization")]
    Empty,

    #[error("Feedback too short: {actual} characters (minimum {min})")]
    TooShort { min: usize, actual: usize },

    #[error("Feedback too long: {actual} characters (maximum {max})")]
    TooLong { max: usize, actual: usize },

    #[error("Submission too large: {actual} bytes (maximum {max})")]
    TooLarge { max: usize, actual: usize },
}

/// Sanitized text plus its fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    pub sanitized: String,
    pub fingerprint: String,
}

/// Validating normalizer with configured length bounds
#[derive(Debug, Clone)]
pub struct Normalizer {
    min_length: usize,
    max_length: usize,
}

impl Normalizer {
    pub fn new(min_length: usize, max_length: usize) -> Self {
        Self {
            min_length,
            max_length,
        }
    }

    /// Largest raw submission accepted, in bytes
    ///
    /// Room for `max_length` four-byte characters plus as much again for
    /// markup that sanitizing removes.
    pub fn max_raw_bytes(&self) -> usize {
        self.max_length.saturating_mul(8)
    }

    /// Sanitize and validate `raw`, then fingerprint it
    pub fn normalize(&self, raw: &str) -> Result<NormalizedText, InputError> {
        if raw.len() > self.max_raw_bytes() {
            return Err(InputError::TooLarge {
                max: self.max_raw_bytes(),
                actual: raw.len(),
            });
        }

        let sanitized = sanitize(raw);
        let length = sanitized.chars().count();

        if length == 0 {
            return Err(InputError::Empty);
        }
        if length < self.min_length {
            return Err(InputError::TooShort {
                min: self.min_length,
                actual: length,
            });
        }
        if length > self.max_length {
            return Err(InputError::TooLong {
                max: self.max_length,
                actual: length,
            });
        }

        let fingerprint = fingerprint(&sanitized);
        tracing::trace!(fingerprint = %fingerprint, length, "Normalized submission");

        Ok(NormalizedText {
            sanitized,
            fingerprint,
        })
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(3, 5000)
    }
}

/// Strip markup and executable content, drop control characters, collapse
/// whitespace and trim
pub fn sanitize(raw: &str) -> String {
    // ASCII lowercasing keeps byte offsets identical to `raw`
    let lower = raw.to_ascii_lowercase();
    let mut out = String::with_capacity(raw.len());
    let mut i = 0;
    // Absolute offset of the first '>' at or after `i`; only searched again
    // once `i` has moved past it, so the whole scan stays linear
    let mut next_gt = raw.find('>');

    while let Some(ch) = raw[i..].chars().next() {
        if ch == '<' {
            if next_gt.is_some_and(|gt| gt < i) {
                next_gt = raw[i..].find('>').map(|offset| i + offset);
            }
            let close = next_gt.map(|gt| gt - i);
            if let Some(skip) = markup_len(&raw[i..], &lower[i..], close) {
                out.push(' ');
                i += skip;
                continue;
            }
        }

        if !(ch.is_control() && !ch.is_whitespace()) {
            out.push(ch);
        }
        i += ch.len_utf8();
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Byte length of the markup construct starting at `rest`, if it is one
///
/// `close` is the offset of the first `>` in `rest`. A `<` that does not open
/// a tag (`I <3 this`, `a < b`) or never closes is kept as literal text.
fn markup_len(rest: &str, rest_lower: &str, close: Option<usize>) -> Option<usize> {
    if rest_lower.starts_with("<!--") {
        return Some(rest.find("-->").map(|end| end + 3).unwrap_or(rest.len()));
    }

    let after = &rest_lower[1..];
    let first = after.chars().next()?;
    if !(first.is_ascii_alphabetic() || matches!(first, '/' | '!' | '?')) {
        return None;
    }
    let close = close?;

    let is_closing = after.starts_with('/');
    let name: String = after
        .trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();

    if !is_closing && EXECUTABLE_ELEMENTS.contains(&name.as_str()) {
        let terminator = format!("</{}", name);
        let body_start = close + 1;
        let end = match rest_lower[body_start..].find(&terminator) {
            Some(pos) => {
                let end_tag = body_start + pos;
                rest_lower[end_tag..]
                    .find('>')
                    .map(|gt| end_tag + gt + 1)
                    .unwrap_or(rest.len())
            }
            None => rest.len(),
        };
        return Some(end);
    }

    Some(close + 1)
}

/// Hex-encoded SHA-256 of the sanitized text
pub fn fingerprint(sanitized: &str) -> String {
    let digest = Sha256::digest(sanitized.as_bytes());
    format!("{:x}", digest)
}
