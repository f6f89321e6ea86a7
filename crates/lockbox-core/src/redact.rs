//! Redaction of sensitive values before they reach a tracing sink.
//!
//! User ids, logical paths and document contents are never logged raw.
//! Instead they are replaced with a short BLAKE3 fingerprint, which is
//! stable across log lines (so events can be correlated) but does not
//! reveal the value. Passwords and keys are never passed here at all; their
//! `Debug` impls print `[REDACTED]`.

use std::fmt;

const FINGERPRINT_HEX_LEN: usize = 8;

/// Display wrapper that renders `<redacted:xxxxxxxx>`.
#[derive(Clone, PartialEq, Eq)]
pub struct Redacted {
    fingerprint: String,
}

impl fmt::Display for Redacted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<redacted:{}>", self.fingerprint)
    }
}

impl fmt::Debug for Redacted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Fingerprint an arbitrary value.
pub fn secure(value: impl AsRef<[u8]>) -> Redacted {
    Redacted {
        fingerprint: fingerprint(value.as_ref()),
    }
}

/// Display wrapper for paths: each `/` segment is fingerprinted on its own,
/// so the depth of the path stays visible.
#[derive(Clone, PartialEq, Eq)]
pub struct RedactedPath {
    segments: Vec<String>,
}

impl fmt::Display for RedactedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("<root>");
        }
        f.write_str(&self.segments.join("/"))
    }
}

impl fmt::Debug for RedactedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

pub fn secure_path(path: impl AsRef<str>) -> RedactedPath {
    RedactedPath {
        segments: path
            .as_ref()
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| format!("<{}>", fingerprint(s.as_bytes())))
            .collect(),
    }
}

fn fingerprint(bytes: &[u8]) -> String {
    let hex = blake3::hash(bytes).to_hex();
    hex[..FINGERPRINT_HEX_LEN].to_string()
}
