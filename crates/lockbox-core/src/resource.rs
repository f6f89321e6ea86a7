//! Resource model: logical paths inside a user's private root, and the
//! absolute backend locations they resolve to.

use serde::{Deserialize, Serialize};

use crate::error::{LockboxError, LockboxResult};

/// A normalized path relative to a user's private root, e.g. `folder1/secret.txt`.
///
/// `.` and empty segments are dropped; `..` is resolved against the
/// preceding segment and rejected if it would climb above the root.
/// Absolute paths are rejected outright.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrivatePath {
    segments: Vec<String>,
}

impl PrivatePath {
    /// The private root itself (empty path).
    pub fn root() -> Self {
        Self::default()
    }

    pub fn parse(raw: &str) -> LockboxResult<Self> {
        if raw.starts_with('/') {
            return Err(LockboxError::invalid_path("absolute paths are not allowed"));
        }

        let mut segments: Vec<String> = Vec::new();
        for segment in raw.split('/') {
            match segment {
                "" | "." => continue,
                ".." => {
                    if segments.pop().is_none() {
                        return Err(LockboxError::invalid_path(
                            "'..' escapes the private root",
                        ));
                    }
                }
                other => {
                    validate_segment(other)?;
                    segments.push(other.to_string());
                }
            }
        }
        Ok(Self { segments })
    }

    /// Build from already-split segments (e.g. decrypted backend names).
    pub fn from_segments(segments: Vec<String>) -> LockboxResult<Self> {
        for segment in &segments {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(LockboxError::invalid_path("empty, '.' or '..' segment"));
            }
            validate_segment(segment)?;
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segment-wise prefix test: `a/b` starts with `a` but not with `a/b/c` or `a/` + `bc`.
    pub fn starts_with(&self, prefix: &PrivatePath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }
}

fn validate_segment(segment: &str) -> LockboxResult<()> {
    if segment.contains('\\') {
        return Err(LockboxError::invalid_path("backslash in path segment"));
    }
    if segment.chars().any(char::is_control) {
        return Err(LockboxError::invalid_path("control character in path segment"));
    }
    Ok(())
}

impl std::fmt::Display for PrivatePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl std::str::FromStr for PrivatePath {
    type Err = LockboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Absolute location inside a storage backend: `/`-separated, no leading slash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AbsoluteLocation(String);

impl AbsoluteLocation {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Self(path.trim_start_matches('/').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Append one segment. The caller guarantees `segment` holds no `/`.
    pub fn join(&self, segment: &str) -> AbsoluteLocation {
        if self.0.is_empty() {
            AbsoluteLocation(segment.to_string())
        } else {
            AbsoluteLocation(format!("{}/{}", self.0.trim_end_matches('/'), segment))
        }
    }

    /// The location as a directory prefix (with trailing `/`), as listing APIs expect.
    pub fn as_dir(&self) -> String {
        if self.0.is_empty() || self.0.ends_with('/') {
            self.0.clone()
        } else {
            format!("{}/", self.0)
        }
    }

    /// True if `self` is strictly below `dir`.
    pub fn is_under(&self, dir: &AbsoluteLocation) -> bool {
        self.0.starts_with(&dir.as_dir()) && self.0.len() > dir.as_dir().len()
    }

    /// Segments of `self` below `dir`, or `None` if `self` is not under `dir`.
    pub fn relative_segments(&self, dir: &AbsoluteLocation) -> Option<Vec<&str>> {
        if !self.is_under(dir) {
            return None;
        }
        let rest = &self.0[dir.as_dir().len()..];
        Some(rest.split('/').filter(|s| !s.is_empty()).collect())
    }
}

impl std::fmt::Display for AbsoluteLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A logical resource together with the backend location it resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedResource {
    pub logical: PrivatePath,
    pub location: AbsoluteLocation,
}
