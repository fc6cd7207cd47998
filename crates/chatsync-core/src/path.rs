//! Slash-separated locations inside a backend tree

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Maximum path length in bytes
pub const MAX_PATH_LEN: usize = 768;

/// Characters a path segment may not contain
const FORBIDDEN: &[char] = &['.', '#', '$', '[', ']'];

/// Location in the backend tree, e.g. `messages/-NxA3...`
///
/// The empty path is the root. Leading and trailing slashes are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Path(String);

impl Path {
    /// Parse and validate a path
    pub fn new(path: impl AsRef<str>) -> Result<Self> {
        let trimmed = path.as_ref().trim_matches('/');

        if trimmed.len() > MAX_PATH_LEN {
            return Err(Error::InvalidPath(format!(
                "path exceeds {} bytes",
                MAX_PATH_LEN
            )));
        }

        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        for segment in trimmed.split('/') {
            validate_segment(segment)?;
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Append a single segment
    pub fn child(&self, segment: &str) -> Result<Self> {
        validate_segment(segment)?;
        if self.is_root() {
            Ok(Self(segment.to_string()))
        } else {
            Self::new(format!("{}/{}", self.0, segment))
        }
    }

    /// Append a relative path (may contain several segments)
    pub fn join(&self, relative: &Path) -> Self {
        match (self.is_root(), relative.is_root()) {
            (true, _) => relative.clone(),
            (_, true) => self.clone(),
            _ => Self(format!("{}/{}", self.0, relative.0)),
        }
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(match self.0.rfind('/') {
            Some(idx) => Self(self.0[..idx].to_string()),
            None => Self::root(),
        })
    }

    pub fn last(&self) -> Option<&str> {
        self.segments().last()
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// True if `other` is this path or lies beneath it
    pub fn is_ancestor_of(&self, other: &Path) -> bool {
        if self.is_root() || self.0 == other.0 {
            return true;
        }
        other
            .0
            .strip_prefix(&self.0)
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// True if a change at one path can affect data at the other
    pub fn overlaps(&self, other: &Path) -> bool {
        self.is_ancestor_of(other) || other.is_ancestor_of(self)
    }
}

fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(Error::InvalidPath("empty path segment".into()));
    }

    if segment.contains('/') {
        return Err(Error::InvalidPath(format!(
            "segment {:?} contains '/'",
            segment
        )));
    }

    if let Some(c) = segment
        .chars()
        .find(|c| FORBIDDEN.contains(c) || c.is_control())
    {
        return Err(Error::InvalidPath(format!(
            "segment {:?} contains forbidden character {:?}",
            segment, c
        )));
    }

    Ok(())
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_root() {
            write!(f, "/")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl std::str::FromStr for Path {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Path {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Path {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Path> for String {
    fn from(path: Path) -> Self {
        path.0
    }
}
