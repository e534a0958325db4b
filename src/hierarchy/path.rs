//! Splitting of path strings into hierarchy segments.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

/// `scheme://` at the start of a path (RFC 3986 scheme name).
static SCHEME_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://").expect("valid scheme regex"));

/// Number of `/`-separated components taken by `scheme:`, the empty
/// component between the two slashes, and `host:port`.
const SCHEME_COMPONENTS: usize = 3;

/// Ordered segment names of a path, first segment being the root entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HierarchyPath {
    segments: Vec<String>,
}

impl HierarchyPath {
    /// Parses one of the accepted shapes:
    ///
    /// - `/proj1/a/b`
    /// - `hdfs://namenode:8020/proj1/a/b`
    /// - `proj1/a/b` or a bare `proj1`
    ///
    /// The prefix form is not limited to `hdfs`: any `scheme://authority`
    /// is stripped, so `viewfs://cluster/proj1/a` names the same entry.
    ///
    /// Trailing empty components are dropped, so `/` and the empty string
    /// both yield no segments.
    pub fn parse(raw: &str) -> Self {
        let mut components: Vec<&str> = if let Some(rest) = raw.strip_prefix('/') {
            rest.split('/').collect()
        } else if SCHEME_PREFIX.is_match(raw) {
            raw.split('/').skip(SCHEME_COMPONENTS).collect()
        } else {
            raw.split('/').collect()
        };

        while components.last().is_some_and(|c| c.is_empty()) {
            components.pop();
        }

        Self {
            segments: components.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn root(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for HierarchyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}
