//! Property paths and JSON paths
//!
//! A `PropertyPath` is a chain of full property names from an entity down to
//! some property, rendered dot-separated (`Session.School.SchoolId`).
//! A `JsonPath` is the location of a value in the generated document
//! (`$.sessionReference.schoolId`, collections as `[*]`).

pub mod document;
pub mod mapping;
pub mod names;

pub use document::{DocumentPath, DocumentWalker, ReferenceSite};
pub use mapping::{DocumentPaths, DocumentPathsEntry, ReferenceJsonPaths, build_document_paths_mapping};
pub use names::{Naming, prefix_with_collapse, uncapitalize};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// =============================================================================
// Property Path
// =============================================================================

/// Ordered property-name segments scoped to one entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyPath(Vec<String>);

impl PropertyPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Split a dotted path. Empty segments are dropped.
    pub fn parse(dotted: &str) -> Self {
        Self::from_segments(dotted.split('.').filter(|s| !s.is_empty()))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// New path with one more segment
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// Concatenation of two paths
    pub fn join(&self, other: &PropertyPath) -> Self {
        let mut segments = self.0.clone();
        segments.extend(other.0.iter().cloned());
        Self(segments)
    }

    /// Segment-wise prefix test (`A.B` prefixes `A.B.C`, not `A.BC`)
    pub fn starts_with(&self, prefix: &PropertyPath) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }

    /// Remainder after a segment-wise prefix
    pub fn strip_prefix(&self, prefix: &PropertyPath) -> Option<PropertyPath> {
        self.starts_with(prefix)
            .then(|| Self(self.0[prefix.0.len()..].to_vec()))
    }

    /// First `n` segments
    pub fn truncate(&self, n: usize) -> Self {
        Self(self.0[..n.min(self.0.len())].to_vec())
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl Serialize for PropertyPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PropertyPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let dotted = String::deserialize(deserializer)?;
        Ok(Self::parse(&dotted))
    }
}

// =============================================================================
// JSON Path
// =============================================================================

/// A location in the generated JSON document
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonPath(String);

impl JsonPath {
    /// The document root, `$`
    pub fn root() -> Self {
        Self("$".to_string())
    }

    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Append `.name`
    pub fn field(&self, name: &str) -> Self {
        Self(format!("{}.{}", self.0, name))
    }

    /// Append the `[*]` wildcard
    pub fn array(&self) -> Self {
        Self(format!("{}[*]", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Re-root this path at `base`: `$.a[*].b` relative to `$.a[*]` is `$.b`
    pub fn relative_to(&self, base: &JsonPath) -> Option<JsonPath> {
        let rest = self.0.strip_prefix(&base.0)?;
        if rest.is_empty() {
            return Some(Self::root());
        }
        (rest.starts_with('.') || rest.starts_with('['))
            .then(|| Self(format!("${}", rest)))
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<&str> for JsonPath {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
