//! Store path management utilities.
//!
//! Paths are `/`-separated. The first segment names the collection, the second
//! the record key, anything after that a field inside the record.

use crate::error::{Error, Result};

/// Builder for store paths.
pub struct StorePath;

impl StorePath {
    /// Path of a single record: `"{collection}/{id}"`.
    pub fn record(collection: &str, id: &str) -> String {
        Self::build_composite(&[collection, id])
    }

    /// Path of a field inside a record: `"{collection}/{id}/{field}"`.
    pub fn field(collection: &str, id: &str, field: &str) -> String {
        Self::build_composite(&[collection, id, field])
    }

    /// Build composite path from multiple parts.
    pub fn build_composite(parts: &[&str]) -> String {
        parts
            .iter()
            .map(|p| p.trim_matches('/'))
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Parse a path into its non-empty segments.
    pub fn parse(path: &str) -> Vec<&str> {
        path.split('/').filter(|s| !s.is_empty()).collect()
    }

    /// Split a path into its collection and the remaining segments.
    ///
    /// # Errors
    /// Returns `Error::ValidationError` for an empty path.
    pub fn split(path: &str) -> Result<(&str, Vec<&str>)> {
        let mut segments = Self::parse(path);
        if segments.is_empty() {
            return Err(Error::ValidationError(format!("empty store path: {:?}", path)));
        }
        let collection = segments.remove(0);
        Ok((collection, segments))
    }

    /// JSON pointer for the segments below a collection (`/a/b`).
    pub fn pointer(segments: &[&str]) -> String {
        segments.iter().fold(String::new(), |mut acc, s| {
            acc.push('/');
            acc.push_str(&s.replace('~', "~0").replace('/', "~1"));
            acc
        })
    }
}
