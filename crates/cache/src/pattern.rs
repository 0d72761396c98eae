//! Wildcard patterns for bulk cache invalidation.
//!
//! `*` matches any run of characters (including none); every other
//! character matches itself. A pattern without `*` is an exact key.
//! `report_5_*` therefore removes `report_5_data` but not `report_56_data`
//! or `report_6_data`.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardPattern {
    raw: String,
    segments: Vec<String>,
}

impl WildcardPattern {
    pub fn parse(pattern: impl Into<String>) -> Self {
        let raw = pattern.into();
        let segments = raw.split('*').map(str::to_string).collect();
        Self { raw, segments }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_exact(&self) -> bool {
        self.segments.len() == 1
    }

    pub fn matches(&self, key: &str) -> bool {
        let (first, rest) = match self.segments.split_first() {
            Some(split) => split,
            None => return key.is_empty(),
        };

        if rest.is_empty() {
            return key == first;
        }

        let Some(mut remainder) = key.strip_prefix(first.as_str()) else {
            return false;
        };

        // `rest` is non-empty here, so there is always a last segment.
        let (last, middle) = match rest.split_last() {
            Some(split) => split,
            None => return true,
        };

        for segment in middle {
            match remainder.find(segment.as_str()) {
                Some(idx) => remainder = &remainder[idx + segment.len()..],
                None => return false,
            }
        }

        remainder.ends_with(last.as_str())
    }
}

impl fmt::Display for WildcardPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for WildcardPattern {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}
