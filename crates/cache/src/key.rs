//! Deterministic cache key construction.
//!
//! Keys follow `<domain>_<scope>_<name=value>...` with parameters sorted by
//! name, so argument order never changes the key. Canonical keys longer
//! than [`MAX_KEY_LENGTH`] keep their `<domain>_<scope>_` head and replace
//! the parameter tail with a SHA-256 digest of the whole canonical string,
//! which keeps keys bounded while still invalidatable per scope.

use std::fmt::Display;

use sha2::{Digest, Sha256};
use vigil_core::types::DbId;

/// Longest canonical key stored verbatim.
pub const MAX_KEY_LENGTH: usize = 200;

/// Domain prefix for compiled datasets.
pub const PREFIX_REPORT: &str = "report";
/// Domain prefix for chart payloads.
pub const PREFIX_CHART: &str = "chart";
/// Domain prefix for report summary query results.
pub const PREFIX_SUMMARY: &str = "summary";

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Key for one chart payload of one report: `chart_<chartType>_<reportId>`.
pub fn chart_key(chart_type: &str, report_id: DbId) -> String {
    format!("{PREFIX_CHART}_{chart_type}_{report_id}")
}

/// Builder for parameterized keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    prefix: String,
    scope: Option<String>,
    params: Vec<(String, String)>,
}

impl CacheKey {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            scope: None,
            params: Vec::new(),
        }
    }

    /// Key scoped to one entity, e.g. `report_<id>_...`.
    pub fn scoped(prefix: impl Into<String>, scope: impl Display) -> Self {
        Self {
            scope: Some(scope.to_string()),
            ..Self::new(prefix)
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Display) -> Self {
        self.params.push((name.into(), value.to_string()));
        self
    }

    fn head(&self) -> String {
        match &self.scope {
            Some(scope) => format!("{}_{}", self.prefix, scope),
            None => self.prefix.clone(),
        }
    }

    /// The unhashed key with parameters sorted by name.
    pub fn canonical(&self) -> String {
        let mut params: Vec<&(String, String)> = self.params.iter().collect();
        params.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let mut key = self.head();
        for (name, value) in params {
            key.push('_');
            key.push_str(name);
            key.push('=');
            key.push_str(value);
        }
        key
    }

    /// The key to store under.
    pub fn build(&self) -> String {
        let canonical = self.canonical();
        if canonical.len() <= MAX_KEY_LENGTH {
            return canonical;
        }
        format!("{}_{}", self.head(), sha256_hex(canonical.as_bytes()))
    }
}
