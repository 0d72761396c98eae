//! Per-type outcomes of an optional pipeline step.
//!
//! Narrative and chart generation run once per requested type and each
//! type fails on its own. The outcomes are collected here as `Result`
//! values keyed by type tag; consumers take the successes and decide what
//! to do with the failures.

use std::collections::BTreeMap;

#[derive(Debug)]
pub struct SectionResults<T, E> {
    results: BTreeMap<String, Result<T, E>>,
}

impl<T, E> Default for SectionResults<T, E> {
    fn default() -> Self {
        Self {
            results: BTreeMap::new(),
        }
    }
}

impl<T, E> SectionResults<T, E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome for `key`. A later outcome for the same key wins.
    pub fn insert(&mut self, key: impl Into<String>, result: Result<T, E>) {
        self.results.insert(key.into(), result);
    }

    pub fn get(&self, key: &str) -> Option<&Result<T, E>> {
        self.results.get(key)
    }

    pub fn successes(&self) -> impl Iterator<Item = (&str, &T)> {
        self.results
            .iter()
            .filter_map(|(k, r)| r.as_ref().ok().map(|v| (k.as_str(), v)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &E)> {
        self.results
            .iter()
            .filter_map(|(k, r)| r.as_ref().err().map(|e| (k.as_str(), e)))
    }

    pub fn success_count(&self) -> usize {
        self.successes().count()
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Split into successes and failures, both keyed by type tag.
    pub fn into_parts(self) -> (BTreeMap<String, T>, BTreeMap<String, E>) {
        let mut ok = BTreeMap::new();
        let mut failed = BTreeMap::new();
        for (key, result) in self.results {
            match result {
                Ok(value) => {
                    ok.insert(key, value);
                }
                Err(e) => {
                    failed.insert(key, e);
                }
            }
        }
        (ok, failed)
    }
}

impl<T, E> FromIterator<(String, Result<T, E>)> for SectionResults<T, E> {
    fn from_iter<I: IntoIterator<Item = (String, Result<T, E>)>>(iter: I) -> Self {
        Self {
            results: iter.into_iter().collect(),
        }
    }
}
