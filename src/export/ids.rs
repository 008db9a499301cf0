//! Identifier list loading and normalization
//!
//! Lines are trimmed, blanks and `#` comments dropped, values uppercased and
//! deduplicated with the first occurrence keeping its position. Batching
//! happens only after deduplication.

use std::collections::HashSet;
use std::path::Path;

use tracing::debug;

use crate::error::{InputError, Result};

/// Normalized, ordered, duplicate-free identifiers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdSet {
    ids: Vec<String>,
}

/// Normalize one raw line; `None` for blanks and comments
pub fn normalize_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    Some(fold_case(trimmed))
}

/// Case folding shared with the batch query's `$toUpper`, which only maps ASCII
pub fn fold_case(id: &str) -> String {
    id.to_ascii_uppercase()
}

impl IdSet {
    /// Build from the text of an identifier file
    pub fn parse(text: &str) -> Self {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        Self::from_raw(text.lines())
    }

    /// Build from already split values
    pub fn from_raw<'a, I>(raw: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        let mut skipped = 0usize;

        for id in raw.into_iter().filter_map(normalize_id) {
            if seen.insert(id.clone()) {
                ids.push(id);
            } else {
                skipped += 1;
            }
        }

        if skipped > 0 {
            debug!("Dropped {} duplicate identifiers", skipped);
        }
        Self { ids }
    }

    /// Read and normalize an identifier file (UTF-8, one id per line)
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| InputError::Unreadable {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        let set = Self::parse(&text);
        debug!(
            "Loaded {} distinct identifiers from {}",
            set.len(),
            path.display()
        );
        Ok(set)
    }

    /// Fail with the benign empty-set error when there is nothing to export
    pub fn require_non_empty(self) -> Result<Self> {
        if self.ids.is_empty() {
            return Err(InputError::EmptyIdSet.into());
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.ids
    }

    /// Consecutive batches of at most `size` identifiers
    pub fn batches(&self, size: usize) -> std::slice::Chunks<'_, String> {
        self.ids.chunks(size.max(1))
    }

    /// Number of store queries a run with `size` batches will issue
    pub fn batch_count(&self, size: usize) -> usize {
        self.ids.len().div_ceil(size.max(1))
    }
}
