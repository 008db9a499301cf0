//! Progress display for export runs
//!
//! A terminal spinner showing rows exported, pages fetched and the cost
//! observed so far. The per-page log lines carry the same numbers; the
//! spinner is only for interactive use.

use indicatif::{ProgressBar, ProgressStyle};

/// Progress tracker for export operations
pub struct ProgressTracker {
    bar: Option<ProgressBar>,
}

impl ProgressTracker {
    /// Create a new progress tracker
    ///
    /// # Arguments
    /// * `enable_bar` - Whether to display a spinner
    pub fn new(enable_bar: bool) -> Self {
        let bar = enable_bar.then(|| {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) =
                ProgressStyle::default_spinner().template("{spinner:.green} {pos} rows {msg}")
            {
                bar.set_style(style);
            }
            bar
        });

        Self { bar }
    }

    /// Disabled tracker
    pub fn hidden() -> Self {
        Self::new(false)
    }

    /// Update progress
    ///
    /// # Arguments
    /// * `rows` - Rows exported so far
    /// * `pages` - Pages fetched so far
    /// * `total_cost` - Cost observed so far
    pub fn update(&self, rows: u64, pages: u64, total_cost: f64) {
        if let Some(ref bar) = self.bar {
            bar.set_position(rows);
            bar.set_message(format!("({} pages, {:.1} RU)", pages, total_cost));
        }
    }

    /// Finish and clear the spinner
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_tracker_accepts_updates() {
        let tracker = ProgressTracker::hidden();
        tracker.update(500, 2, 12.5);
        tracker.finish();
        assert!(tracker.bar.is_none());
    }
}
