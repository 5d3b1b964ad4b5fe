//! Progress-callback trait for per-item extraction events.
//!
//! Inject an [`Arc<dyn ItemProgressCallback>`] via
//! [`crate::config::ExtractorConfigBuilder::progress_callback`] to receive
//! events as [`crate::execute::execute`] works through the input items.
//! The CLI uses it to drive a progress bar; other hosts can forward events
//! to whatever they use for run telemetry.
//!
//! # Example
//!
//! ```rust
//! use extract_monster::{ExtractorConfig, ItemProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ItemProgressCallback for CountingCallback {
//!     fn on_item_complete(&self, item_index: usize, total_items: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Item {}/{} done", item_index + 1, total_items);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = ExtractorConfig::builder()
//!     .progress_callback(counter as Arc<dyn ItemProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the executor as it processes each item.
///
/// Items are processed sequentially, so calls never overlap, but the trait is
/// `Send + Sync` so a callback can be shared with other tasks. All methods
/// default to no-ops.
pub trait ItemProgressCallback: Send + Sync {
    /// Called once before the first item.
    fn on_run_start(&self, total_items: usize) {
        let _ = total_items;
    }

    /// Called before an item's input is resolved.
    ///
    /// `item_index` is 0-based, matching `pairedItem`.
    fn on_item_start(&self, item_index: usize, total_items: usize) {
        let _ = (item_index, total_items);
    }

    /// Called when an item produced a success record.
    fn on_item_complete(&self, item_index: usize, total_items: usize) {
        let _ = (item_index, total_items);
    }

    /// Called when an item failed, whether or not the run continues.
    fn on_item_error(&self, item_index: usize, total_items: usize, error: &str) {
        let _ = (item_index, total_items, error);
    }

    /// Called once after the last item, only if the run was not aborted.
    fn on_run_complete(&self, total_items: usize, success_count: usize) {
        let _ = (total_items, success_count);
    }

    /// Called instead of [`on_run_complete`](Self::on_run_complete) when a
    /// failing item stops the run.
    fn on_run_aborted(&self, item_index: usize, total_items: usize) {
        let _ = (item_index, total_items);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ItemProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractorConfig`].
pub type ProgressCallback = Arc<dyn ItemProgressCallback>;
