//! Callback trait for conversion and export lifecycle events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] or
//! [`crate::session::ConvertSession::with_progress_callback`] to follow a
//! session as it selects a file, converts it, and exports the result.
//!
//! # Example
//!
//! ```rust
//! use svgr::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     converted: Arc<AtomicUsize>,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_convert_complete(&self, file_name: &str, svg_len: usize) {
//!         self.converted.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{file_name}: {svg_len} bytes of SVG");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     converted: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by a session as it moves through its lifecycle.
///
/// Implementations must be `Send + Sync`: batch conversion drives several
/// sessions at once and they may share one callback. All methods default to
/// no-ops so callers only override what they care about.
pub trait ConversionProgressCallback: Send + Sync {
    /// A file passed intake and became the selected image.
    fn on_file_selected(&self, file_name: &str, byte_size: u64) {
        let _ = (file_name, byte_size);
    }

    /// A conversion request is about to be sent.
    fn on_convert_start(&self, file_name: &str) {
        let _ = file_name;
    }

    /// The service returned SVG markup.
    fn on_convert_complete(&self, file_name: &str, svg_len: usize) {
        let _ = (file_name, svg_len);
    }

    /// The attempt ended in the `Failed` state.
    fn on_convert_error(&self, file_name: &str, error: &str) {
        let _ = (file_name, error);
    }

    /// An export finished writing to disk.
    fn on_export_saved(&self, path: &Path, bytes_written: usize) {
        let _ = (path, bytes_written);
    }

    /// An export was refused by the entitlement gate.
    fn on_export_blocked(&self, balance: i64) {
        let _ = balance;
    }
}

/// A no-op implementation for callers that don't need events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
