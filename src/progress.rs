//! Progress-callback trait for per-form extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the run processes each form. Callers can forward them to a
//! terminal progress bar, a log, or a UI without the library knowing how the
//! host application communicates.
//!
//! Forms are processed strictly one at a time, so events for one run arrive
//! in order: `on_run_start`, then `on_form_start` / `on_form_complete` (or
//! `on_form_error`) per form, then `on_run_complete`.
//!
//! # Example
//!
//! ```rust
//! use edgequake_form2csv::{ExtractionProgressCallback, ExtractionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_form_complete(&self, form_num: usize, total_forms: usize, resolved_fields: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Form {}/{}: {} fields read", form_num, total_forms, resolved_fields);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the extraction run as it processes each form.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once after pairing, before the first vision request.
    ///
    /// # Arguments
    /// * `total_forms`     — number of form pairs that will be processed
    /// * `discarded_pages` — trailing pages dropped for lack of a partner
    fn on_run_start(&self, total_forms: usize, discarded_pages: usize) {
        let _ = (total_forms, discarded_pages);
    }

    /// Called just before the vision request for a form is sent.
    fn on_form_start(&self, form_num: usize, total_forms: usize) {
        let _ = (form_num, total_forms);
    }

    /// Called when a form's reply has been parsed.
    ///
    /// # Arguments
    /// * `resolved_fields` — fields that ended up with a value other than `N/A`
    fn on_form_complete(&self, form_num: usize, total_forms: usize, resolved_fields: usize) {
        let _ = (form_num, total_forms, resolved_fields);
    }

    /// Called when a form's reply was unusable and its row is all `N/A`.
    fn on_form_error(&self, form_num: usize, total_forms: usize, error: &str) {
        let _ = (form_num, total_forms, error);
    }

    /// Called once after every form has been attempted.
    ///
    /// Not called when the run aborts on a fatal error.
    fn on_run_complete(&self, total_forms: usize, success_count: usize) {
        let _ = (total_forms, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
