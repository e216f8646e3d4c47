//! Pipeline stages for form extraction.
//!
//! Each submodule implements exactly one transformation step, so each is
//! testable on its own and the vision backend can be swapped for a fake
//! without touching rendering or parsing.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ store ──▶ pair ──▶ encode ──▶ vision ──▶ parse
//! (path/URL) (pdfium)  (tempdir) (2 pages) (base64)  (VLM)      (fields)
//! ```
//!
//! 1. [`input`]  — canonicalise the user-supplied path or URL to local bytes
//! 2. [`render`] — rasterise every page at 2× zoom to JPEG; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`store`]  — index-named JPEG files in a run-scoped temporary directory
//! 4. [`pair`]   — consecutive pages → one form; a trailing page is dropped
//!    and counted
//! 5. [`encode`] — stored JPEG → base64 data URI
//! 6. [`vision`] — one request per form; the only stage with network I/O
//! 7. [`parse`]  — reply text → one value per schema field

pub mod encode;
pub mod input;
pub mod pair;
pub mod parse;
pub mod render;
pub mod store;
pub mod vision;
