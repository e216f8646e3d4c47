//! # edgequake-form2csv
//!
//! Turn scanned two-page handwritten survey forms into a CSV dataset using a
//! vision language model.
//!
//! ## Why this crate?
//!
//! Handwritten answers defeat text extraction and classic OCR struggles with
//! free-form handwriting in boxes. Instead this crate rasterises every page,
//! sends each two-page form to a vision model as one request, and reads back
//! `Field: value` lines that become one CSV row per form.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input   resolve local file or download from URL
//!  ├─ 2. Render  rasterise pages at 2× via pdfium (spawn_blocking) → JPEG store
//!  ├─ 3. Pair    pages (0,1), (2,3), …; a trailing odd page is dropped
//!  ├─ 4. Vision  one request per form: prompt + both page images, in order
//!  ├─ 5. Parse   tolerant `Field: value` reader, `N/A` for anything missing
//!  └─ 6. Output  Dataset → CSV with the field schema as header
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_form2csv::{extract, ExtractionConfig, FieldSchema};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key read from OPENAI_API_KEY
//!     let config = ExtractionConfig::default();
//!     let schema = FieldSchema::retreat_feedback();
//!     let output = extract("forms.pdf", &schema, &config).await?;
//!     std::io::Write::write_all(&mut std::io::stdout(), &output.dataset.to_csv()?)?;
//!     eprintln!("{} forms, {} malformed replies",
//!         output.stats.forms,
//!         output.stats.malformed_replies);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `form2csv` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-form2csv = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod schema;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use error::{FormError, FormExtractError, VisionError};
pub use extract::{
    extract, extract_from_bytes, extract_sync, extract_to_file, extract_with, inspect,
    process_pairs,
};
pub use output::{Dataset, DocumentInfo, ExtractionOutput, ExtractionResult, ExtractionStats};
pub use pipeline::pair::pair_pages;
pub use pipeline::parse::parse_reply;
pub use pipeline::vision::{VisionBackend, VisionExtractor};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::build_prompt;
pub use schema::FieldSchema;
