//! Run entry points: PDF in, dataset out.
//!
//! A run is strictly sequential. Pages are rendered into a run-scoped
//! [`PageStore`], paired, and each pair goes through exactly one vision
//! request at a time, in pairing order. The store is dropped when the run
//! ends, on success, on error, or when the run future is cancelled.
//!
//! ## Failure policy
//!
//! * Input, render and pdfium errors abort before any request is sent.
//! * A transport failure or timeout aborts the run (after
//!   `config.max_retries` retries, default none). Forms already processed
//!   are discarded with it; nothing is persisted mid-run.
//! * A malformed reply envelope costs only that form: its row is all `N/A`
//!   and a [`FormError`] is recorded.

use crate::config::ExtractionConfig;
use crate::error::{FormError, FormExtractError, VisionError};
use crate::output::{Dataset, DocumentInfo, ExtractionOutput, ExtractionResult, ExtractionStats};
use crate::pipeline::encode::EncodedImage;
use crate::pipeline::pair::{pair_pages, PairingOutcome};
use crate::pipeline::parse::parse_reply;
use crate::pipeline::store::PageStore;
use crate::pipeline::vision::{VisionBackend, VisionExtractor};
use crate::pipeline::{input, render};
use crate::prompts::build_prompt;
use crate::schema::FieldSchema;
use std::path::Path;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Extract forms from a PDF file path or HTTP/HTTPS URL.
///
/// The vision backend is resolved from `config` (see
/// [`VisionBackend::from_config`]) before the PDF is touched, so a missing
/// API key fails fast.
///
/// # Errors
/// Returns `Err(FormExtractError)` for fatal errors only. Forms with a
/// malformed reply are still returned as all-`N/A` rows.
pub async fn extract(
    input_str: impl AsRef<str>,
    schema: &FieldSchema,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, FormExtractError> {
    let backend = VisionBackend::from_config(config)?;
    extract_with(input_str, schema, &backend, config).await
}

/// Like [`extract`], with a caller-supplied vision backend.
pub async fn extract_with<E: VisionExtractor>(
    input_str: impl AsRef<str>,
    schema: &FieldSchema,
    extractor: &E,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, FormExtractError> {
    let input_str = input_str.as_ref();
    info!("Starting extraction: {}", input_str);
    let bytes = input::load_input(input_str, config.download_timeout_secs).await?;
    extract_from_bytes(bytes, schema, extractor, config).await
}

/// Extract forms from PDF bytes already in memory.
pub async fn extract_from_bytes<E: VisionExtractor>(
    pdf_bytes: Vec<u8>,
    schema: &FieldSchema,
    extractor: &E,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, FormExtractError> {
    let total_start = Instant::now();
    input::check_pdf_magic(&pdf_bytes)?;

    // ── Step 1: Rasterise into a run-scoped store ────────────────────────
    let store = PageStore::new()?;
    let render_start = Instant::now();
    let pages = render::render_pages(pdf_bytes, &store, config.jpeg_quality).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    let total_pages = pages.len();
    info!("Rendered {} pages in {}ms", total_pages, render_duration_ms);

    // ── Step 2: Pair pages into forms ────────────────────────────────────
    let pairing = pair_pages(pages);

    // ── Step 3: One vision request per form ──────────────────────────────
    let mut output = process_pairs(&pairing, schema, extractor, config).await?;
    drop(store);

    output.stats.total_pages = total_pages;
    output.stats.render_duration_ms = render_duration_ms;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Extraction complete: {} forms, {} malformed replies, {} pages dropped, {}ms total",
        output.stats.forms,
        output.stats.malformed_replies,
        output.stats.discarded_pages,
        output.stats.total_duration_ms
    );
    Ok(output)
}

/// Run the vision request and parser over already-paired pages.
///
/// This is the whole run minus rendering. Pages are read from their stored
/// paths; the caller keeps the store alive for the duration.
pub async fn process_pairs<E: VisionExtractor>(
    pairing: &PairingOutcome,
    schema: &FieldSchema,
    extractor: &E,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, FormExtractError> {
    let prompt = build_prompt(schema);
    let total_forms = pairing.pairs.len();
    let discarded_pages = pairing.discarded.len();
    let llm_start = Instant::now();

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(total_forms, discarded_pages);
    }

    let mut dataset = Dataset::new(schema.clone());
    let mut form_errors = Vec::new();

    for pair in &pairing.pairs {
        let form_num = pair.form_number();
        if let Some(ref cb) = config.progress_callback {
            cb.on_form_start(form_num, total_forms);
        }

        let first = EncodedImage::from_jpeg(&pair.first.read()?);
        let second = EncodedImage::from_jpeg(&pair.second.read()?);

        match request_with_retry(extractor, &first, &second, &prompt, form_num, config).await {
            Ok(reply) => {
                let row = parse_reply(&reply, schema);
                let resolved = row.resolved_count();
                debug!(
                    "Form {}: {}/{} fields resolved",
                    form_num,
                    resolved,
                    schema.len()
                );
                if let Some(ref cb) = config.progress_callback {
                    cb.on_form_complete(form_num, total_forms, resolved);
                }
                dataset.push(row);
            }
            Err(VisionError::MalformedApiResponse { detail }) => {
                warn!("Form {}: malformed reply, row left as N/A: {}", form_num, detail);
                let err = FormError::MalformedReply {
                    form: form_num,
                    detail,
                };
                if let Some(ref cb) = config.progress_callback {
                    cb.on_form_error(form_num, total_forms, &err.to_string());
                }
                form_errors.push(err);
                dataset.push(ExtractionResult::unresolved(schema));
            }
            Err(fatal) => {
                return Err(FormExtractError::Transport {
                    form: form_num,
                    detail: fatal.to_string(),
                });
            }
        }
    }

    let resolved_fields: usize = dataset.rows().iter().map(|r| r.resolved_count()).sum();
    let stats = ExtractionStats {
        forms: dataset.len(),
        discarded_pages,
        malformed_replies: form_errors.len(),
        resolved_fields,
        unresolved_fields: dataset.len() * schema.len() - resolved_fields,
        llm_duration_ms: llm_start.elapsed().as_millis() as u64,
        ..Default::default()
    };

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(total_forms, total_forms - form_errors.len());
    }

    Ok(ExtractionOutput {
        dataset,
        form_errors,
        stats,
    })
}

/// One logical request, retried on transport failure per `config`.
///
/// The backoff doubles per attempt: `retry_backoff_ms`, ×2, ×4, …
/// A malformed reply is returned immediately; retrying would not change it
/// into a transport problem and the row policy handles it.
async fn request_with_retry<E: VisionExtractor>(
    extractor: &E,
    first: &EncodedImage,
    second: &EncodedImage,
    prompt: &str,
    form_num: usize,
    config: &ExtractionConfig,
) -> Result<String, VisionError> {
    let mut attempt = 0;
    loop {
        match extractor.extract(first, second, prompt).await {
            Ok(reply) => return Ok(reply),
            Err(e) if e.is_fatal() && attempt < config.max_retries => {
                attempt += 1;
                let backoff = backoff_ms(config.retry_backoff_ms, attempt);
                warn!(
                    "Form {}: {}; retry {}/{} after {}ms",
                    form_num, e, attempt, config.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Delay before retry number `attempt` (1-based), saturating at `u64::MAX`.
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    let factor = 2u64.checked_pow(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    base_ms.saturating_mul(factor)
}

/// Extract and write the CSV to `output_path`.
///
/// Uses atomic write (temp file + rename) so a failed run never leaves a
/// partial CSV behind.
pub async fn extract_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    schema: &FieldSchema,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, FormExtractError> {
    let output = extract(input_str, schema, config).await?;
    write_csv_atomic(&output.dataset, output_path.as_ref()).await?;
    Ok(output)
}

/// Serialise `dataset` and move it into place at `path`.
pub async fn write_csv_atomic(dataset: &Dataset, path: &Path) -> Result<(), FormExtractError> {
    let csv = dataset.to_csv()?;
    let write_err = |source| FormExtractError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("csv.tmp");
    tokio::fs::write(&tmp_path, &csv).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    input_str: impl AsRef<str>,
    schema: &FieldSchema,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, FormExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| FormExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(input_str, schema, config))
}

/// Report page count and expected forms without calling the model.
///
/// Does not require an API key. `download_timeout_secs` bounds the fetch when
/// the input is a URL.
pub async fn inspect(
    input_str: impl AsRef<str>,
    download_timeout_secs: u64,
) -> Result<DocumentInfo, FormExtractError> {
    let bytes = input::load_input(input_str.as_ref(), download_timeout_secs).await?;
    render::inspect_document(bytes).await
}
