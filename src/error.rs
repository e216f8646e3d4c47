//! Error types for the edgequake-form2csv library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`FormExtractError`] — **Fatal**: the run cannot produce a dataset at all
//!   (unreadable or encrypted PDF, unreachable vision API, bad schema).
//!   Returned as `Err(FormExtractError)` from the top-level `extract*`
//!   functions. No CSV is produced.
//!
//! * [`VisionError`] — returned by a [`crate::pipeline::vision::VisionExtractor`]
//!   for one request. The run decides what it means: transport failures and
//!   timeouts abort, a malformed reply envelope only costs that form's row.
//!
//! * [`FormError`] — **Non-fatal**: one form's reply was unusable. Stored in
//!   [`crate::output::ExtractionOutput::form_errors`]; the row itself is kept
//!   with every field set to `"N/A"`.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-form2csv library.
#[derive(Debug, Error)]
pub enum FormExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The PDF is encrypted. Detected before any page is rendered.
    #[error("PDF is encrypted and cannot be converted to images: {detail}\nDecrypt it first, e.g. qpdf --decrypt input.pdf output.pdf")]
    UnsupportedDocument { detail: String },

    /// The PDF structure, page count or page content could not be read.
    #[error("PDF is malformed: {detail}")]
    MalformedDocument { detail: String },

    // ── Vision errors ─────────────────────────────────────────────────────
    /// The vision API could not be reached or returned an error status.
    #[error("Vision API request failed on form {form}: {detail}")]
    Transport { form: usize, detail: String },

    /// The configured provider is not initialised (missing API key etc.).
    #[error("Vision provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// The field schema violates its invariants.
    #[error("Invalid field schema: {0}")]
    InvalidSchema(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not write or read a page image in the temporary page store.
    #[error("Page store error at '{path}': {source}")]
    StoreFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV serialisation failed.
    #[error("Failed to write CSV: {0}")]
    CsvWriteFailed(String),

    /// Could not create or write the output CSV file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Place libpdfium next to the binary, install it system-wide,\n\
or set PDFIUM_LIB_PATH=/path/to/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure of a single vision request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VisionError {
    /// Network failure or non-success HTTP status.
    #[error("transport error: {detail}")]
    Transport { detail: String },

    /// The request did not complete within the transport timeout.
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The reply did not contain a recognisable choice/message content.
    #[error("malformed API response: {detail}")]
    MalformedApiResponse { detail: String },
}

impl VisionError {
    /// Whether this error aborts the whole run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, VisionError::MalformedApiResponse { .. })
    }
}

/// A non-fatal error for a single form.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub enum FormError {
    /// The reply envelope was unusable; the row was filled with `"N/A"`.
    #[error("Form {form}: malformed vision reply: {detail}")]
    MalformedReply { form: usize, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_reply_is_not_fatal() {
        let e = VisionError::MalformedApiResponse {
            detail: "no choices".into(),
        };
        assert!(!e.is_fatal());
        assert!(VisionError::Timeout { secs: 5 }.is_fatal());
        assert!(VisionError::Transport {
            detail: "connection reset".into()
        }
        .is_fatal());
    }

    #[test]
    fn transport_display_names_form() {
        let e = FormExtractError::Transport {
            form: 3,
            detail: "HTTP 502".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("form 3"), "got: {msg}");
        assert!(msg.contains("HTTP 502"), "got: {msg}");
    }

    #[test]
    fn unsupported_document_display() {
        let e = FormExtractError::UnsupportedDocument {
            detail: "password required".into(),
        };
        assert!(e.to_string().contains("encrypted"));
    }

    #[test]
    fn form_error_display() {
        let e = FormError::MalformedReply {
            form: 2,
            detail: "missing choices".into(),
        };
        assert!(e.to_string().starts_with("Form 2"));
    }
}
