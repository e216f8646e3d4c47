//! PDF rasterisation: every page at 2× zoom, JPEG-encoded into the page store.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and is not safe to drive from async contexts. Rendering runs on
//! tokio's blocking pool so the runtime workers never stall on CPU-heavy
//! rasterisation.
//!
//! ## Failure model
//!
//! The document is opened without a password. An encrypted document fails at
//! load time, before any page is rendered, and is reported as
//! [`FormExtractError::UnsupportedDocument`]. Any other load or page failure
//! is [`FormExtractError::MalformedDocument`]. On failure no pages are
//! returned; files already written belong to the caller's [`PageStore`] and
//! go away with it.

use crate::error::FormExtractError;
use crate::output::DocumentInfo;
use crate::pipeline::encode::encode_jpeg;
use crate::pipeline::store::{write_page, PageStore, RenderedPage};
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Linear magnification applied to both axes of every page.
pub const RENDER_ZOOM: f32 = 2.0;

/// Bind to a pdfium library.
///
/// Lookup order: `PDFIUM_LIB_PATH`, the working directory, then the system
/// library search path.
pub fn bind_pdfium() -> Result<Pdfium, FormExtractError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(&path),
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| FormExtractError::PdfiumBindingFailed(format!("{e}")))?;

    Ok(Pdfium::new(bindings))
}

/// Render every page of `pdf_bytes` into `store`, in document order.
pub async fn render_pages(
    pdf_bytes: Vec<u8>,
    store: &PageStore,
    jpeg_quality: u8,
) -> Result<Vec<RenderedPage>, FormExtractError> {
    let root = store.root().to_path_buf();

    tokio::task::spawn_blocking(move || render_pages_blocking(&pdf_bytes, &root, jpeg_quality))
        .await
        .map_err(|e| FormExtractError::Internal(format!("Render task panicked: {}", e)))?
}

/// Blocking implementation of page rendering.
fn render_pages_blocking(
    pdf_bytes: &[u8],
    root: &Path,
    jpeg_quality: u8,
) -> Result<Vec<RenderedPage>, FormExtractError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(pdf_bytes, None)
        .map_err(map_load_error)?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let render_config = PdfRenderConfig::new().scale_page_by_factor(RENDER_ZOOM);
    let mut rendered = Vec::with_capacity(total_pages);

    for (idx, page) in pages.iter().enumerate() {
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            FormExtractError::MalformedDocument {
                detail: format!("page {} could not be rendered: {}", idx + 1, e),
            }
        })?;

        let image = bitmap.as_image();
        let jpeg = encode_jpeg(&image, jpeg_quality).map_err(|e| {
            FormExtractError::MalformedDocument {
                detail: format!("page {} could not be encoded: {}", idx + 1, e),
            }
        })?;
        debug!(
            "Rendered page {} → {}x{} px, {} bytes JPEG",
            idx + 1,
            image.width(),
            image.height(),
            jpeg.len()
        );

        rendered.push(write_page(root, idx, &jpeg)?);
    }

    Ok(rendered)
}

/// Read page count and metadata without rendering.
pub async fn inspect_document(pdf_bytes: Vec<u8>) -> Result<DocumentInfo, FormExtractError> {
    tokio::task::spawn_blocking(move || inspect_document_blocking(&pdf_bytes))
        .await
        .map_err(|e| FormExtractError::Internal(format!("Inspect task panicked: {}", e)))?
}

fn inspect_document_blocking(pdf_bytes: &[u8]) -> Result<DocumentInfo, FormExtractError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(pdf_bytes, None)
        .map_err(map_load_error)?;

    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    let mut info = DocumentInfo::from_page_count(document.pages().len() as usize);
    info.pdf_version = format!("{:?}", document.version());
    info.title = get_meta(PdfDocumentMetadataTagType::Title);
    info.author = get_meta(PdfDocumentMetadataTagType::Author);
    info.producer = get_meta(PdfDocumentMetadataTagType::Producer);
    Ok(info)
}

/// Map a pdfium load failure onto the fatal error taxonomy.
fn map_load_error(err: PdfiumError) -> FormExtractError {
    match err {
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
            FormExtractError::UnsupportedDocument {
                detail: "document requires a password".into(),
            }
        }
        other => FormExtractError::MalformedDocument {
            detail: format!("document could not be opened: {}", other),
        },
    }
}
