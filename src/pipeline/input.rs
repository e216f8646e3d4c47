//! Input resolution: a user-supplied path or URL → PDF bytes in memory.
//!
//! pdfium loads documents from a byte slice, so both local files and
//! downloads end up as one `Vec<u8>`. The `%PDF` magic bytes are checked
//! here so a wrong file type is reported as a malformed document instead of
//! an opaque pdfium failure.

use crate::error::FormExtractError;
use std::path::PathBuf;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Readers accept the header anywhere in the first kilobyte.
const PDF_MAGIC_WINDOW: usize = 1024;

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read a local PDF or download a remote one.
pub async fn load_input(input: &str, timeout_secs: u64) -> Result<Vec<u8>, FormExtractError> {
    if input.trim().is_empty() {
        return Err(FormExtractError::InvalidInput {
            input: input.to_string(),
        });
    }
    let bytes = if is_url(input) {
        download_url(input, timeout_secs).await?
    } else {
        read_local(input).await?
    };
    check_pdf_magic(&bytes)?;
    Ok(bytes)
}

/// Reject anything without a `%PDF` header in its first kilobyte.
pub fn check_pdf_magic(bytes: &[u8]) -> Result<(), FormExtractError> {
    let window = &bytes[..bytes.len().min(PDF_MAGIC_WINDOW)];
    if !window.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC) {
        let head: Vec<u8> = bytes.iter().take(4).copied().collect();
        return Err(FormExtractError::MalformedDocument {
            detail: format!("not a PDF (first bytes: {:?})", head),
        });
    }
    Ok(())
}

async fn read_local(path_str: &str) -> Result<Vec<u8>, FormExtractError> {
    let path = PathBuf::from(path_str);
    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => FormExtractError::PermissionDenied {
            path: path.clone(),
        },
        _ => FormExtractError::FileNotFound { path: path.clone() },
    })?;
    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(bytes)
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Vec<u8>, FormExtractError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| FormExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            FormExtractError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            FormExtractError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(FormExtractError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| FormExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/forms.pdf"));
        assert!(is_url("http://example.com/forms.pdf"));
        assert!(!is_url("/tmp/forms.pdf"));
        assert!(!is_url("forms.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn magic_bytes() {
        assert!(check_pdf_magic(b"%PDF-1.7\n...").is_ok());
        assert!(matches!(
            check_pdf_magic(b"PK\x03\x04"),
            Err(FormExtractError::MalformedDocument { .. })
        ));
        assert!(check_pdf_magic(b"%P").is_err());
    }

    #[test]
    fn magic_after_leading_junk() {
        let mut bytes = b"\xEF\xBB\xBF\r\n".to_vec();
        bytes.extend_from_slice(b"%PDF-1.4\n...");
        assert!(check_pdf_magic(&bytes).is_ok());

        let mut late = vec![b' '; PDF_MAGIC_WINDOW];
        late.extend_from_slice(b"%PDF-1.4\n");
        assert!(matches!(
            check_pdf_magic(&late),
            Err(FormExtractError::MalformedDocument { .. })
        ));
    }

    #[tokio::test]
    async fn missing_file() {
        let err = load_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, FormExtractError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn local_non_pdf_is_malformed() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello, not a pdf").unwrap();
        let err = load_input(f.path().to_str().unwrap(), 5).await.unwrap_err();
        assert!(matches!(err, FormExtractError::MalformedDocument { .. }));
    }

    #[tokio::test]
    async fn local_pdf_is_read() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"%PDF-1.4\n%%EOF\n").unwrap();
        let bytes = load_input(f.path().to_str().unwrap(), 5).await.unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}
