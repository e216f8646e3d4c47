//! Run-scoped storage for rendered page images.
//!
//! Pages are written as `page_0000.jpg`, `page_0001.jpg`, … inside a
//! [`TempDir`]. The directory lives exactly as long as the [`PageStore`]:
//! it is removed when the store is dropped, whether the run finished,
//! failed, or was cancelled mid-way.
//!
//! Zero-padded names keep a directory listing in page order, but nothing
//! relies on that: [`RenderedPage`] carries its index explicitly.

use crate::error::FormExtractError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// One rendered page: its 0-based index and where its JPEG lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub index: usize,
    pub path: PathBuf,
}

impl RenderedPage {
    /// Read the stored JPEG bytes.
    pub fn read(&self) -> Result<Vec<u8>, FormExtractError> {
        std::fs::read(&self.path).map_err(|e| FormExtractError::StoreFailed {
            path: self.path.clone(),
            source: e,
        })
    }
}

/// Temporary, index-addressed page image store.
#[derive(Debug)]
pub struct PageStore {
    dir: TempDir,
}

impl PageStore {
    /// Create an empty store in the system temp directory.
    pub fn new() -> Result<Self, FormExtractError> {
        let dir = tempfile::Builder::new()
            .prefix("form2csv-")
            .tempdir()
            .map_err(|e| FormExtractError::StoreFailed {
                path: std::env::temp_dir(),
                source: e,
            })?;
        debug!("Page store at {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Path a page with `index` is stored at under `root`.
    pub fn page_path(root: &Path, index: usize) -> PathBuf {
        root.join(format!("page_{index:04}.jpg"))
    }

    /// Persist `jpeg` as page `index`.
    pub fn put(&self, index: usize, jpeg: &[u8]) -> Result<RenderedPage, FormExtractError> {
        write_page(self.root(), index, jpeg)
    }
}

/// Write page `index` under `root`. Usable from blocking threads that only
/// hold the root path.
pub(crate) fn write_page(
    root: &Path,
    index: usize,
    jpeg: &[u8],
) -> Result<RenderedPage, FormExtractError> {
    let path = PageStore::page_path(root, index);
    std::fs::write(&path, jpeg).map_err(|e| FormExtractError::StoreFailed {
        path: path.clone(),
        source: e,
    })?;
    Ok(RenderedPage { index, path })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_and_read_back() {
        let store = PageStore::new().unwrap();
        let page = store.put(3, b"\xFF\xD8fake").unwrap();
        assert_eq!(page.index, 3);
        assert!(page.path.ends_with("page_0003.jpg"));
        assert_eq!(page.read().unwrap(), b"\xFF\xD8fake");
    }

    #[test]
    fn directory_removed_on_drop() {
        let store = PageStore::new().unwrap();
        store.put(0, b"x").unwrap();
        let root = store.root().to_path_buf();
        assert!(root.exists());
        drop(store);
        assert!(!root.exists());
    }

    #[test]
    fn names_sort_in_page_order() {
        let root = Path::new("/tmp/x");
        let mut names: Vec<PathBuf> = [10, 2, 1]
            .iter()
            .map(|i| PageStore::page_path(root, *i))
            .collect();
        names.sort();
        assert!(names[0].ends_with("page_0001.jpg"));
        assert!(names[2].ends_with("page_0010.jpg"));
    }

    #[test]
    fn reading_missing_page_fails() {
        let store = PageStore::new().unwrap();
        let page = RenderedPage {
            index: 0,
            path: store.root().join("page_0000.jpg"),
        };
        assert!(matches!(
            page.read(),
            Err(FormExtractError::StoreFailed { .. })
        ));
    }
}
