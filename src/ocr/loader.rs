//! Document loading: one page image per document page.
//!
//! PDFs are rasterized page-by-page with pdftoppm; raster images are used
//! directly after a decode check. Later stages concatenate text in page
//! order, so pages are always returned in order.

use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use thiserror::Error;

/// Raster image extensions handled by direct load.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp", "gif"];

/// Errors that can occur while loading a document into page images.
#[derive(Debug, Error)]
pub enum DocumentLoadError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(PathBuf),

    #[error("Unreadable or corrupt file {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// An ordered set of page images for one document.
///
/// For rasterized PDFs the backing temp directory is owned by the set, so
/// the image files stay alive as long as the set does.
#[derive(Debug)]
pub struct PageSet {
    pages: Vec<PathBuf>,
    _temp: Option<TempDir>,
}

impl PageSet {
    /// Build a page set from existing image files, in page order.
    pub fn from_paths(pages: Vec<PathBuf>) -> Self {
        Self { pages, _temp: None }
    }

    /// Page image paths, in page order.
    pub fn pages(&self) -> &[PathBuf] {
        &self.pages
    }

    /// Number of pages.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Loads a document from disk into an ordered sequence of page images.
pub struct DocumentLoader {
    /// Rasterization resolution for PDF pages.
    raster_dpi: u32,
}

impl Default for DocumentLoader {
    fn default() -> Self {
        Self { raster_dpi: 300 }
    }
}

impl DocumentLoader {
    /// Create a new loader with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rasterization DPI for PDF pages.
    pub fn with_raster_dpi(mut self, dpi: u32) -> Self {
        self.raster_dpi = dpi;
        self
    }

    /// Load a document, yielding one image per page in page order.
    pub fn load(&self, path: &Path) -> Result<PageSet, DocumentLoadError> {
        if !path.exists() {
            return Err(DocumentLoadError::NotFound(path.to_path_buf()));
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        if ext == "pdf" {
            self.rasterize_pdf(path)
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            self.load_image(path)
        } else {
            Err(DocumentLoadError::UnsupportedFileType(path.to_path_buf()))
        }
    }

    /// Verify a raster image decodes, then return it as a one-page set.
    fn load_image(&self, path: &Path) -> Result<PageSet, DocumentLoadError> {
        image::open(path).map_err(|e| DocumentLoadError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(PageSet::from_paths(vec![path.to_path_buf()]))
    }

    /// Rasterize every page of a PDF into a temp directory.
    fn rasterize_pdf(&self, path: &Path) -> Result<PageSet, DocumentLoadError> {
        let temp_dir = TempDir::new()?;
        let temp_path = temp_dir.path();
        let dpi = self.raster_dpi.to_string();

        let status = Command::new("pdftoppm")
            .args(["-png", "-r", &dpi])
            .arg(path)
            .arg(temp_path.join("page"))
            .status();

        match status {
            Ok(s) if s.success() => {}
            Ok(_) => {
                return Err(DocumentLoadError::Unreadable {
                    path: path.to_path_buf(),
                    reason: "pdftoppm failed to convert PDF".to_string(),
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DocumentLoadError::ToolNotFound(
                    "pdftoppm (install poppler-utils)".to_string(),
                ));
            }
            Err(e) => return Err(DocumentLoadError::Io(e)),
        }

        // pdftoppm names files like page-01.png, page-02.png; lexical sort
        // of the zero-padded names is page order.
        let mut pages: Vec<PathBuf> = std::fs::read_dir(temp_path)?
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "png")
                    .unwrap_or(false)
            })
            .map(|e| e.path())
            .collect();

        pages.sort();

        if pages.is_empty() {
            return Err(DocumentLoadError::Unreadable {
                path: path.to_path_buf(),
                reason: "no pages generated from PDF".to_string(),
            });
        }

        Ok(PageSet {
            pages,
            _temp: Some(temp_dir),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file() {
        let loader = DocumentLoader::new();
        let err = loader.load(Path::new("/nonexistent/receipt.png")).unwrap_err();
        assert!(matches!(err, DocumentLoadError::NotFound(_)));
    }

    #[test]
    fn test_load_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receipt.docx");
        std::fs::write(&path, b"not a document").unwrap();

        let loader = DocumentLoader::new();
        let err = loader.load(&path).unwrap_err();
        assert!(matches!(err, DocumentLoadError::UnsupportedFileType(_)));
    }

    #[test]
    fn test_load_corrupt_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receipt.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        let loader = DocumentLoader::new();
        let err = loader.load(&path).unwrap_err();
        assert!(matches!(err, DocumentLoadError::Unreadable { .. }));
    }

    #[test]
    fn test_load_valid_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receipt.png");
        image::RgbImage::new(80, 100).save(&path).unwrap();

        let loader = DocumentLoader::new();
        let pages = loader.load(&path).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages.pages()[0], path);
    }
}
