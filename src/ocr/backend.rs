//! OCR engine abstraction.
//!
//! Two engines with different failure modes run over every page:
//! - Tesseract: traditional OCR via command-line, strong on dense printed text
//! - Neural: pure-Rust detection/recognition models, stronger on noisy or
//!   mixed-language text
//!
//! Engines are trait objects so either can be swapped or removed without
//! touching the structuring layer.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from OCR engines.
#[derive(Debug, Error)]
pub enum OcrEngineError {
    #[error("Engine not available: {0}")]
    EngineNotAvailable(String),

    #[error("Recognition failed: {0}")]
    RecognitionFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    ImageError(String),
}

/// Text produced by a single engine pass over one page image.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    /// Extracted text content.
    pub text: String,
    /// Which engine produced this output.
    pub engine: EngineKind,
    /// Processing time in milliseconds.
    pub processing_time_ms: u64,
}

/// Available OCR engine kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// Tesseract OCR via command-line.
    Tesseract,
    /// Pure Rust neural OCR engine.
    Neural,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Tesseract => "tesseract",
            EngineKind::Neural => "neural",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "tesseract" => Some(EngineKind::Tesseract),
            "neural" | "ocrs" => Some(EngineKind::Neural),
            _ => None,
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trait for OCR engines: produce text given a page image.
pub trait OcrEngine: Send + Sync {
    /// Get the engine kind.
    fn kind(&self) -> EngineKind;

    /// Check if this engine is available (binaries installed, models present
    /// or downloadable).
    fn is_available(&self) -> bool;

    /// Get a description of what's needed to make this engine available.
    fn availability_hint(&self) -> String;

    /// Run OCR on a page image file.
    fn recognize(&self, image_path: &Path) -> Result<EngineOutput, OcrEngineError>;
}

/// Configuration shared by OCR engines.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Tesseract language code (e.g., "jpn", "jpn+eng").
    pub language: String,
    /// Tesseract page segmentation mode. 6 treats the page as a single
    /// uniform block of text, which suits receipts.
    pub psm: u32,
    /// Path to neural model files, overriding the standard search locations.
    pub model_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            language: "jpn".to_string(),
            psm: 6,
            model_dir: None,
        }
    }
}
