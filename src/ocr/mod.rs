//! OCR and document loading.
//!
//! Turns a receipt file (raster image or PDF) into a single raw-text blob:
//! the loader yields page images, and the extractor runs two independent
//! OCR engines over every page, concatenating all output in page order.
//! Disambiguation of the duplicated text is deferred to the language-model
//! structuring step.

mod backend;
mod extractor;
mod loader;
mod model_utils;
mod neural;
mod tesseract;

pub use backend::{EngineConfig, EngineKind, EngineOutput, OcrEngine, OcrEngineError};
pub use extractor::TextExtractor;
pub use loader::{DocumentLoadError, DocumentLoader, PageSet};
pub use model_utils::check_binary;
pub use neural::NeuralEngine;
pub use tesseract::TesseractEngine;
