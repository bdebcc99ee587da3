//! Receipt processing pipeline.
//!
//! Load pages, extract text with both OCR engines, structure the fused text
//! through the language model, validate. Each document is processed
//! independently and statelessly; the pipeline holds no state between runs.

use std::path::Path;
use thiserror::Error;

use crate::llm::{GeminiClient, GeminiConfig, GeminiStructurer, Structurer, StructuringError};
use crate::models::Receipt;
use crate::ocr::{
    DocumentLoadError, DocumentLoader, EngineConfig, NeuralEngine, OcrEngineError,
    TesseractEngine, TextExtractor,
};
use crate::validate::{validate, ValidationError};

/// Errors from the processing pipeline, one variant per stage.
///
/// Stages fail fast: a failed stage never produces a partial record, and no
/// default value is ever substituted for a missing required field.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Load(#[from] DocumentLoadError),

    #[error(transparent)]
    Ocr(#[from] OcrEngineError),

    #[error(transparent)]
    Structuring(#[from] StructuringError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl ProcessError {
    /// Whether the caller may reasonably retry the same document.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProcessError::Structuring(e) if e.is_retryable())
    }
}

/// A successfully processed document.
#[derive(Debug)]
pub struct ProcessedReceipt {
    /// The validated record, ready for storage.
    pub receipt: Receipt,
    /// The fused OCR text the record was extracted from.
    pub raw_text: String,
    /// Number of pages processed.
    pub page_count: usize,
}

/// The document-to-record pipeline.
///
/// Constructed once by the caller with explicit collaborators; there is no
/// ambient engine or client state, so tests can substitute doubles for both
/// the OCR engines and the structuring service.
pub struct ReceiptPipeline {
    loader: DocumentLoader,
    extractor: TextExtractor,
    structurer: Box<dyn Structurer>,
}

impl ReceiptPipeline {
    /// Create a pipeline from explicit collaborators.
    pub fn new(
        loader: DocumentLoader,
        extractor: TextExtractor,
        structurer: Box<dyn Structurer>,
    ) -> Self {
        Self {
            loader,
            extractor,
            structurer,
        }
    }

    /// Wire up the production pipeline: Tesseract + neural OCR engines and
    /// the Gemini structurer. Fails fast when the API credential is absent.
    pub fn with_defaults(
        engine_config: EngineConfig,
        gemini_config: GeminiConfig,
        raster_dpi: u32,
    ) -> Result<Self, StructuringError> {
        let client = GeminiClient::new(gemini_config)?;
        let extractor = TextExtractor::new(vec![
            Box::new(TesseractEngine::with_config(engine_config.clone())),
            Box::new(NeuralEngine::with_config(engine_config)),
        ]);
        Ok(Self::new(
            DocumentLoader::new().with_raster_dpi(raster_dpi),
            extractor,
            Box::new(GeminiStructurer::new(client)),
        ))
    }

    /// Process one document into a validated receipt record.
    pub async fn process_document(&self, path: &Path) -> Result<ProcessedReceipt, ProcessError> {
        tracing::info!("Processing {}", path.display());

        let pages = self.loader.load(path)?;
        let page_count = pages.len();

        let raw_text = self.extractor.extract_document(&pages)?;
        tracing::debug!("Extracted {} chars from {} pages", raw_text.len(), page_count);

        let draft = self.structurer.structure(&raw_text).await?;
        let mut receipt = validate(&draft)?;

        receipt.file_path = Some(path.to_path_buf());
        receipt.ocr_text = Some(raw_text.clone());

        Ok(ProcessedReceipt {
            receipt,
            raw_text,
            page_count,
        })
    }
}
