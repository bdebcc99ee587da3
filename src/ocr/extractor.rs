//! Dual-engine text extraction.
//!
//! Every page goes through both OCR engines and their outputs are
//! concatenated, engine-1 block first. The two engines have different
//! failure modes, so nothing is deduplicated or scored here; the language
//! model downstream tolerates duplicated and conflicting tokens far better
//! than a deterministic parser would.

use std::path::Path;

use super::backend::{OcrEngine, OcrEngineError};
use super::loader::PageSet;

/// Runs the configured OCR engines over page images and fuses their output.
pub struct TextExtractor {
    engines: Vec<Box<dyn OcrEngine>>,
}

impl TextExtractor {
    /// Create an extractor over an ordered list of engines. Output blocks
    /// follow engine order.
    pub fn new(engines: Vec<Box<dyn OcrEngine>>) -> Self {
        Self { engines }
    }

    /// The configured engines.
    pub fn engines(&self) -> impl Iterator<Item = &dyn OcrEngine> {
        self.engines.iter().map(|e| e.as_ref())
    }

    /// Extract text from a single page image.
    ///
    /// Each engine runs independently over the same image; outputs are
    /// joined newline-delimited in engine order.
    pub fn extract_page(&self, image_path: &Path) -> Result<String, OcrEngineError> {
        let mut blocks = Vec::with_capacity(self.engines.len());
        for engine in &self.engines {
            let output = engine.recognize(image_path)?;
            tracing::debug!(
                "{} extracted {} chars in {}ms",
                output.engine,
                output.text.len(),
                output.processing_time_ms
            );
            blocks.push(output.text.trim_end_matches('\n').to_string());
        }
        Ok(blocks.join("\n"))
    }

    /// Extract text from every page and concatenate in page order.
    ///
    /// A failed page aborts the whole document: a record built from
    /// silently incomplete text is worse than no record.
    pub fn extract_document(&self, pages: &PageSet) -> Result<String, OcrEngineError> {
        let mut page_texts = Vec::with_capacity(pages.len());
        for (index, page) in pages.pages().iter().enumerate() {
            let text = self.extract_page(page).map_err(|e| {
                tracing::warn!("extraction failed on page {}: {}", index + 1, e);
                e
            })?;
            page_texts.push(text);
        }
        Ok(page_texts.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::backend::{EngineKind, EngineOutput};
    use std::path::PathBuf;

    /// Engine stub that echoes the page filename with a prefix.
    struct EchoEngine {
        prefix: &'static str,
        kind: EngineKind,
    }

    impl OcrEngine for EchoEngine {
        fn kind(&self) -> EngineKind {
            self.kind
        }

        fn is_available(&self) -> bool {
            true
        }

        fn availability_hint(&self) -> String {
            "stub".to_string()
        }

        fn recognize(&self, image_path: &Path) -> Result<EngineOutput, OcrEngineError> {
            let name = image_path.file_stem().unwrap().to_string_lossy();
            Ok(EngineOutput {
                text: format!("{}:{}", self.prefix, name),
                engine: self.kind,
                processing_time_ms: 0,
            })
        }
    }

    /// Engine stub that always fails.
    struct BrokenEngine;

    impl OcrEngine for BrokenEngine {
        fn kind(&self) -> EngineKind {
            EngineKind::Neural
        }

        fn is_available(&self) -> bool {
            false
        }

        fn availability_hint(&self) -> String {
            "stub".to_string()
        }

        fn recognize(&self, _image_path: &Path) -> Result<EngineOutput, OcrEngineError> {
            Err(OcrEngineError::RecognitionFailed("model exploded".to_string()))
        }
    }

    fn dual_echo() -> TextExtractor {
        TextExtractor::new(vec![
            Box::new(EchoEngine {
                prefix: "block",
                kind: EngineKind::Tesseract,
            }),
            Box::new(EchoEngine {
                prefix: "lines",
                kind: EngineKind::Neural,
            }),
        ])
    }

    #[test]
    fn test_page_fuses_both_engines_in_order() {
        let extractor = dual_echo();
        let text = extractor.extract_page(Path::new("/tmp/PAGE1.png")).unwrap();
        assert_eq!(text, "block:PAGE1\nlines:PAGE1");
    }

    #[test]
    fn test_document_preserves_page_order() {
        let extractor = dual_echo();
        let pages = PageSet::from_paths(vec![
            PathBuf::from("/tmp/PAGE1.png"),
            PathBuf::from("/tmp/PAGE2.png"),
            PathBuf::from("/tmp/PAGE3.png"),
        ]);

        let text = extractor.extract_document(&pages).unwrap();
        let p1 = text.find("PAGE1").unwrap();
        let p2 = text.find("PAGE2").unwrap();
        let p3 = text.find("PAGE3").unwrap();
        assert!(p1 < p2 && p2 < p3);
    }

    #[test]
    fn test_failed_engine_aborts_document() {
        let extractor = TextExtractor::new(vec![
            Box::new(EchoEngine {
                prefix: "block",
                kind: EngineKind::Tesseract,
            }),
            Box::new(BrokenEngine),
        ]);
        let pages = PageSet::from_paths(vec![PathBuf::from("/tmp/PAGE1.png")]);

        let err = extractor.extract_document(&pages).unwrap_err();
        assert!(matches!(err, OcrEngineError::RecognitionFailed(_)));
    }
}
