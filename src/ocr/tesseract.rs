//! Tesseract OCR engine.
//!
//! Runs the system tesseract binary with a single-uniform-block page
//! segmentation mode and a Japanese language hint. This is the engine that
//! handles dense printed receipt text best.

use std::path::Path;
use std::process::Command;
use std::time::Instant;

use super::backend::{EngineConfig, EngineKind, EngineOutput, OcrEngine, OcrEngineError};
use super::model_utils::check_binary;

/// Tesseract OCR engine.
pub struct TesseractEngine {
    config: EngineConfig,
}

impl TesseractEngine {
    /// Create a new Tesseract engine with default configuration.
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    /// Create a new Tesseract engine with custom configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Run Tesseract on an image file.
    fn run_tesseract(&self, image_path: &Path) -> Result<String, OcrEngineError> {
        let psm = self.config.psm.to_string();
        let output = Command::new("tesseract")
            .arg(image_path)
            .arg("stdout")
            .args(["-l", &self.config.language])
            .args(["--psm", &psm])
            .output();

        match output {
            Ok(output) => {
                if output.status.success() {
                    Ok(String::from_utf8_lossy(&output.stdout).to_string())
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Err(OcrEngineError::RecognitionFailed(format!(
                        "tesseract failed: {}",
                        stderr
                    )))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(OcrEngineError::EngineNotAvailable(
                    "tesseract not found (install tesseract-ocr)".to_string(),
                ))
            }
            Err(e) => Err(OcrEngineError::Io(e)),
        }
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl OcrEngine for TesseractEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Tesseract
    }

    fn is_available(&self) -> bool {
        check_binary("tesseract")
    }

    fn availability_hint(&self) -> String {
        if !check_binary("tesseract") {
            "Tesseract not installed. Install with: apt install tesseract-ocr tesseract-ocr-jpn"
                .to_string()
        } else {
            format!("Tesseract is available (lang: {})", self.config.language)
        }
    }

    fn recognize(&self, image_path: &Path) -> Result<EngineOutput, OcrEngineError> {
        let start = Instant::now();
        let text = self.run_tesseract(image_path)?;
        let elapsed = start.elapsed();

        Ok(EngineOutput {
            text,
            engine: EngineKind::Tesseract,
            processing_time_ms: elapsed.as_millis() as u64,
        })
    }
}
