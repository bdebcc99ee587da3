//! Neural OCR engine.
//!
//! Uses the ocrs crate for pure-Rust OCR without external binaries.
//! Detections are grouped into lines and returned as plain text, which
//! complements Tesseract on noisy or handwritten receipts.
//!
//! Models are automatically downloaded on first use from:
//! https://ocrs-models.s3-accelerate.amazonaws.com/

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Instant;

use super::backend::{EngineConfig, EngineKind, EngineOutput, OcrEngine, OcrEngineError};
use super::model_utils::{ensure_model_file, ModelDirConfig, ModelSpec};

/// Model directory configuration for the neural engine.
const MODEL_CONFIG: ModelDirConfig = ModelDirConfig {
    subdir: "keihi",
    required_files: &["text-detection.rten", "text-recognition.rten"],
};

/// Model specifications for downloading.
const DETECTION_MODEL: ModelSpec = ModelSpec {
    url: "https://ocrs-models.s3-accelerate.amazonaws.com/text-detection.rten",
    filename: "text-detection.rten",
    size_hint: "2.5 MB",
};

const RECOGNITION_MODEL: ModelSpec = ModelSpec {
    url: "https://ocrs-models.s3-accelerate.amazonaws.com/text-recognition.rten",
    filename: "text-recognition.rten",
    size_hint: "10 MB",
};

/// Neural OCR engine (pure Rust).
///
/// The underlying model engine is loaded lazily on first recognition and
/// cached per instance. Construct one engine and share it; there is no
/// process-global state.
pub struct NeuralEngine {
    config: EngineConfig,
    engine: OnceLock<ocrs::OcrEngine>,
}

impl NeuralEngine {
    /// Create a new neural engine with default configuration.
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            engine: OnceLock::new(),
        }
    }

    /// Create a new neural engine with custom configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            engine: OnceLock::new(),
        }
    }

    /// Find the model directory, checking config path and standard locations.
    fn find_model_dir(&self) -> Option<PathBuf> {
        // Check config path first
        if let Some(ref path) = self.config.model_dir {
            if MODEL_CONFIG.has_required_files(path) {
                return Some(path.clone());
            }
        }

        // Check standard locations
        MODEL_CONFIG
            .candidate_dirs()
            .into_iter()
            .find(|dir| MODEL_CONFIG.has_required_files(dir))
    }

    /// Ensure models are downloaded, downloading them if necessary.
    fn ensure_models(&self) -> Result<PathBuf, OcrEngineError> {
        if let Some(dir) = self.find_model_dir() {
            return Ok(dir);
        }

        let model_dir = MODEL_CONFIG.default_dir();
        std::fs::create_dir_all(&model_dir).map_err(OcrEngineError::Io)?;

        ensure_model_file(&DETECTION_MODEL, &model_dir)?;
        ensure_model_file(&RECOGNITION_MODEL, &model_dir)?;

        Ok(model_dir)
    }

    /// Get or initialize the cached model engine.
    fn get_or_init_engine(&self) -> Result<&ocrs::OcrEngine, OcrEngineError> {
        // Try to get existing engine first
        if let Some(engine) = self.engine.get() {
            return Ok(engine);
        }

        // Initialize the engine (only happens once per instance)
        let model_dir = self.ensure_models()?;

        let detection_path = model_dir.join("text-detection.rten");
        let recognition_path = model_dir.join("text-recognition.rten");

        // Load models
        let detection_model = rten::Model::load_file(&detection_path).map_err(|e| {
            OcrEngineError::RecognitionFailed(format!("Failed to load detection model: {}", e))
        })?;
        let recognition_model = rten::Model::load_file(&recognition_path).map_err(|e| {
            OcrEngineError::RecognitionFailed(format!("Failed to load recognition model: {}", e))
        })?;

        // Create engine
        let engine = ocrs::OcrEngine::new(ocrs::OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|e| {
            OcrEngineError::RecognitionFailed(format!("Failed to create OCR engine: {}", e))
        })?;

        // Store in the instance cache - if another thread beat us, that's fine
        let _ = self.engine.set(engine);

        self.engine
            .get()
            .ok_or_else(|| OcrEngineError::RecognitionFailed("Failed to cache OCR engine".to_string()))
    }

    /// Run OCR on an image.
    fn run_neural(&self, image_path: &Path) -> Result<String, OcrEngineError> {
        let engine = self.get_or_init_engine()?;

        // Load image
        let img = image::open(image_path)
            .map_err(|e| OcrEngineError::ImageError(format!("Failed to load image: {}", e)))?;
        let rgb_img = img.to_rgb8();

        let (width, height) = rgb_img.dimensions();

        let img_source = ocrs::ImageSource::from_bytes(rgb_img.as_raw(), (width, height))
            .map_err(|e| OcrEngineError::ImageError(format!("Failed to convert image: {}", e)))?;

        let input = engine.prepare_input(img_source).map_err(|e| {
            OcrEngineError::RecognitionFailed(format!("Failed to prepare input: {}", e))
        })?;

        // Line-grouped plain text
        let text = engine.get_text(&input).map_err(|e| {
            OcrEngineError::RecognitionFailed(format!("Failed to extract text: {}", e))
        })?;

        Ok(text)
    }
}

impl Default for NeuralEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl OcrEngine for NeuralEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Neural
    }

    fn is_available(&self) -> bool {
        // Always available - models will be auto-downloaded on first use
        true
    }

    fn availability_hint(&self) -> String {
        match self.find_model_dir() {
            Some(path) => format!("Neural OCR models found at {:?}", path),
            None => format!(
                "Neural OCR models will be auto-downloaded on first use (~12 MB total) to {:?}",
                MODEL_CONFIG.default_dir()
            ),
        }
    }

    fn recognize(&self, image_path: &Path) -> Result<EngineOutput, OcrEngineError> {
        let start = Instant::now();
        let text = self.run_neural(image_path)?;
        let elapsed = start.elapsed();

        Ok(EngineOutput {
            text,
            engine: EngineKind::Neural,
            processing_time_ms: elapsed.as_millis() as u64,
        })
    }
}
