//! Configuration management.
//!
//! Settings come from three layers, later ones winning: built-in defaults,
//! a config file (`keihi.{toml,yaml,yml,json}` next to the data directory or
//! passed via `--config`), and environment variables (`KEIHI_DATA_DIR`,
//! `GEMINI_API_KEY` via the process environment or a `.env` file).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::llm::GeminiConfig;
use crate::ocr::EngineConfig;

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "keihi.db";

/// Subdirectory for copies of ingested receipt files.
const RECEIPTS_SUBDIR: &str = "receipts";

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename.
    pub database_filename: String,
    /// Directory for storing ingested receipt files.
    pub receipts_dir: PathBuf,
    /// OCR engine configuration.
    pub ocr: OcrFileConfig,
    /// Language model configuration.
    pub llm: GeminiConfig,
}

impl Default for Settings {
    fn default() -> Self {
        // Default to ~/Documents/keihi for user data
        // Falls back gracefully: Documents dir -> Home dir -> Current dir
        let data_dir = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("keihi");

        Self {
            receipts_dir: data_dir.join(RECEIPTS_SUBDIR),
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            ocr: OcrFileConfig::default(),
            llm: GeminiConfig::from_env(),
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            receipts_dir: data_dir.join(RECEIPTS_SUBDIR),
            data_dir,
            ..Default::default()
        }
    }

    /// Get the full path to the database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Check if the database appears to be initialized.
    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }

    /// Ensure all directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        fs::create_dir_all(&self.receipts_dir)?;
        Ok(())
    }

    /// Build the engine config for the OCR layer.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            language: self.ocr.language.clone(),
            psm: self.ocr.psm,
            model_dir: self.ocr.model_dir.as_ref().map(PathBuf::from),
        }
    }
}

/// OCR section of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrFileConfig {
    /// Tesseract language code.
    #[serde(default = "default_language")]
    pub language: String,
    /// Tesseract page segmentation mode.
    #[serde(default = "default_psm")]
    pub psm: u32,
    /// PDF rasterization DPI.
    #[serde(default = "default_raster_dpi")]
    pub raster_dpi: u32,
    /// Neural OCR model directory override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_dir: Option<String>,
}

fn default_language() -> String {
    "jpn".to_string()
}
fn default_psm() -> u32 {
    6
}
fn default_raster_dpi() -> u32 {
    300
}

impl Default for OcrFileConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            psm: default_psm(),
            raster_dpi: default_raster_dpi(),
            model_dir: None,
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// OCR engine settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr: Option<OcrFileConfig>,
    /// Language model settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<GeminiConfig>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a specific file path.
    /// Supports TOML, YAML, and JSON based on file extension.
    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

        let mut config: Config = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e))?,
            "json" => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
            _ => toml::from_str(&contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Resolve a path that may be relative to the config file.
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to the config file location
    fn resolve_path(&self, path_str: &str) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            return path.to_path_buf();
        }
        let base = self
            .source_path
            .as_ref()
            .and_then(|p| p.parent())
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        base.join(path)
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir);
            settings.receipts_dir = settings.data_dir.join(RECEIPTS_SUBDIR);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref ocr) = self.ocr {
            settings.ocr = ocr.clone();
        }
        if let Some(ref llm) = self.llm {
            // The API key never comes from the file; keep the env value.
            let api_key = settings.llm.api_key.take();
            settings.llm = llm.clone();
            settings.llm.api_key = api_key;
        }
    }
}

/// Look for a config file next to the data directory.
fn find_config_next_to_data(data_dir: &Path) -> Option<PathBuf> {
    let extensions = ["toml", "yaml", "yml", "json"];
    let basenames = ["keihi", "config"];

    for basename in basenames {
        for ext in extensions {
            let path = data_dir.join(format!("{}.{}", basename, ext));
            if path.exists() {
                return Some(path);
            }
        }
    }
    None
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Data directory override (--data-dir flag).
    pub data_dir: Option<PathBuf>,
}

/// Load settings with explicit options.
pub fn load_settings(options: LoadOptions) -> Settings {
    let mut settings = Settings::default();

    // KEIHI_DATA_DIR env var, then --data-dir flag
    let data_dir_override = options.data_dir.clone().or_else(|| {
        std::env::var("KEIHI_DATA_DIR")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| PathBuf::from(shellexpand::tilde(&s).as_ref()))
    });

    // Config file: explicit flag first, then next to the data dir
    let config = if let Some(ref path) = options.config_path {
        match Config::load_from_path(path) {
            Ok(c) => Some(c),
            Err(e) => {
                tracing::warn!("Ignoring config {}: {}", path.display(), e);
                None
            }
        }
    } else {
        let search_dir = data_dir_override
            .clone()
            .unwrap_or_else(|| settings.data_dir.clone());
        find_config_next_to_data(&search_dir).and_then(|path| {
            tracing::debug!("Found config: {}", path.display());
            Config::load_from_path(&path).ok()
        })
    };

    if let Some(config) = config {
        config.apply_to_settings(&mut settings);
    }

    // Flag/env data dir takes precedence over the config file
    if let Some(data_dir) = data_dir_override {
        settings.data_dir = data_dir;
        settings.receipts_dir = settings.data_dir.join(RECEIPTS_SUBDIR);
    }

    settings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.database_filename, DEFAULT_DATABASE_FILENAME);
        assert!(settings.receipts_dir.ends_with(RECEIPTS_SUBDIR));
        assert_eq!(settings.ocr.language, "jpn");
        assert_eq!(settings.ocr.psm, 6);
    }

    #[test]
    fn test_load_toml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keihi.toml");
        std::fs::write(
            &path,
            r#"
database = "expenses.db"

[ocr]
language = "jpn+eng"
raster_dpi = 400

[llm]
model = "gemini-1.5-pro"
timeout_secs = 90
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings);

        assert_eq!(settings.database_filename, "expenses.db");
        assert_eq!(settings.ocr.language, "jpn+eng");
        assert_eq!(settings.ocr.raster_dpi, 400);
        assert_eq!(settings.ocr.psm, 6);
        assert_eq!(settings.llm.model, "gemini-1.5-pro");
        assert_eq!(settings.llm.timeout_secs, 90);
    }

    #[test]
    fn test_config_relative_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keihi.toml");
        std::fs::write(&path, "data_dir = \"expenses\"\n").unwrap();

        let config = Config::load_from_path(&path).unwrap();
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings);

        assert_eq!(settings.data_dir, dir.path().join("expenses"));
    }

    #[test]
    fn test_api_key_never_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keihi.json");
        std::fs::write(&path, r#"{"llm": {"api_key": "from-file", "model": "m"}}"#).unwrap();

        let config = Config::load_from_path(&path).unwrap();
        let mut settings = Settings::default();
        settings.llm.api_key = Some("from-env".to_string());
        config.apply_to_settings(&mut settings);

        assert_eq!(settings.llm.api_key.as_deref(), Some("from-env"));
        assert_eq!(settings.llm.model, "m");
    }
}
