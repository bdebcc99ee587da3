//! keihi - receipt OCR extraction and expense database.
//!
//! Ingests scanned or photographed receipts, extracts structured expense
//! records through a dual-engine OCR pass fused by a language model, stores
//! them in SQLite, and produces monthly/annual spend reports.

pub mod cli;
pub mod config;
pub mod llm;
pub mod models;
pub mod ocr;
pub mod repository;
pub mod services;
pub mod utils;
pub mod validate;
