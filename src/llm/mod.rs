//! Field structuring via a generative language model.
//!
//! Raw OCR text goes in, candidate receipt fields come out. The prompt,
//! the Gemini client, and the response parsing live here; validation of
//! the candidate fields is the validator's job.

mod client;
mod prompts;
mod structurer;

pub use client::{GeminiClient, GeminiConfig, StructuringError};
pub use prompts::EXTRACTION_PROMPT;
pub use structurer::{coerce_amount, extract_json_payload, parse_response, GeminiStructurer, Structurer};
