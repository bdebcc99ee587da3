//! End-to-end pipeline tests with stubbed OCR engines and a stubbed
//! structuring service replaying canned model responses through the real
//! response parser.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use keihi::llm::{parse_response, Structurer, StructuringError};
use keihi::models::ReceiptDraft;
use keihi::ocr::{
    DocumentLoader, EngineKind, EngineOutput, OcrEngine, OcrEngineError, TextExtractor,
};
use keihi::repository::ReceiptRepository;
use keihi::services::{ProcessError, ReceiptPipeline};

/// OCR engine stub returning fixed text.
struct FixedEngine {
    kind: EngineKind,
    text: &'static str,
}

impl OcrEngine for FixedEngine {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn is_available(&self) -> bool {
        true
    }

    fn availability_hint(&self) -> String {
        "stub".to_string()
    }

    fn recognize(&self, _image_path: &Path) -> Result<EngineOutput, OcrEngineError> {
        Ok(EngineOutput {
            text: self.text.to_string(),
            engine: self.kind,
            processing_time_ms: 0,
        })
    }
}

/// OCR engine stub that always fails.
struct FailingEngine;

impl OcrEngine for FailingEngine {
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
        Err(OcrEngineError::RecognitionFailed("model load failed".to_string()))
    }
}

/// Structuring stub replaying a canned model response through the real
/// response parser, recording whether it was called.
struct CannedStructurer {
    response: &'static str,
    called: Arc<AtomicBool>,
}

impl CannedStructurer {
    fn new(response: &'static str) -> (Self, Arc<AtomicBool>) {
        let called = Arc::new(AtomicBool::new(false));
        (
            Self {
                response,
                called: called.clone(),
            },
            called,
        )
    }
}

#[async_trait]
impl Structurer for CannedStructurer {
    async fn structure(&self, _raw_text: &str) -> Result<ReceiptDraft, StructuringError> {
        self.called.store(true, Ordering::SeqCst);
        parse_response(self.response)
    }
}

/// Write a small valid PNG to use as a receipt image.
fn sample_image(dir: &Path) -> PathBuf {
    let path = dir.join("receipt.png");
    image::RgbImage::new(80, 100).save(&path).unwrap();
    path
}

fn dual_engines() -> TextExtractor {
    TextExtractor::new(vec![
        Box::new(FixedEngine {
            kind: EngineKind::Tesseract,
            text: "2024年1月15日 テスト商店 1,000円 テスト購入",
        }),
        Box::new(FixedEngine {
            kind: EngineKind::Neural,
            text: "2024年1月15日\nテスト商店\n1,000円 テスト購入",
        }),
    ])
}

const GOLDEN_RESPONSE: &str = r#"抽出結果は以下の通りです。
```json
{
  "date": "2024-01-15",
  "vendor": "テスト商店",
  "amount": "1,000円",
  "description": "テスト購入",
  "issuer": "テスト商店"
}
```"#;

#[tokio::test]
async fn golden_receipt_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let image = sample_image(dir.path());

    let (structurer, _) = CannedStructurer::new(GOLDEN_RESPONSE);
    let pipeline = ReceiptPipeline::new(
        DocumentLoader::new(),
        dual_engines(),
        Box::new(structurer),
    );

    let processed = pipeline.process_document(&image).await.unwrap();

    let receipt = &processed.receipt;
    assert_eq!(receipt.date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    assert_eq!(receipt.vendor, "テスト商店");
    assert_eq!(receipt.amount, 1000.0);
    assert_eq!(receipt.description, "テスト購入");
    assert_eq!(receipt.issuer, "テスト商店");
    assert_eq!(receipt.recipient, None);
    assert_eq!(receipt.has_revenue_stamp, None);

    // Both engine outputs are fused, engine 1 first
    assert_eq!(processed.page_count, 1);
    let tesseract_pos = processed.raw_text.find("1,000円 テスト購入").unwrap();
    assert!(processed.raw_text.matches("テスト商店").count() >= 2);
    assert!(tesseract_pos < processed.raw_text.rfind("テスト商店").unwrap());

    // The record carries the source path and raw text for review
    assert_eq!(receipt.file_path.as_deref(), Some(image.as_path()));
    assert_eq!(receipt.ocr_text.as_deref(), Some(processed.raw_text.as_str()));

    // And it round-trips through storage
    let repo = ReceiptRepository::new(&dir.path().join("test.db")).unwrap();
    let id = repo.add(receipt).unwrap();
    let loaded = repo.get(id).unwrap().unwrap();
    assert_eq!(loaded.vendor, receipt.vendor);
    assert_eq!(loaded.has_revenue_stamp, None);
}

#[tokio::test]
async fn prose_response_fails_parse_and_nothing_is_stored() {
    let dir = tempfile::tempdir().unwrap();
    let image = sample_image(dir.path());

    let (structurer, _) =
        CannedStructurer::new("申し訳ありませんが、このテキストは領収書として読み取れません。");
    let pipeline = ReceiptPipeline::new(
        DocumentLoader::new(),
        dual_engines(),
        Box::new(structurer),
    );

    let err = pipeline.process_document(&image).await.unwrap_err();
    match &err {
        ProcessError::Structuring(e) => {
            assert!(!e.is_retryable());
            assert!(matches!(e, StructuringError::Parse { .. }));
        }
        other => panic!("expected structuring error, got {:?}", other),
    }
    assert!(!err.is_retryable());

    // A failed document never reaches storage
    let repo = ReceiptRepository::new(&dir.path().join("test.db")).unwrap();
    assert_eq!(repo.count().unwrap(), 0);
}

#[tokio::test]
async fn load_failure_skips_extraction_and_structuring() {
    let (structurer, called) = CannedStructurer::new(GOLDEN_RESPONSE);
    let pipeline = ReceiptPipeline::new(
        DocumentLoader::new(),
        dual_engines(),
        Box::new(structurer),
    );

    let err = pipeline
        .process_document(Path::new("/nonexistent/receipt.png"))
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessError::Load(_)));
    assert!(!called.load(Ordering::SeqCst));
}

#[tokio::test]
async fn engine_failure_aborts_before_structuring() {
    let dir = tempfile::tempdir().unwrap();
    let image = sample_image(dir.path());

    let (structurer, called) = CannedStructurer::new(GOLDEN_RESPONSE);
    let extractor = TextExtractor::new(vec![
        Box::new(FixedEngine {
            kind: EngineKind::Tesseract,
            text: "partial page text",
        }),
        Box::new(FailingEngine),
    ]);
    let pipeline = ReceiptPipeline::new(DocumentLoader::new(), extractor, Box::new(structurer));

    let err = pipeline.process_document(&image).await.unwrap_err();
    assert!(matches!(err, ProcessError::Ocr(_)));
    assert!(!called.load(Ordering::SeqCst));
}

#[tokio::test]
async fn missing_required_fields_reported_together() {
    let dir = tempfile::tempdir().unwrap();
    let image = sample_image(dir.path());

    // vendor and issuer missing from the model response
    let (structurer, _) = CannedStructurer::new(
        r#"{"date": "2024-01-15", "amount": 1000, "description": "備品"}"#,
    );
    let pipeline = ReceiptPipeline::new(
        DocumentLoader::new(),
        dual_engines(),
        Box::new(structurer),
    );

    let err = pipeline.process_document(&image).await.unwrap_err();
    match err {
        ProcessError::Validation(e) => {
            assert!(e.names_field("vendor"));
            assert!(e.names_field("issuer"));
            assert!(!e.names_field("date"));
            assert!(!e.names_field("amount"));
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[tokio::test]
async fn explicit_stamp_false_survives_to_record() {
    let dir = tempfile::tempdir().unwrap();
    let image = sample_image(dir.path());

    let (structurer, _) = CannedStructurer::new(
        r#"{"date": "2024-02-01", "vendor": "印紙堂", "amount": 60000,
            "description": "機材", "issuer": "印紙堂", "has_revenue_stamp": false}"#,
    );
    let pipeline = ReceiptPipeline::new(
        DocumentLoader::new(),
        dual_engines(),
        Box::new(structurer),
    );

    let processed = pipeline.process_document(&image).await.unwrap();
    assert_eq!(processed.receipt.has_revenue_stamp, Some(false));
}
