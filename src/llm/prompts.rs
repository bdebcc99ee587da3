//! Extraction prompt for the field structuring layer.

/// Prompt for extracting receipt fields from raw OCR text.
///
/// The `{text}` placeholder receives the fused OCR output. The text has been
/// produced by two engines over the same pages, so it contains duplicated and
/// partially conflicting lines; the model is expected to reconcile them.
pub const EXTRACTION_PROMPT: &str = r#"以下は領収書をOCR処理したテキストです。2種類のOCRエンジンの出力を連結しているため、同じ内容が重複したり表記が揺れたりしています。内容を照合し、必要な情報を抽出してJSONオブジェクトのみを返してください。

OCRテキスト:
{text}

抽出する項目:
- date: 取引日付（例: 2024-01-15）
- vendor: 取引先名
- amount: 金額（数値のみ、通貨記号や桁区切りなし）
- description: 取引内容
- issuer: 発行者名
- recipient: 宛名（記載がある場合のみ）
- has_revenue_stamp: 収入印紙の有無（テキストから確認できる場合のみtrue/false、不明な場合はキー自体を省略）

説明文やマークダウンの囲みは不要です。JSONオブジェクトのみを返してください。"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_has_placeholder_and_fields() {
        assert!(EXTRACTION_PROMPT.contains("{text}"));
        for field in [
            "date",
            "vendor",
            "amount",
            "description",
            "issuer",
            "recipient",
            "has_revenue_stamp",
        ] {
            assert!(EXTRACTION_PROMPT.contains(field), "missing field {}", field);
        }
    }
}
