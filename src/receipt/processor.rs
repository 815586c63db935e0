//! Receipt processor: extraction, validation and audit for one image.
//!
//! Flow:
//! 1. `TextExtractor::extract()` on the image
//! 2. `ValidationEngine::evaluate()` on the text (or a rejection if extraction failed)
//! 3. `AuditLogger::record()` with the final result, on every path

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::receipt::audit::AuditLogger;
use crate::receipt::ocr::TextExtractor;
use crate::receipt::rules::ValidationEngine;
use crate::receipt::types::ValidationResult;

/// Prefix of the rejection reason when no text could be extracted.
pub const EXTRACTION_FAILED_PREFIX: &str = "OCR processing error";

pub struct ReceiptProcessor {
    extractor: Arc<dyn TextExtractor>,
    engine: ValidationEngine,
    audit: Arc<AuditLogger>,
}

impl ReceiptProcessor {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        engine: ValidationEngine,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            extractor,
            engine,
            audit,
        }
    }

    /// Review the receipt image at `image` submitted by `subject`.
    ///
    /// Never fails: extraction errors become a rejection whose reason carries
    /// the error detail. The caller owns `image` and removes it afterwards.
    pub async fn process(&self, image: &Path, subject: &str) -> ValidationResult {
        info!(subject = %subject, image = %image.display(), "Processing receipt image");

        let result = match self.extractor.extract(image).await {
            Ok(text) => self.engine.evaluate(&text),
            Err(e) => {
                warn!(subject = %subject, error = %e, "Text extraction failed");
                ValidationResult::rejected(format!("{EXTRACTION_FAILED_PREFIX}: {e}"))
            }
        };

        self.audit.record(subject, &result).await;

        info!(
            subject = %subject,
            result = result.label(),
            reason = %result.reason,
            "Receipt reviewed"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Local;
    use tempfile::TempDir;

    use super::*;
    use crate::config::ValidationConfig;
    use crate::error::ExtractionError;
    use crate::receipt::rules::{FORBIDDEN_AMOUNT, MISSING_NAME};

    struct FixedText(String);

    #[async_trait]
    impl TextExtractor for FixedText {
        async fn extract(&self, _image: &Path) -> Result<String, ExtractionError> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    #[async_trait]
    impl TextExtractor for Broken {
        async fn extract(&self, _image: &Path) -> Result<String, ExtractionError> {
            Err(ExtractionError::Other("image is unreadable".into()))
        }
    }

    fn processor(extractor: Arc<dyn TextExtractor>, dir: &TempDir) -> ReceiptProcessor {
        let engine = ValidationEngine::from_config(&ValidationConfig::default()).unwrap();
        ReceiptProcessor::new(extractor, engine, Arc::new(AuditLogger::new(dir.path())))
    }

    fn today_receipt() -> String {
        format!(
            "Angel Vilca\noperación: AB12345\n{}",
            Local::now().format("%d/%m/%Y")
        )
    }

    fn audit_log(dir: &TempDir) -> String {
        let file = dir
            .path()
            .join(format!("{}.txt", Local::now().format("%Y-%m-%d")));
        std::fs::read_to_string(file).unwrap()
    }

    #[tokio::test]
    async fn accepted_receipt_is_audited() {
        let dir = TempDir::new().unwrap();
        let p = processor(Arc::new(FixedText(today_receipt())), &dir);

        let result = p.process(Path::new("receipt.png"), "Ana").await;
        assert!(result.accepted, "{}", result.reason);

        let log = audit_log(&dir);
        assert!(log.contains("Contact: Ana"));
        assert!(log.contains("Result: Accepted"));
    }

    #[tokio::test]
    async fn rule_failure_is_audited_with_reason() {
        let dir = TempDir::new().unwrap();
        let p = processor(Arc::new(FixedText("operación: AB12345".into())), &dir);

        let result = p.process(Path::new("receipt.png"), "Luis").await;
        assert_eq!(result, ValidationResult::rejected(MISSING_NAME));
        assert!(audit_log(&dir).contains("Reason: missing name"));
    }

    #[tokio::test]
    async fn forbidden_amount_through_processor() {
        let dir = TempDir::new().unwrap();
        let text = format!("{} S/ 500.00", today_receipt());
        let p = processor(Arc::new(FixedText(text)), &dir);

        let result = p.process(Path::new("receipt.png"), "Ana").await;
        assert_eq!(result.reason, FORBIDDEN_AMOUNT);
    }

    #[tokio::test]
    async fn extraction_failure_becomes_rejection() {
        let dir = TempDir::new().unwrap();
        let p = processor(Arc::new(Broken), &dir);

        let result = p.process(Path::new("receipt.png"), "Ana").await;
        assert!(!result.accepted);
        assert!(result.reason.starts_with(EXTRACTION_FAILED_PREFIX));
        assert!(result.reason.contains("image is unreadable"));

        let log = audit_log(&dir);
        assert!(log.contains("Result: Rejected"));
        assert!(log.contains("image is unreadable"));
    }

    #[tokio::test]
    async fn empty_text_is_rejected_not_an_error() {
        let dir = TempDir::new().unwrap();
        let p = processor(Arc::new(FixedText(String::new())), &dir);
        let result = p.process(Path::new("receipt.png"), "Ana").await;
        assert_eq!(result.reason, MISSING_NAME);
    }
}
