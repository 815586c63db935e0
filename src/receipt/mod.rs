//! Receipt review: text extraction, rule evaluation and the audit trail.

pub mod audit;
pub mod ocr;
pub mod processor;
pub mod rules;
pub mod types;

pub use audit::AuditLogger;
pub use ocr::{TesseractExtractor, TextExtractor};
pub use processor::ReceiptProcessor;
pub use rules::{ValidationEngine, ValidationRule};
pub use types::ValidationResult;
