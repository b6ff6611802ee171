//! PII detection and in-place field encryption for JSON documents

pub mod scanner;

pub use scanner::{is_field_wrapper, parse_document, PiiScanner, ScanError, MAX_NESTING_DEPTH};
