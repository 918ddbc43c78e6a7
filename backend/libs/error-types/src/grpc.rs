//! gRPC-specific error handling
//!
//! Metadata helpers for consistent gRPC error responses.

use tonic::metadata::MetadataValue;
use tonic::Status;

/// Extension trait for adding metadata to gRPC Status
pub trait StatusExt {
    /// Add error code for client handling
    fn with_error_code(self, code: &str) -> Self;
}

impl StatusExt for Status {
    fn with_error_code(mut self, code: &str) -> Self {
        if let Ok(value) = MetadataValue::try_from(code) {
            self.metadata_mut().insert("x-error-code", value);
        }
        self
    }
}
