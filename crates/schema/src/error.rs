//! Schema error types.

use thiserror::Error;

use crate::attribute::{AttributeName, RecordType};

/// Errors raised when resolving declared schema entries.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The record type was never registered.
    #[error("Unknown record type: {0}")]
    UnknownRecordType(RecordType),

    /// The attribute is not declared on the record type.
    #[error("Unknown attribute {attribute} on record type {record_type}")]
    UnknownAttribute {
        record_type: RecordType,
        attribute: AttributeName,
    },
}

/// Result type for schema operations.
pub type Result<T> = std::result::Result<T, SchemaError>;
