//! Binding configuration errors.
//!
//! All variants are raised at binding construction, never at runtime
//! thereafter; runtime failures are storage errors and propagate as
//! [`record_store::RecordStoreError`] through the triggering operation.

use schema::{AttributeName, RecordType, SchemaError};
use thiserror::Error;

/// Errors raised while constructing a counter binding.
#[derive(Debug, Error)]
pub enum BindingError {
    /// The foreign field is declared but is neither a direct nor a
    /// polymorphic reference.
    #[error("{attribute} on {child_type} should be a reference or polymorphic reference field")]
    NotAReference {
        child_type: RecordType,
        attribute: AttributeName,
    },

    /// A polymorphic reference cannot infer its parent type; the caller
    /// must supply one explicitly.
    #[error(
        "{attribute} on {child_type} is a polymorphic reference so it needs an explicit parent type"
    )]
    MissingParentType {
        child_type: RecordType,
        attribute: AttributeName,
    },

    /// The named counter attribute is not declared with the counter kind
    /// on the parent type.
    #[error("{attribute} should be a counter field on {parent_type}")]
    NotACounter {
        parent_type: RecordType,
        attribute: AttributeName,
    },

    /// A named record type or attribute is not declared at all.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),
}

/// Result type for binding construction.
pub type Result<T> = std::result::Result<T, BindingError>;
