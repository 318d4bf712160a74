//! Schema descriptors for persisted record types.
//!
//! This crate provides the schema-definition side of the record layer:
//! - [`RecordType`] and [`AttributeName`] name types
//! - [`AttributeKind`] and [`AttributeDescriptor`] for declared attributes,
//!   including the counter kind and both reference kinds
//! - [`Schema`], an attribute lookup table populated once at startup

pub mod attribute;
pub mod error;
pub mod registry;

pub use attribute::{AttributeDescriptor, AttributeKind, AttributeName, RecordType};
pub use error::{Result, SchemaError};
pub use registry::{RecordTypeDef, Schema, SchemaBuilder};
