//! Record type names, attribute names, and declared attribute kinds.

use serde::{Deserialize, Serialize};

/// Name of a persisted record type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordType(String);

impl RecordType {
    /// Creates a record type name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecordType {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for RecordType {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Name of a declared attribute on a record type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeName(String);

impl AttributeName {
    /// Creates an attribute name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AttributeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AttributeName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for AttributeName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Declared kind of a persisted attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeKind {
    /// A persisted integer maintained by a counter binding rather than by
    /// direct application writes. The default is applied when a row is
    /// saved without the attribute present.
    Counter { default: i64 },

    /// A plain persisted integer.
    Integer,

    /// A plain persisted text value.
    Text,

    /// A plain persisted boolean.
    Boolean,

    /// A record id whose target type is not fixed at schema-definition
    /// time. This is the concrete key attribute behind a polymorphic
    /// reference.
    RecordRef,

    /// A direct typed reference to another record type.
    Reference { target: RecordType },

    /// A reference whose target type is resolved at runtime. The parent id
    /// itself is stored in `key_attribute`, which must be declared on the
    /// same record type.
    PolymorphicReference { key_attribute: AttributeName },
}

impl AttributeKind {
    /// Returns true if this is the counter kind.
    pub fn is_counter(&self) -> bool {
        matches!(self, AttributeKind::Counter { .. })
    }

    /// Returns true if this kind can anchor a counter binding, i.e. it is
    /// either a direct or a polymorphic reference.
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            AttributeKind::Reference { .. } | AttributeKind::PolymorphicReference { .. }
        )
    }
}

/// A declared attribute: its name plus its kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    /// The declared attribute name.
    pub name: AttributeName,

    /// The declared kind.
    pub kind: AttributeKind,
}

impl AttributeDescriptor {
    /// Creates a descriptor.
    pub fn new(name: impl Into<AttributeName>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Returns true if this attribute is declared as a counter.
    pub fn is_counter(&self) -> bool {
        self.kind.is_counter()
    }
}
