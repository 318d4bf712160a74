//! Dynamic record state: a primary key plus a map of attribute values.

use std::collections::HashMap;

use common::RecordId;
use schema::{AttributeName, RecordType};
use serde::{Deserialize, Serialize};

/// Runtime value of a persisted attribute.
///
/// Serialized untagged so values round-trip through JSON storage as plain
/// scalars. Variant order matters for deserialization: a UUID string
/// becomes an [`AttributeValue::Id`], any other string falls through to
/// [`AttributeValue::Text`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// An explicit null.
    Null,

    /// A boolean value.
    Boolean(bool),

    /// An integer value, including counter storage.
    Integer(i64),

    /// A reference to another record.
    Id(RecordId),

    /// A text value.
    Text(String),
}

impl AttributeValue {
    /// Returns the integer value, if this is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the boolean value, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the referenced record id, if this is a reference.
    pub fn as_id(&self) -> Option<RecordId> {
        match self {
            AttributeValue::Id(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the text value, if this is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Returns true if this is the null value.
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Integer(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Boolean(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<RecordId> for AttributeValue {
    fn from(id: RecordId) -> Self {
        AttributeValue::Id(id)
    }
}

/// One persisted record: its type, primary key, and attribute values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Primary key.
    pub id: RecordId,

    /// The record type this row belongs to.
    pub record_type: RecordType,

    /// Attribute values keyed by declared name.
    pub attributes: HashMap<AttributeName, AttributeValue>,
}

impl Record {
    /// Creates an empty record of the given type with a fresh id.
    pub fn new(record_type: impl Into<RecordType>) -> Self {
        Self {
            id: RecordId::new(),
            record_type: record_type.into(),
            attributes: HashMap::new(),
        }
    }

    /// Creates an empty record with an explicit id.
    pub fn with_id(record_type: impl Into<RecordType>, id: RecordId) -> Self {
        Self {
            id,
            record_type: record_type.into(),
            attributes: HashMap::new(),
        }
    }

    /// Returns the value of an attribute, if present.
    pub fn attribute(&self, name: &AttributeName) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Sets an attribute value.
    pub fn set(&mut self, name: impl Into<AttributeName>, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Sets an attribute value, consuming and returning the record.
    pub fn with(mut self, name: impl Into<AttributeName>, value: impl Into<AttributeValue>) -> Self {
        self.set(name, value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_chains_attributes() {
        let thread_id = RecordId::new();
        let record = Record::new("comment")
            .with("thread", thread_id)
            .with("approved", true)
            .with("body", "hello");

        assert_eq!(
            record.attribute(&AttributeName::new("thread")).unwrap().as_id(),
            Some(thread_id)
        );
        assert_eq!(
            record.attribute(&AttributeName::new("approved")).unwrap().as_bool(),
            Some(true)
        );
        assert_eq!(
            record.attribute(&AttributeName::new("body")).unwrap().as_str(),
            Some("hello")
        );
        assert!(record.attribute(&AttributeName::new("missing")).is_none());
    }

    #[test]
    fn attribute_value_json_scalars() {
        assert_eq!(
            serde_json::to_value(AttributeValue::Integer(3)).unwrap(),
            serde_json::json!(3)
        );
        assert_eq!(
            serde_json::to_value(AttributeValue::Boolean(true)).unwrap(),
            serde_json::json!(true)
        );
        assert_eq!(
            serde_json::to_value(AttributeValue::Null).unwrap(),
            serde_json::Value::Null
        );
    }

    #[test]
    fn id_values_roundtrip_as_uuid_strings() {
        let id = RecordId::new();
        let json = serde_json::to_value(AttributeValue::Id(id)).unwrap();
        assert!(json.is_string());

        let back: AttributeValue = serde_json::from_value(json).unwrap();
        assert_eq!(back.as_id(), Some(id));
    }

    #[test]
    fn non_uuid_strings_deserialize_as_text() {
        let back: AttributeValue = serde_json::from_value(serde_json::json!("hello")).unwrap();
        assert_eq!(back.as_str(), Some("hello"));
    }

    #[test]
    fn attributes_map_roundtrip() {
        let record = Record::new("comment")
            .with("thread", RecordId::new())
            .with("score", 7_i64);

        let json = serde_json::to_value(&record.attributes).unwrap();
        let back: HashMap<AttributeName, AttributeValue> =
            serde_json::from_value(json).unwrap();
        assert_eq!(back, record.attributes);
    }
}
