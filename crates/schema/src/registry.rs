//! The schema lookup table, populated once at startup.

use std::collections::HashMap;

use crate::attribute::{AttributeDescriptor, AttributeKind, AttributeName, RecordType};
use crate::error::{Result, SchemaError};

/// Declared attributes for every registered record type.
///
/// A `Schema` is built once at application startup and never mutated
/// afterwards; stores and counter bindings share it behind an `Arc`.
/// Callers resolve declared descriptors by name and get a typed error if
/// one is absent.
#[derive(Debug, Default)]
pub struct Schema {
    types: HashMap<RecordType, HashMap<AttributeName, AttributeDescriptor>>,
}

impl Schema {
    /// Creates a new schema builder.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Returns true if the record type is registered.
    pub fn contains(&self, record_type: &RecordType) -> bool {
        self.types.contains_key(record_type)
    }

    /// Resolves a declared attribute by name on a record type.
    pub fn attribute(
        &self,
        record_type: &RecordType,
        name: &AttributeName,
    ) -> Result<&AttributeDescriptor> {
        let attributes = self
            .types
            .get(record_type)
            .ok_or_else(|| SchemaError::UnknownRecordType(record_type.clone()))?;
        attributes
            .get(name)
            .ok_or_else(|| SchemaError::UnknownAttribute {
                record_type: record_type.clone(),
                attribute: name.clone(),
            })
    }

    /// Iterates the declared attributes of a record type.
    pub fn attributes(
        &self,
        record_type: &RecordType,
    ) -> Result<impl Iterator<Item = &AttributeDescriptor>> {
        let attributes = self
            .types
            .get(record_type)
            .ok_or_else(|| SchemaError::UnknownRecordType(record_type.clone()))?;
        Ok(attributes.values())
    }

    /// Returns the declared default for a counter attribute, or None if
    /// the attribute is absent or not a counter.
    pub fn counter_default(&self, record_type: &RecordType, name: &AttributeName) -> Option<i64> {
        let descriptor = self.types.get(record_type)?.get(name)?;
        match descriptor.kind {
            AttributeKind::Counter { default } => Some(default),
            _ => None,
        }
    }
}

/// Builder for a [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    types: HashMap<RecordType, HashMap<AttributeName, AttributeDescriptor>>,
}

impl SchemaBuilder {
    /// Registers a record type definition. Re-registering a type replaces
    /// its previous definition.
    pub fn record_type(mut self, def: RecordTypeDef) -> Self {
        let attributes = def
            .attributes
            .into_iter()
            .map(|descriptor| (descriptor.name.clone(), descriptor))
            .collect();
        self.types.insert(def.name, attributes);
        self
    }

    /// Builds the schema.
    pub fn build(self) -> Schema {
        Schema { types: self.types }
    }
}

/// Definition of one record type: its name plus declared attributes.
#[derive(Debug)]
pub struct RecordTypeDef {
    name: RecordType,
    attributes: Vec<AttributeDescriptor>,
}

impl RecordTypeDef {
    /// Starts a definition for the named record type.
    pub fn new(name: impl Into<RecordType>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    fn attribute(mut self, name: impl Into<AttributeName>, kind: AttributeKind) -> Self {
        self.attributes.push(AttributeDescriptor::new(name, kind));
        self
    }

    /// Declares a counter attribute with the default of zero.
    pub fn counter(self, name: impl Into<AttributeName>) -> Self {
        self.counter_with_default(name, 0)
    }

    /// Declares a counter attribute with an explicit default.
    pub fn counter_with_default(self, name: impl Into<AttributeName>, default: i64) -> Self {
        self.attribute(name, AttributeKind::Counter { default })
    }

    /// Declares a plain integer attribute.
    pub fn integer(self, name: impl Into<AttributeName>) -> Self {
        self.attribute(name, AttributeKind::Integer)
    }

    /// Declares a plain text attribute.
    pub fn text(self, name: impl Into<AttributeName>) -> Self {
        self.attribute(name, AttributeKind::Text)
    }

    /// Declares a plain boolean attribute.
    pub fn boolean(self, name: impl Into<AttributeName>) -> Self {
        self.attribute(name, AttributeKind::Boolean)
    }

    /// Declares an attribute holding a record id with no fixed target type.
    pub fn record_ref(self, name: impl Into<AttributeName>) -> Self {
        self.attribute(name, AttributeKind::RecordRef)
    }

    /// Declares a direct typed reference to another record type.
    pub fn reference(
        self,
        name: impl Into<AttributeName>,
        target: impl Into<RecordType>,
    ) -> Self {
        self.attribute(
            name,
            AttributeKind::Reference {
                target: target.into(),
            },
        )
    }

    /// Declares a polymorphic reference whose parent id is stored in
    /// `key_attribute` on the same record type.
    pub fn polymorphic_reference(
        self,
        name: impl Into<AttributeName>,
        key_attribute: impl Into<AttributeName>,
    ) -> Self {
        self.attribute(
            name,
            AttributeKind::PolymorphicReference {
                key_attribute: key_attribute.into(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forum_schema() -> Schema {
        Schema::builder()
            .record_type(RecordTypeDef::new("thread").counter("comment_count"))
            .record_type(
                RecordTypeDef::new("comment")
                    .reference("thread", "thread")
                    .boolean("approved"),
            )
            .build()
    }

    #[test]
    fn resolves_declared_attribute() {
        let schema = forum_schema();
        let descriptor = schema
            .attribute(&RecordType::new("comment"), &AttributeName::new("thread"))
            .unwrap();
        assert_eq!(
            descriptor.kind,
            AttributeKind::Reference {
                target: RecordType::new("thread")
            }
        );
    }

    #[test]
    fn unknown_record_type_fails() {
        let schema = forum_schema();
        let err = schema
            .attribute(&RecordType::new("missing"), &AttributeName::new("thread"))
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownRecordType(_)));
    }

    #[test]
    fn unknown_attribute_fails() {
        let schema = forum_schema();
        let err = schema
            .attribute(&RecordType::new("comment"), &AttributeName::new("missing"))
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownAttribute { .. }));
    }

    #[test]
    fn counter_default_resolves_only_counters() {
        let schema = Schema::builder()
            .record_type(
                RecordTypeDef::new("thread")
                    .counter_with_default("comment_count", 5)
                    .integer("views"),
            )
            .build();

        let thread = RecordType::new("thread");
        assert_eq!(
            schema.counter_default(&thread, &AttributeName::new("comment_count")),
            Some(5)
        );
        assert_eq!(
            schema.counter_default(&thread, &AttributeName::new("views")),
            None
        );
        assert_eq!(
            schema.counter_default(&thread, &AttributeName::new("missing")),
            None
        );
    }

    #[test]
    fn redefining_a_type_replaces_it() {
        let schema = Schema::builder()
            .record_type(RecordTypeDef::new("thread").counter("comment_count"))
            .record_type(RecordTypeDef::new("thread").counter("reply_count"))
            .build();

        let thread = RecordType::new("thread");
        assert!(
            schema
                .attribute(&thread, &AttributeName::new("comment_count"))
                .is_err()
        );
        assert!(
            schema
                .attribute(&thread, &AttributeName::new("reply_count"))
                .is_ok()
        );
    }

    #[test]
    fn attributes_iterates_declarations() {
        let schema = forum_schema();
        let names: Vec<_> = schema
            .attributes(&RecordType::new("comment"))
            .unwrap()
            .map(|d| d.name.as_str().to_string())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"thread".to_string()));
        assert!(names.contains(&"approved".to_string()));
    }
}
