use std::pin::Pin;

use async_trait::async_trait;
use common::RecordId;
use futures_core::Stream;
use schema::{AttributeKind, AttributeName, RecordType, Schema};

use crate::Result;
use crate::record::{AttributeValue, Record};

/// A stream of records.
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<Record>> + Send>>;

/// Core trait for record store implementations.
///
/// A record store persists rows keyed by (record type, id) and notifies
/// registered change listeners once per committed save/delete. All
/// implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Saves a record, inserting or overwriting the row.
    ///
    /// A save of a previously unknown id dispatches a `Created` event; a
    /// save over an existing row captures the prior state and dispatches
    /// `Updated`. Listener errors propagate to the caller. Declared
    /// counter attributes absent from the record default on insert and
    /// keep their stored value on update.
    async fn save(&self, record: Record) -> Result<()>;

    /// Deletes a record if present, dispatching a `Deleted` event carrying
    /// the removed state. Returns false (and dispatches nothing) when the
    /// row does not exist.
    async fn delete(&self, record_type: &RecordType, id: RecordId) -> Result<bool>;

    /// Retrieves a record by primary key.
    async fn get(&self, record_type: &RecordType, id: RecordId) -> Result<Option<Record>>;

    /// Atomically applies `attribute = attribute + delta` to the row
    /// matching the primary key, delegating the read-modify-write to the
    /// storage engine.
    ///
    /// Returns the number of affected rows; 0 when no row matches, which
    /// is not an error. Emits no change event: maintenance writes must not
    /// feed back into the notification mechanism.
    async fn adjust(
        &self,
        record_type: &RecordType,
        id: RecordId,
        attribute: &AttributeName,
        delta: i64,
    ) -> Result<u64>;

    /// Writes a single attribute absolutely on the row matching the
    /// primary key. Returns the number of affected rows. Emits no change
    /// event.
    async fn set_value(
        &self,
        record_type: &RecordType,
        id: RecordId,
        attribute: &AttributeName,
        value: AttributeValue,
    ) -> Result<u64>;

    /// Streams all records of a type, ordered by id.
    async fn stream_records(&self, record_type: &RecordType) -> Result<RecordStream>;
}

/// Extension trait providing convenience methods for record stores.
#[async_trait]
pub trait RecordStoreExt: RecordStore {
    /// Checks if a row exists.
    async fn exists(&self, record_type: &RecordType, id: RecordId) -> Result<bool> {
        Ok(self.get(record_type, id).await?.is_some())
    }

    /// Reads a single integer attribute from a row, if both exist.
    async fn integer_value(
        &self,
        record_type: &RecordType,
        id: RecordId,
        attribute: &AttributeName,
    ) -> Result<Option<i64>> {
        let record = self.get(record_type, id).await?;
        Ok(record.and_then(|r| r.attribute(attribute).and_then(AttributeValue::as_i64)))
    }
}

// Blanket implementation for all RecordStore implementations
impl<T: RecordStore + ?Sized> RecordStoreExt for T {}

/// Fills declared counter attributes that the incoming record does not
/// carry: from the previous row state when updating, from the declared
/// default when inserting. Counter values must never regress to their
/// default just because a save did not mention them.
pub(crate) fn fill_counter_attributes(
    schema: &Schema,
    record: &mut Record,
    previous: Option<&Record>,
) {
    let record_type = record.record_type.clone();
    let Ok(attributes) = schema.attributes(&record_type) else {
        return;
    };

    for descriptor in attributes {
        let AttributeKind::Counter { default } = descriptor.kind else {
            continue;
        };
        if record.attribute(&descriptor.name).is_some() {
            continue;
        }
        let value = previous
            .and_then(|p| p.attribute(&descriptor.name))
            .cloned()
            .unwrap_or(AttributeValue::Integer(default));
        record.attributes.insert(descriptor.name.clone(), value);
    }
}
