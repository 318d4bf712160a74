use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::RecordId;
use schema::{AttributeName, RecordType, Schema, SchemaError};
use tokio::sync::RwLock;

use crate::{
    ChangeEvent, ChangeHub, Result,
    record::{AttributeValue, Record},
    store::{RecordStore, RecordStream, fill_counter_attributes},
};

/// In-memory record store implementation for testing.
///
/// This implementation stores all rows in memory and provides the same
/// interface and change-notification behavior as the PostgreSQL
/// implementation.
#[derive(Clone)]
pub struct InMemoryRecordStore {
    schema: Arc<Schema>,
    hub: Arc<ChangeHub>,
    rows: Arc<RwLock<HashMap<RecordType, HashMap<RecordId, Record>>>>,
}

impl InMemoryRecordStore {
    /// Creates an empty store over the given schema and hub.
    pub fn new(schema: Arc<Schema>, hub: Arc<ChangeHub>) -> Self {
        Self {
            schema,
            hub,
            rows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the hub this store dispatches change events through.
    pub fn hub(&self) -> &Arc<ChangeHub> {
        &self.hub
    }

    /// Returns the number of rows stored for a record type.
    pub async fn record_count(&self, record_type: &RecordType) -> usize {
        self.rows
            .read()
            .await
            .get(record_type)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    /// Clears all rows.
    pub async fn clear(&self) {
        self.rows.write().await.clear();
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn save(&self, record: Record) -> Result<()> {
        if !self.schema.contains(&record.record_type) {
            return Err(SchemaError::UnknownRecordType(record.record_type.clone()).into());
        }

        let mut record = record;

        // The write lock is released before dispatching so listeners can
        // re-enter the store.
        let event = {
            let mut rows = self.rows.write().await;
            let table = rows.entry(record.record_type.clone()).or_default();
            let previous = table.get(&record.id).cloned();
            fill_counter_attributes(&self.schema, &mut record, previous.as_ref());
            table.insert(record.id, record.clone());
            match previous {
                None => ChangeEvent::created(record),
                Some(previous) => ChangeEvent::updated(previous, record),
            }
        };

        self.hub.dispatch(&event).await
    }

    async fn delete(&self, record_type: &RecordType, id: RecordId) -> Result<bool> {
        let removed = {
            let mut rows = self.rows.write().await;
            rows.get_mut(record_type).and_then(|table| table.remove(&id))
        };

        match removed {
            Some(previous) => {
                self.hub.dispatch(&ChangeEvent::deleted(previous)).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, record_type: &RecordType, id: RecordId) -> Result<Option<Record>> {
        let rows = self.rows.read().await;
        Ok(rows.get(record_type).and_then(|table| table.get(&id)).cloned())
    }

    async fn adjust(
        &self,
        record_type: &RecordType,
        id: RecordId,
        attribute: &AttributeName,
        delta: i64,
    ) -> Result<u64> {
        let mut rows = self.rows.write().await;
        let Some(row) = rows.get_mut(record_type).and_then(|table| table.get_mut(&id)) else {
            return Ok(0);
        };

        let current = row
            .attribute(attribute)
            .and_then(AttributeValue::as_i64)
            .unwrap_or(0);
        row.attributes
            .insert(attribute.clone(), AttributeValue::Integer(current + delta));
        Ok(1)
    }

    async fn set_value(
        &self,
        record_type: &RecordType,
        id: RecordId,
        attribute: &AttributeName,
        value: AttributeValue,
    ) -> Result<u64> {
        let mut rows = self.rows.write().await;
        let Some(row) = rows.get_mut(record_type).and_then(|table| table.get_mut(&id)) else {
            return Ok(0);
        };

        row.attributes.insert(attribute.clone(), value);
        Ok(1)
    }

    async fn stream_records(&self, record_type: &RecordType) -> Result<RecordStream> {
        use futures_util::stream;

        let rows = self.rows.read().await;
        let mut records: Vec<_> = rows
            .get(record_type)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default();
        records.sort_by_key(|record| record.id.as_uuid());

        let stream = stream::iter(records.into_iter().map(Ok));
        Ok(Box::pin(stream))
    }
}
