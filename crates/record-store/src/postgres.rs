use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::RecordId;
use schema::{AttributeName, RecordType, Schema, SchemaError};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    ChangeEvent, ChangeHub, RecordStoreError, Result, StoreConfig,
    record::{AttributeValue, Record},
    store::{RecordStore, RecordStream, fill_counter_attributes},
};

/// PostgreSQL-backed record store implementation.
///
/// Rows live in a single `records` table keyed by (record_type, id) with
/// attribute values in a JSONB column. The relative update is evaluated
/// server-side in one statement, which is what counter correctness under
/// concurrent writers rests on.
#[derive(Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
    schema: Arc<Schema>,
    hub: Arc<ChangeHub>,
}

impl PostgresRecordStore {
    /// Creates a new PostgreSQL record store over an existing pool.
    pub fn new(pool: PgPool, schema: Arc<Schema>, hub: Arc<ChangeHub>) -> Self {
        Self { pool, schema, hub }
    }

    /// Connects a new pool from configuration.
    pub async fn connect(
        config: &StoreConfig,
        schema: Arc<Schema>,
        hub: Arc<ChangeHub>,
    ) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await?;
        Ok(Self::new(pool, schema, hub))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Returns the hub this store dispatches change events through.
    pub fn hub(&self) -> &Arc<ChangeHub> {
        &self.hub
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_record(row: PgRow) -> Result<Record> {
        let attributes_json: serde_json::Value = row.try_get("attributes")?;
        let attributes: HashMap<AttributeName, AttributeValue> =
            serde_json::from_value(attributes_json)?;

        Ok(Record {
            id: RecordId::from_uuid(row.try_get::<Uuid, _>("id")?),
            record_type: RecordType::new(row.try_get::<String, _>("record_type")?),
            attributes,
        })
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn save(&self, record: Record) -> Result<()> {
        if !self.schema.contains(&record.record_type) {
            return Err(SchemaError::UnknownRecordType(record.record_type.clone()).into());
        }

        let mut record = record;

        // Capture the previous row state and upsert in one transaction so
        // the change event's before/after pair is consistent.
        let mut tx = self.pool.begin().await?;

        let previous_json: Option<serde_json::Value> = sqlx::query_scalar(
            "SELECT attributes FROM records WHERE record_type = $1 AND id = $2 FOR UPDATE",
        )
        .bind(record.record_type.as_str())
        .bind(record.id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;

        let previous = match previous_json {
            Some(json) => Some(Record {
                id: record.id,
                record_type: record.record_type.clone(),
                attributes: serde_json::from_value(json)?,
            }),
            None => None,
        };

        fill_counter_attributes(&self.schema, &mut record, previous.as_ref());
        let attributes_json = serde_json::to_value(&record.attributes)?;

        sqlx::query(
            r#"
            INSERT INTO records (record_type, id, attributes)
            VALUES ($1, $2, $3)
            ON CONFLICT (record_type, id) DO UPDATE SET attributes = EXCLUDED.attributes
            "#,
        )
        .bind(record.record_type.as_str())
        .bind(record.id.as_uuid())
        .bind(attributes_json)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let event = match previous {
            None => ChangeEvent::created(record),
            Some(previous) => ChangeEvent::updated(previous, record),
        };
        self.hub.dispatch(&event).await
    }

    async fn delete(&self, record_type: &RecordType, id: RecordId) -> Result<bool> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            DELETE FROM records
            WHERE record_type = $1 AND id = $2
            RETURNING record_type, id, attributes
            "#,
        )
        .bind(record_type.as_str())
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let previous = Self::row_to_record(row)?;
                self.hub.dispatch(&ChangeEvent::deleted(previous)).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, record_type: &RecordType, id: RecordId) -> Result<Option<Record>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT record_type, id, attributes
            FROM records
            WHERE record_type = $1 AND id = $2
            "#,
        )
        .bind(record_type.as_str())
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn adjust(
        &self,
        record_type: &RecordType,
        id: RecordId,
        attribute: &AttributeName,
        delta: i64,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE records
            SET attributes = jsonb_set(
                attributes,
                ARRAY[$3],
                to_jsonb(COALESCE((attributes ->> $3)::bigint, 0) + $4)
            )
            WHERE record_type = $1 AND id = $2
            "#,
        )
        .bind(record_type.as_str())
        .bind(id.as_uuid())
        .bind(attribute.as_str())
        .bind(delta)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn set_value(
        &self,
        record_type: &RecordType,
        id: RecordId,
        attribute: &AttributeName,
        value: AttributeValue,
    ) -> Result<u64> {
        let value_json = serde_json::to_value(&value)?;

        let result = sqlx::query(
            r#"
            UPDATE records
            SET attributes = jsonb_set(attributes, ARRAY[$3], $4)
            WHERE record_type = $1 AND id = $2
            "#,
        )
        .bind(record_type.as_str())
        .bind(id.as_uuid())
        .bind(attribute.as_str())
        .bind(value_json)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn stream_records(&self, record_type: &RecordType) -> Result<RecordStream> {
        use futures_util::StreamExt;

        let stream = sqlx::query(
            r#"
            SELECT record_type, id, attributes
            FROM records
            WHERE record_type = $1
            ORDER BY id ASC
            "#,
        )
        .bind(record_type.as_str().to_string())
        .fetch(&self.pool)
        .map(|result| match result {
            Ok(row) => Self::row_to_record(row),
            Err(e) => Err(RecordStoreError::Database(e)),
        });

        Ok(Box::pin(stream))
    }
}
