//! Counter binding construction, validation, and the change reaction.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::RecordId;
use record_store::{
    AttributeValue, ChangeEvent, ChangeHub, ChangeListener, Record, RecordStore,
};
use schema::{AttributeKind, AttributeName, RecordType, Schema};

use crate::error::{BindingError, Result};
use crate::registry::BindingKey;

/// A qualification predicate: decides whether a child record instance
/// should be counted. The predicate must not concern itself with whether
/// the instance is persisted or deleted; the binding handles that.
pub type Qualifier = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// Builder for a [`CounterBinding`].
///
/// Construction is pure: it validates against the schema and returns a
/// value. Attaching the binding to a hub is a separate, explicit step, so
/// bindings can be constructed in tests without live subscriptions.
pub struct BindingBuilder {
    counter_name: AttributeName,
    child_type: RecordType,
    foreign_field: AttributeName,
    parent_type: Option<RecordType>,
    qualifier: Option<Qualifier>,
}

impl BindingBuilder {
    /// Starts a binding for the counter named `counter_name`, maintained
    /// from changes to `child_type` rows through their `foreign_field`
    /// reference.
    pub fn new(
        counter_name: impl Into<AttributeName>,
        child_type: impl Into<RecordType>,
        foreign_field: impl Into<AttributeName>,
    ) -> Self {
        Self {
            counter_name: counter_name.into(),
            child_type: child_type.into(),
            foreign_field: foreign_field.into(),
            parent_type: None,
            qualifier: None,
        }
    }

    /// Names the parent type explicitly. Required when the foreign field
    /// is a polymorphic reference; otherwise the parent type is inferred
    /// from the reference's declared target.
    pub fn parent_type(mut self, parent_type: impl Into<RecordType>) -> Self {
        self.parent_type = Some(parent_type.into());
        self
    }

    /// Supplies the qualification predicate. Without one, every persisted
    /// child qualifies.
    pub fn qualifier(mut self, qualifier: impl Fn(&Record) -> bool + Send + Sync + 'static) -> Self {
        self.qualifier = Some(Arc::new(qualifier));
        self
    }

    /// Validates the binding against the schema and returns it.
    ///
    /// Fails when the foreign field is not a reference, when a polymorphic
    /// reference lacks an explicit parent type, or when the counter
    /// attribute is absent or not of the counter kind on the parent type.
    pub fn build<S: RecordStore>(self, schema: &Schema, store: S) -> Result<CounterBinding<S>> {
        let descriptor = schema.attribute(&self.child_type, &self.foreign_field)?;

        let (parent_type, foreign_key) = match &descriptor.kind {
            AttributeKind::Reference { target } => {
                let parent_type = self.parent_type.unwrap_or_else(|| target.clone());
                (parent_type, self.foreign_field)
            }
            AttributeKind::PolymorphicReference { key_attribute } => {
                let Some(parent_type) = self.parent_type else {
                    return Err(BindingError::MissingParentType {
                        child_type: self.child_type,
                        attribute: self.foreign_field,
                    });
                };
                // The concrete attribute storing the parent id is resolved
                // by name on the child type.
                let key = schema.attribute(&self.child_type, key_attribute)?;
                (parent_type, key.name.clone())
            }
            _ => {
                return Err(BindingError::NotAReference {
                    child_type: self.child_type,
                    attribute: self.foreign_field,
                });
            }
        };

        let counter = schema.attribute(&parent_type, &self.counter_name)?;
        if !counter.is_counter() {
            return Err(BindingError::NotACounter {
                parent_type,
                attribute: self.counter_name,
            });
        }

        let name = format!(
            "{}.{}.{}-{}",
            parent_type, self.child_type, foreign_key, self.counter_name
        );

        Ok(CounterBinding {
            name,
            counter_name: self.counter_name,
            parent_type,
            child_type: self.child_type,
            foreign_key,
            qualifier: self.qualifier,
            store,
        })
    }
}

/// Keeps one declared counter attribute on a parent record type in step
/// with changes to the child records that reference it.
///
/// On each child change event the binding decides whether the counter
/// should move and applies a relative adjustment to the affected parent
/// row; a reparent adjusts two rows. The adjustment is delegated to the
/// store's atomic relative update, so concurrent events against the same
/// parent cannot lose updates.
pub struct CounterBinding<S> {
    name: String,
    counter_name: AttributeName,
    parent_type: RecordType,
    child_type: RecordType,
    foreign_key: AttributeName,
    qualifier: Option<Qualifier>,
    store: S,
}

impl<S> std::fmt::Debug for CounterBinding<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterBinding")
            .field("name", &self.name)
            .field("counter_name", &self.counter_name)
            .field("parent_type", &self.parent_type)
            .field("child_type", &self.child_type)
            .field("foreign_key", &self.foreign_key)
            .field("qualifier", &self.qualifier.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl<S: RecordStore> CounterBinding<S> {
    /// The counter attribute this binding maintains.
    pub fn counter_name(&self) -> &AttributeName {
        &self.counter_name
    }

    /// The parent record type holding the counter.
    pub fn parent_type(&self) -> &RecordType {
        &self.parent_type
    }

    /// The child record type whose changes move the counter.
    pub fn child_type(&self) -> &RecordType {
        &self.child_type
    }

    /// The concrete child attribute storing the parent id.
    pub fn foreign_key(&self) -> &AttributeName {
        &self.foreign_key
    }

    /// The composite key identifying this binding in a registry.
    pub fn key(&self) -> BindingKey {
        BindingKey {
            parent_type: self.parent_type.clone(),
            child_type: self.child_type.clone(),
            foreign_key: self.foreign_key.clone(),
            counter_name: self.counter_name.clone(),
        }
    }

    /// Returns the id of the parent whose counter includes the given
    /// child, if the child references one.
    pub fn parent_id(&self, child: &Record) -> Option<RecordId> {
        child.attribute(&self.foreign_key).and_then(AttributeValue::as_id)
    }

    fn qualifies(&self, child: &Record) -> bool {
        match &self.qualifier {
            Some(qualifier) => qualifier(child),
            None => true,
        }
    }

    /// Adjusts the counter on the parent of `child` by `delta`.
    ///
    /// A child without a parent reference, or a parent row that no longer
    /// exists, leaves nothing to adjust; both are normal.
    async fn apply(&self, child: &Record, delta: i64) -> record_store::Result<()> {
        let Some(parent_id) = self.parent_id(child) else {
            tracing::trace!(counter = %self.name, "child has no parent reference");
            return Ok(());
        };

        let affected = self
            .store
            .adjust(&self.parent_type, parent_id, &self.counter_name, delta)
            .await?;

        if affected == 0 {
            tracing::trace!(counter = %self.name, %parent_id, "parent row missing, nothing adjusted");
        } else {
            metrics::counter!("counter_adjustments_applied").increment(1);
        }

        Ok(())
    }

    /// Recomputes the counter from scratch for every parent row: tallies
    /// qualifying children per referenced parent, then writes each
    /// parent's tally (zero when none). Used to backfill a newly declared
    /// counter or repair drift.
    #[tracing::instrument(skip(self), fields(counter = %self.name))]
    pub async fn rebuild(&self) -> record_store::Result<()> {
        use futures_util::StreamExt;

        let mut tallies: HashMap<RecordId, i64> = HashMap::new();
        let mut children: u64 = 0;

        let mut stream = self.store.stream_records(&self.child_type).await?;
        while let Some(result) = stream.next().await {
            let child = result?;
            children += 1;
            if let Some(parent_id) = self.parent_id(&child)
                && self.qualifies(&child)
            {
                *tallies.entry(parent_id).or_insert(0) += 1;
            }
        }

        let mut parents: u64 = 0;
        let mut stream = self.store.stream_records(&self.parent_type).await?;
        while let Some(result) = stream.next().await {
            let parent = result?;
            parents += 1;
            let count = tallies.get(&parent.id).copied().unwrap_or(0);
            self.store
                .set_value(
                    &self.parent_type,
                    parent.id,
                    &self.counter_name,
                    AttributeValue::Integer(count),
                )
                .await?;
        }

        tracing::info!(children, parents, "counter rebuild complete");
        Ok(())
    }
}

impl<S: RecordStore + 'static> CounterBinding<S> {
    /// Registers this binding with the hub for its child type.
    ///
    /// Registration is permanent for the binding's lifetime; there is no
    /// unsubscribe path, and attaching twice fires the reaction twice per
    /// event.
    pub async fn attach(self: Arc<Self>, hub: &ChangeHub) {
        let child_type = self.child_type.clone();
        hub.register(child_type, self).await;
    }
}

#[async_trait]
impl<S: RecordStore> ChangeListener for CounterBinding<S> {
    fn name(&self) -> &str {
        &self.name
    }

    /// Decides, from the before/after pair, whether the counter moves.
    ///
    /// A child enters the counter when it is persisted, qualifies, and
    /// either arrived under this parent or did not count before. It leaves
    /// the counter of the parent that held it when it reparents or stops
    /// qualifying. Only a reparent adjusts two rows, and never the same
    /// row twice.
    #[tracing::instrument(skip(self, event), fields(counter = %self.name, kind = ?event.kind()))]
    async fn receive_change(&self, event: &ChangeEvent) -> record_store::Result<()> {
        let instance = event.instance();
        let old = event.previous();

        let changed_parent =
            old.is_some_and(|old| self.parent_id(old) != self.parent_id(instance));
        let was_in_counter = event.was_persisted() && old.is_some_and(|old| self.qualifies(old));
        let is_in_counter = event.is_persisted() && self.qualifies(instance);

        // Reparent: the old parent gives up the child before the new one
        // gains it, as two independent adjustments.
        if was_in_counter
            && changed_parent
            && let Some(old) = old
        {
            self.apply(old, -1).await?;
        }

        if is_in_counter && (changed_parent || !was_in_counter) {
            self.apply(instance, 1).await?;
        }

        if was_in_counter && !changed_parent && !is_in_counter {
            self.apply(instance, -1).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use record_store::{InMemoryRecordStore, RecordStoreExt};
    use schema::RecordTypeDef;

    fn forum_schema() -> Schema {
        Schema::builder()
            .record_type(RecordTypeDef::new("thread").counter("comment_count"))
            .record_type(
                RecordTypeDef::new("comment")
                    .reference("thread", "thread")
                    .boolean("approved"),
            )
            .record_type(
                RecordTypeDef::new("reaction")
                    .polymorphic_reference("subject", "subject_id")
                    .record_ref("subject_id")
                    .text("emoji"),
            )
            .build()
    }

    fn memory_store(schema: &Arc<Schema>) -> InMemoryRecordStore {
        InMemoryRecordStore::new(Arc::clone(schema), Arc::new(ChangeHub::new()))
    }

    async fn counter_of(store: &InMemoryRecordStore, id: RecordId) -> i64 {
        store
            .integer_value(
                &RecordType::new("thread"),
                id,
                &AttributeName::new("comment_count"),
            )
            .await
            .unwrap()
            .unwrap()
    }

    #[test]
    fn direct_reference_infers_parent_type() {
        let schema = Arc::new(forum_schema());
        let binding = BindingBuilder::new("comment_count", "comment", "thread")
            .build(&schema, memory_store(&schema))
            .unwrap();

        assert_eq!(binding.parent_type(), &RecordType::new("thread"));
        assert_eq!(binding.foreign_key(), &AttributeName::new("thread"));
    }

    #[test]
    fn polymorphic_reference_requires_parent_type() {
        let schema = Arc::new(forum_schema());
        let err = BindingBuilder::new("comment_count", "reaction", "subject")
            .build(&schema, memory_store(&schema))
            .unwrap_err();

        assert!(matches!(err, BindingError::MissingParentType { .. }));
    }

    #[test]
    fn polymorphic_reference_resolves_key_attribute() {
        let schema = Arc::new(forum_schema());
        let binding = BindingBuilder::new("comment_count", "reaction", "subject")
            .parent_type("thread")
            .build(&schema, memory_store(&schema))
            .unwrap();

        assert_eq!(binding.foreign_key(), &AttributeName::new("subject_id"));
        assert_eq!(binding.parent_type(), &RecordType::new("thread"));
    }

    #[test]
    fn non_reference_field_is_rejected() {
        let schema = Arc::new(forum_schema());
        let err = BindingBuilder::new("comment_count", "comment", "approved")
            .build(&schema, memory_store(&schema))
            .unwrap_err();

        assert!(matches!(err, BindingError::NotAReference { .. }));
    }

    #[test]
    fn counter_must_be_declared_with_counter_kind() {
        let schema = Arc::new(
            Schema::builder()
                .record_type(RecordTypeDef::new("thread").integer("comment_count"))
                .record_type(RecordTypeDef::new("comment").reference("thread", "thread"))
                .build(),
        );
        let err = BindingBuilder::new("comment_count", "comment", "thread")
            .build(&schema, memory_store(&schema))
            .unwrap_err();

        assert!(matches!(err, BindingError::NotACounter { .. }));
    }

    #[test]
    fn undeclared_counter_is_a_schema_error() {
        let schema = Arc::new(forum_schema());
        let err = BindingBuilder::new("reply_count", "comment", "thread")
            .build(&schema, memory_store(&schema))
            .unwrap_err();

        assert!(matches!(err, BindingError::Schema(_)));
    }

    #[tokio::test]
    async fn qualifying_insert_increments() {
        let schema = Arc::new(forum_schema());
        let store = memory_store(&schema);
        let binding = BindingBuilder::new("comment_count", "comment", "thread")
            .build(&schema, store.clone())
            .unwrap();

        let thread = Record::new("thread");
        let thread_id = thread.id;
        store.save(thread).await.unwrap();

        let comment = Record::new("comment").with("thread", thread_id);
        binding
            .receive_change(&ChangeEvent::created(comment))
            .await
            .unwrap();

        assert_eq!(counter_of(&store, thread_id).await, 1);
    }

    #[tokio::test]
    async fn non_qualifying_insert_is_ignored() {
        let schema = Arc::new(forum_schema());
        let store = memory_store(&schema);
        let binding = BindingBuilder::new("comment_count", "comment", "thread")
            .qualifier(|c| {
                c.attribute(&AttributeName::new("approved"))
                    .and_then(AttributeValue::as_bool)
                    .unwrap_or(false)
            })
            .build(&schema, store.clone())
            .unwrap();

        let thread = Record::new("thread");
        let thread_id = thread.id;
        store.save(thread).await.unwrap();

        let comment = Record::new("comment")
            .with("thread", thread_id)
            .with("approved", false);
        binding
            .receive_change(&ChangeEvent::created(comment))
            .await
            .unwrap();

        assert_eq!(counter_of(&store, thread_id).await, 0);
    }

    #[tokio::test]
    async fn update_without_parent_or_predicate_change_is_a_no_op() {
        let schema = Arc::new(forum_schema());
        let store = memory_store(&schema);
        let binding = BindingBuilder::new("comment_count", "comment", "thread")
            .build(&schema, store.clone())
            .unwrap();

        let thread = Record::new("thread");
        let thread_id = thread.id;
        store.save(thread).await.unwrap();

        let before = Record::new("comment").with("thread", thread_id);
        binding
            .receive_change(&ChangeEvent::created(before.clone()))
            .await
            .unwrap();

        let after = before.clone().with("approved", true);
        binding
            .receive_change(&ChangeEvent::updated(before, after))
            .await
            .unwrap();

        assert_eq!(counter_of(&store, thread_id).await, 1);
    }

    #[tokio::test]
    async fn predicate_flip_moves_the_counter_both_ways() {
        let schema = Arc::new(forum_schema());
        let store = memory_store(&schema);
        let approved = |c: &Record| {
            c.attribute(&AttributeName::new("approved"))
                .and_then(AttributeValue::as_bool)
                .unwrap_or(false)
        };
        let binding = BindingBuilder::new("comment_count", "comment", "thread")
            .qualifier(approved)
            .build(&schema, store.clone())
            .unwrap();

        let thread = Record::new("thread");
        let thread_id = thread.id;
        store.save(thread).await.unwrap();

        let unapproved = Record::new("comment")
            .with("thread", thread_id)
            .with("approved", false);
        binding
            .receive_change(&ChangeEvent::created(unapproved.clone()))
            .await
            .unwrap();
        assert_eq!(counter_of(&store, thread_id).await, 0);

        // false -> true
        let approved_state = unapproved.clone().with("approved", true);
        binding
            .receive_change(&ChangeEvent::updated(
                unapproved.clone(),
                approved_state.clone(),
            ))
            .await
            .unwrap();
        assert_eq!(counter_of(&store, thread_id).await, 1);

        // true -> false
        binding
            .receive_change(&ChangeEvent::updated(approved_state, unapproved))
            .await
            .unwrap();
        assert_eq!(counter_of(&store, thread_id).await, 0);
    }

    #[tokio::test]
    async fn delete_decrements_only_qualifying_children() {
        let schema = Arc::new(forum_schema());
        let store = memory_store(&schema);
        let approved = |c: &Record| {
            c.attribute(&AttributeName::new("approved"))
                .and_then(AttributeValue::as_bool)
                .unwrap_or(false)
        };
        let binding = BindingBuilder::new("comment_count", "comment", "thread")
            .qualifier(approved)
            .build(&schema, store.clone())
            .unwrap();

        let thread = Record::new("thread");
        let thread_id = thread.id;
        store.save(thread).await.unwrap();

        let counted = Record::new("comment")
            .with("thread", thread_id)
            .with("approved", true);
        binding
            .receive_change(&ChangeEvent::created(counted.clone()))
            .await
            .unwrap();
        assert_eq!(counter_of(&store, thread_id).await, 1);

        binding
            .receive_change(&ChangeEvent::deleted(counted))
            .await
            .unwrap();
        assert_eq!(counter_of(&store, thread_id).await, 0);

        let uncounted = Record::new("comment")
            .with("thread", thread_id)
            .with("approved", false);
        binding
            .receive_change(&ChangeEvent::deleted(uncounted))
            .await
            .unwrap();
        assert_eq!(counter_of(&store, thread_id).await, 0);
    }

    #[tokio::test]
    async fn reparent_moves_one_count_between_parents() {
        let schema = Arc::new(forum_schema());
        let store = memory_store(&schema);
        let binding = BindingBuilder::new("comment_count", "comment", "thread")
            .build(&schema, store.clone())
            .unwrap();

        let old_thread = Record::new("thread");
        let new_thread = Record::new("thread");
        let (old_id, new_id) = (old_thread.id, new_thread.id);
        store.save(old_thread).await.unwrap();
        store.save(new_thread).await.unwrap();

        let before = Record::new("comment").with("thread", old_id);
        binding
            .receive_change(&ChangeEvent::created(before.clone()))
            .await
            .unwrap();

        let after = before.clone().with("thread", new_id);
        binding
            .receive_change(&ChangeEvent::updated(before, after))
            .await
            .unwrap();

        assert_eq!(counter_of(&store, old_id).await, 0);
        assert_eq!(counter_of(&store, new_id).await, 1);
    }

    #[tokio::test]
    async fn reparent_while_disqualified_touches_nothing() {
        let schema = Arc::new(forum_schema());
        let store = memory_store(&schema);
        let approved = |c: &Record| {
            c.attribute(&AttributeName::new("approved"))
                .and_then(AttributeValue::as_bool)
                .unwrap_or(false)
        };
        let binding = BindingBuilder::new("comment_count", "comment", "thread")
            .qualifier(approved)
            .build(&schema, store.clone())
            .unwrap();

        let old_thread = Record::new("thread");
        let new_thread = Record::new("thread");
        let (old_id, new_id) = (old_thread.id, new_thread.id);
        store.save(old_thread).await.unwrap();
        store.save(new_thread).await.unwrap();

        let before = Record::new("comment")
            .with("thread", old_id)
            .with("approved", false);
        let after = before.clone().with("thread", new_id);
        binding
            .receive_change(&ChangeEvent::updated(before, after))
            .await
            .unwrap();

        assert_eq!(counter_of(&store, old_id).await, 0);
        assert_eq!(counter_of(&store, new_id).await, 0);
    }

    #[tokio::test]
    async fn reparent_with_disqualification_only_decrements_old_parent() {
        let schema = Arc::new(forum_schema());
        let store = memory_store(&schema);
        let approved = |c: &Record| {
            c.attribute(&AttributeName::new("approved"))
                .and_then(AttributeValue::as_bool)
                .unwrap_or(false)
        };
        let binding = BindingBuilder::new("comment_count", "comment", "thread")
            .qualifier(approved)
            .build(&schema, store.clone())
            .unwrap();

        let old_thread = Record::new("thread");
        let new_thread = Record::new("thread");
        let (old_id, new_id) = (old_thread.id, new_thread.id);
        store.save(old_thread).await.unwrap();
        store.save(new_thread).await.unwrap();

        let before = Record::new("comment")
            .with("thread", old_id)
            .with("approved", true);
        binding
            .receive_change(&ChangeEvent::created(before.clone()))
            .await
            .unwrap();
        assert_eq!(counter_of(&store, old_id).await, 1);

        let after = before
            .clone()
            .with("thread", new_id)
            .with("approved", false);
        binding
            .receive_change(&ChangeEvent::updated(before, after))
            .await
            .unwrap();

        assert_eq!(counter_of(&store, old_id).await, 0);
        assert_eq!(counter_of(&store, new_id).await, 0);
    }

    #[tokio::test]
    async fn missing_parent_row_is_tolerated() {
        let schema = Arc::new(forum_schema());
        let store = memory_store(&schema);
        let binding = BindingBuilder::new("comment_count", "comment", "thread")
            .build(&schema, store.clone())
            .unwrap();

        // Parent was never saved; the adjustment affects zero rows.
        let comment = Record::new("comment").with("thread", RecordId::new());
        binding
            .receive_change(&ChangeEvent::created(comment))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn child_without_parent_reference_is_tolerated() {
        let schema = Arc::new(forum_schema());
        let store = memory_store(&schema);
        let binding = BindingBuilder::new("comment_count", "comment", "thread")
            .build(&schema, store.clone())
            .unwrap();

        let comment = Record::new("comment").with("approved", true);
        binding
            .receive_change(&ChangeEvent::created(comment))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rebuild_recomputes_counts_from_scratch() {
        let schema = Arc::new(forum_schema());
        let store = memory_store(&schema);
        let approved = |c: &Record| {
            c.attribute(&AttributeName::new("approved"))
                .and_then(AttributeValue::as_bool)
                .unwrap_or(false)
        };
        let binding = BindingBuilder::new("comment_count", "comment", "thread")
            .qualifier(approved)
            .build(&schema, store.clone())
            .unwrap();

        let thread_a = Record::new("thread");
        let thread_b = Record::new("thread");
        let (a_id, b_id) = (thread_a.id, thread_b.id);
        store.save(thread_a).await.unwrap();
        store.save(thread_b).await.unwrap();

        for _ in 0..3 {
            store
                .save(
                    Record::new("comment")
                        .with("thread", a_id)
                        .with("approved", true),
                )
                .await
                .unwrap();
        }
        store
            .save(
                Record::new("comment")
                    .with("thread", a_id)
                    .with("approved", false),
            )
            .await
            .unwrap();

        // Drift the stored counters on purpose.
        store
            .set_value(
                &RecordType::new("thread"),
                a_id,
                &AttributeName::new("comment_count"),
                AttributeValue::Integer(99),
            )
            .await
            .unwrap();
        store
            .set_value(
                &RecordType::new("thread"),
                b_id,
                &AttributeName::new("comment_count"),
                AttributeValue::Integer(7),
            )
            .await
            .unwrap();

        binding.rebuild().await.unwrap();

        assert_eq!(counter_of(&store, a_id).await, 3);
        assert_eq!(counter_of(&store, b_id).await, 0);
    }
}
