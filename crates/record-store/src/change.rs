//! Change events: the before/after pair delivered on every save or delete.

use chrono::{DateTime, Utc};
use schema::RecordType;

use crate::record::Record;

/// The kind of persistence operation that produced a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A fresh insert: not persisted before, persisted after.
    Created,

    /// An update of an existing row: persisted before and after.
    Updated,

    /// A removal: persisted before, not persisted after.
    Deleted,
}

/// An ephemeral value produced exactly once per committed save/delete,
/// carrying the record's state after the operation and its state before
/// it. Consumed synchronously by every listener registered for the
/// record's type; never stored.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    kind: ChangeKind,
    instance: Record,
    previous: Option<Record>,
    occurred_at: DateTime<Utc>,
}

impl ChangeEvent {
    /// A fresh insert. There is no prior persisted state.
    pub fn created(instance: Record) -> Self {
        Self {
            kind: ChangeKind::Created,
            instance,
            previous: None,
            occurred_at: Utc::now(),
        }
    }

    /// An update of an existing row.
    pub fn updated(previous: Record, instance: Record) -> Self {
        Self {
            kind: ChangeKind::Updated,
            instance,
            previous: Some(previous),
            occurred_at: Utc::now(),
        }
    }

    /// A removal. The instance is the removed row's final state.
    pub fn deleted(previous: Record) -> Self {
        Self {
            kind: ChangeKind::Deleted,
            instance: previous.clone(),
            previous: Some(previous),
            occurred_at: Utc::now(),
        }
    }

    /// The kind of operation.
    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    /// The type of the changed record.
    pub fn record_type(&self) -> &RecordType {
        &self.instance.record_type
    }

    /// The record's state after the operation.
    pub fn instance(&self) -> &Record {
        &self.instance
    }

    /// The record's state before the operation, if it was persisted.
    pub fn previous(&self) -> Option<&Record> {
        self.previous.as_ref()
    }

    /// Was the record persisted before the operation?
    pub fn was_persisted(&self) -> bool {
        matches!(self.kind, ChangeKind::Updated | ChangeKind::Deleted)
    }

    /// Is the record persisted after the operation?
    pub fn is_persisted(&self) -> bool {
        matches!(self.kind, ChangeKind::Created | ChangeKind::Updated)
    }

    /// When the event was produced.
    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_has_no_previous_state() {
        let event = ChangeEvent::created(Record::new("comment"));
        assert_eq!(event.kind(), ChangeKind::Created);
        assert!(!event.was_persisted());
        assert!(event.is_persisted());
        assert!(event.previous().is_none());
    }

    #[test]
    fn updated_is_persisted_before_and_after() {
        let before = Record::new("comment").with("approved", false);
        let after = before.clone().with("approved", true);
        let event = ChangeEvent::updated(before, after);
        assert!(event.was_persisted());
        assert!(event.is_persisted());
        assert!(event.previous().is_some());
    }

    #[test]
    fn deleted_carries_the_final_state_twice() {
        let record = Record::new("comment").with("approved", true);
        let event = ChangeEvent::deleted(record.clone());
        assert!(event.was_persisted());
        assert!(!event.is_persisted());
        assert_eq!(event.instance(), &record);
        assert_eq!(event.previous(), Some(&record));
    }
}
