//! The change-notification mechanism: listeners registered per record type.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use schema::RecordType;
use tokio::sync::RwLock;

use crate::Result;
use crate::change::ChangeEvent;

/// A reaction to record change events.
///
/// Listeners are invoked once per committed save/delete on their
/// subscribed record type, in the task performing the operation, before
/// that operation returns to its caller.
#[async_trait]
pub trait ChangeListener: Send + Sync {
    /// Returns the name of this listener.
    fn name(&self) -> &str;

    /// Handles a single change event.
    async fn receive_change(&self, event: &ChangeEvent) -> Result<()>;
}

/// Delivers change events to the listeners registered for each record type.
///
/// Registration is permanent for a listener's lifetime; there is no
/// unsubscribe path. Registering the same listener twice creates two
/// deliveries per event.
#[derive(Default)]
pub struct ChangeHub {
    listeners: RwLock<HashMap<RecordType, Vec<Arc<dyn ChangeListener>>>>,
}

impl ChangeHub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for a record type.
    pub async fn register(&self, record_type: RecordType, listener: Arc<dyn ChangeListener>) {
        let mut listeners = self.listeners.write().await;
        listeners.entry(record_type).or_default().push(listener);
    }

    /// Returns the number of listeners registered for a record type.
    pub async fn listener_count(&self, record_type: &RecordType) -> usize {
        self.listeners
            .read()
            .await
            .get(record_type)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Delivers one event to every listener registered for its record
    /// type, in registration order. The first listener error propagates
    /// to the caller of the triggering operation.
    #[tracing::instrument(skip(self, event), fields(record_type = %event.record_type(), kind = ?event.kind()))]
    pub async fn dispatch(&self, event: &ChangeEvent) -> Result<()> {
        let listeners: Vec<Arc<dyn ChangeListener>> = {
            let registered = self.listeners.read().await;
            registered
                .get(event.record_type())
                .map(|listeners| listeners.to_vec())
                .unwrap_or_default()
        };

        for listener in &listeners {
            listener.receive_change(event).await?;
            metrics::counter!("record_changes_dispatched").increment(1);
        }

        Ok(())
    }
}
