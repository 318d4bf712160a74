//! An explicit registry of counter bindings, owned by application startup.

use std::collections::HashMap;
use std::sync::Arc;

use record_store::{ChangeHub, RecordStore};
use schema::{AttributeName, RecordType};

use crate::binding::CounterBinding;

/// Composite key identifying one binding: which counter on which parent
/// type is maintained from which child reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingKey {
    pub parent_type: RecordType,
    pub child_type: RecordType,
    pub foreign_key: AttributeName,
    pub counter_name: AttributeName,
}

impl std::fmt::Display for BindingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}-{}",
            self.parent_type, self.child_type, self.foreign_key, self.counter_name
        )
    }
}

/// A plain mapping from binding keys to bindings.
///
/// The registry is bookkeeping only: it does not subscribe anything.
/// Attach bindings to a hub explicitly, either one by one or with
/// [`BindingRegistry::attach_all`].
pub struct BindingRegistry<S> {
    bindings: HashMap<BindingKey, Arc<CounterBinding<S>>>,
}

impl<S: RecordStore> BindingRegistry<S> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            bindings: HashMap::new(),
        }
    }

    /// Inserts a binding under its composite key, returning any binding it
    /// displaces.
    pub fn insert(&mut self, binding: Arc<CounterBinding<S>>) -> Option<Arc<CounterBinding<S>>> {
        self.bindings.insert(binding.key(), binding)
    }

    /// Looks up a binding by key.
    pub fn get(&self, key: &BindingKey) -> Option<&Arc<CounterBinding<S>>> {
        self.bindings.get(key)
    }

    /// Returns the number of registered bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns true if no bindings are registered.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Iterates the registered bindings.
    pub fn iter(&self) -> impl Iterator<Item = (&BindingKey, &Arc<CounterBinding<S>>)> {
        self.bindings.iter()
    }
}

impl<S: RecordStore + 'static> BindingRegistry<S> {
    /// Attaches every registered binding to the hub.
    pub async fn attach_all(&self, hub: &ChangeHub) {
        for binding in self.bindings.values() {
            Arc::clone(binding).attach(hub).await;
        }
    }

    /// Rebuilds every registered counter from scratch.
    pub async fn rebuild_all(&self) -> record_store::Result<()> {
        for binding in self.bindings.values() {
            binding.rebuild().await?;
        }
        Ok(())
    }
}

impl<S: RecordStore> Default for BindingRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
