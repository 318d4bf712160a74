//! Counter bindings: reactive maintenance of denormalized counts.
//!
//! A [`CounterBinding`] associates one declared counter attribute on a
//! parent record type with one reference attribute on a child record type,
//! plus an optional qualification predicate. Attached to a
//! [`record_store::ChangeHub`], it computes a signed delta from every
//! child change event and applies it to the affected parent row (or two
//! rows, when the child moved between parents) with the store's atomic
//! relative update.

pub mod binding;
pub mod error;
pub mod registry;

pub use binding::{BindingBuilder, CounterBinding, Qualifier};
pub use error::{BindingError, Result};
pub use registry::{BindingKey, BindingRegistry};
