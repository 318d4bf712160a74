//! Record persistence and change notification.
//!
//! This crate provides the persistence collaborator surface that counter
//! bindings react to:
//! - [`Record`] and [`AttributeValue`] for dynamic persisted state
//! - [`ChangeEvent`] for the before/after pair delivered once per
//!   committed save or delete
//! - [`ChangeListener`] and [`ChangeHub`] for change notification
//! - [`RecordStore`] for save/delete/get plus the atomic relative-update
//!   primitive, implemented in memory and over PostgreSQL

pub mod change;
pub mod config;
pub mod error;
pub mod hub;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use common::RecordId;
pub use change::{ChangeEvent, ChangeKind};
pub use config::StoreConfig;
pub use error::{RecordStoreError, Result};
pub use hub::{ChangeHub, ChangeListener};
pub use memory::InMemoryRecordStore;
pub use postgres::PostgresRecordStore;
pub use record::{AttributeValue, Record};
pub use store::{RecordStore, RecordStoreExt, RecordStream};
