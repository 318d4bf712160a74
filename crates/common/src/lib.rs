//! Shared types used across the counter cache workspace.

pub mod types;

pub use types::RecordId;
