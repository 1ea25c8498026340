//! Learning State Store
//!
//! Captures per-task training results in a durable append-only buffer,
//! archives consumed batches under a timestamp-keyed history, and holds
//! the versioned instruction snapshot the task executor hot-reloads.

pub mod store;

pub use store::{LearningStore, StoreError};
