//! Offline-tolerant sync and caching layer for CBS Books.
//!
//! [`Books`] is the entry point: per-entity [`Store`]s for CRUD, a
//! [`BatchExecutor`] for bulk adds and deletes, and a [`Migrator`] that
//! uploads data created while the backend was unreachable.

pub mod batch;
pub mod books;
pub mod cache;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod logging;
pub mod migration;
pub mod model;
pub mod pipeline;
pub mod remote;
pub mod task;

#[cfg(test)]
mod testing;

pub use batch::{Batch, BatchExecutor, BatchPath, BatchReport};
pub use books::Books;
pub use config::Config;
pub use error::{BooksError, RemoteError, StoreError};
pub use migration::{MigrationOutcome, Migrator};
pub use model::{Client, Collection, Entity, Expense, Invoice};
pub use pipeline::{Outcome, Store};
pub use task::{BackgroundTask, TaskState};
