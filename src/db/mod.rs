mod local;
pub mod schema;

pub use local::LocalDatabase;

use color_eyre::{eyre::eyre, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;

use crate::error::StoreError;

/// Shared SQLite connection backing the local database and both cache tiers.
pub struct Database {
  conn: Mutex<Connection>,
}

impl Database {
  /// Open or create the database file at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create database directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open a private in-memory database.
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let db = Self {
      conn: Mutex::new(conn),
    };
    db.run_migrations()?;
    Ok(db)
  }

  /// Run database migrations
  fn run_migrations(&self) -> Result<()> {
    self
      .with_conn(|conn| conn.execute_batch(schema::SCHEMA).map_err(StoreError::from))
      .map_err(|e| eyre!("Failed to run migrations: {}", e))
  }

  /// Run `f` with exclusive access to the connection.
  pub fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
  where
    F: FnOnce(&Connection) -> Result<T, StoreError>,
  {
    let conn = self
      .conn
      .lock()
      .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))?;
    f(&conn)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_migrations_are_idempotent() {
    let db = Database::open_in_memory().unwrap();
    db.run_migrations().unwrap();

    let tables: i64 = db
      .with_conn(|conn| {
        conn
          .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
            [],
            |row| row.get(0),
          )
          .map_err(StoreError::from)
      })
      .unwrap();
    assert_eq!(tables, 4);
  }

  #[test]
  fn test_open_creates_parent_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("books.db");
    Database::open(&path).unwrap();
    assert!(path.exists());
  }
}
