//! Local emulated database.
//!
//! Each entity collection is stored as a single JSON array. Every mutation
//! reads the whole collection, changes it in memory, and writes it back, so two
//! concurrent writers of the same collection race and the last write wins.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use std::collections::HashSet;
use std::sync::Arc;

use super::Database;
use crate::error::StoreError;
use crate::model::{Collection, Entity};

#[derive(Clone)]
pub struct LocalDatabase {
  db: Arc<Database>,
}

impl LocalDatabase {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  /// Read a whole collection. A collection that was never written is empty.
  pub fn load<T: Entity>(&self) -> Result<Vec<T>, StoreError> {
    match self.load_raw(T::COLLECTION)? {
      Some(data) => Ok(serde_json::from_str(&data)?),
      None => Ok(Vec::new()),
    }
  }

  fn load_raw(&self, collection: Collection) -> Result<Option<String>, StoreError> {
    self.db.with_conn(|conn| {
      conn
        .query_row(
          "SELECT data FROM collections WHERE name = ?",
          params![collection.as_str()],
          |row| row.get(0),
        )
        .optional()
        .map_err(StoreError::from)
    })
  }

  /// Replace a whole collection.
  pub fn save<T: Entity>(&self, records: &[T]) -> Result<(), StoreError> {
    let data = serde_json::to_string(records)?;
    let collection = T::COLLECTION.as_str();
    self.db.with_conn(|conn| {
      conn.execute(
        "INSERT OR REPLACE INTO collections (name, data, updated_at) VALUES (?, ?, ?)",
        params![collection, data, Utc::now().to_rfc3339()],
      )?;
      Ok(())
    })?;
    tracing::debug!(collection, count = records.len(), "Saved local collection");
    Ok(())
  }

  /// Insert or replace a record by id.
  pub fn upsert<T: Entity>(&self, record: &T) -> Result<(), StoreError> {
    self.upsert_all(std::slice::from_ref(record))
  }

  /// Insert or replace many records in one read-modify-write pass.
  pub fn upsert_all<T: Entity>(&self, records: &[T]) -> Result<(), StoreError> {
    let mut existing: Vec<T> = self.load()?;
    for record in records {
      match existing.iter_mut().find(|r| r.id() == record.id()) {
        Some(slot) => *slot = record.clone(),
        None => existing.push(record.clone()),
      }
    }
    self.save(&existing)
  }

  /// Remove a record by id. Returns whether it was present.
  pub fn remove<T: Entity>(&self, id: &str) -> Result<bool, StoreError> {
    Ok(self.remove_all::<T>(&[id.to_string()])? > 0)
  }

  /// Remove many records in one pass. Returns how many were present.
  pub fn remove_all<T: Entity>(&self, ids: &[String]) -> Result<usize, StoreError> {
    let doomed: HashSet<&str> = ids.iter().map(String::as_str).collect();
    let mut records: Vec<T> = self.load()?;
    let before = records.len();
    records.retain(|r| !doomed.contains(r.id()));
    let removed = before - records.len();
    self.save(&records)?;
    Ok(removed)
  }

  /// Read a durable flag. Unset flags read as `None`.
  pub fn flag(&self, name: &str) -> Result<Option<bool>, StoreError> {
    self.db.with_conn(|conn| {
      conn
        .query_row(
          "SELECT value FROM flags WHERE name = ?",
          params![name],
          |row| row.get::<_, i64>(0),
        )
        .optional()
        .map(|v| v.map(|v| v != 0))
        .map_err(StoreError::from)
    })
  }

  pub fn set_flag(&self, name: &str, value: bool) -> Result<(), StoreError> {
    self.db.with_conn(|conn| {
      conn.execute(
        "INSERT OR REPLACE INTO flags (name, value, set_at) VALUES (?, ?, datetime('now'))",
        params![name, value as i64],
      )?;
      Ok(())
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{Expense, Invoice};
  use crate::testing::{expense, invoice};

  fn local() -> LocalDatabase {
    LocalDatabase::new(Arc::new(Database::open_in_memory().unwrap()))
  }

  #[test]
  fn test_missing_collection_is_empty() {
    let local = local();
    assert!(local.load::<Invoice>().unwrap().is_empty());
  }

  #[test]
  fn test_upsert_replaces_by_id() {
    let local = local();
    local.upsert(&invoice("a", 100.0)).unwrap();
    local.upsert(&invoice("b", 50.0)).unwrap();
    local.upsert(&invoice("a", 125.0)).unwrap();

    let invoices: Vec<Invoice> = local.load().unwrap();
    assert_eq!(invoices.len(), 2);
    assert_eq!(invoices[0].id, "a");
    assert_eq!(invoices[0].total, 125.0);
  }

  #[test]
  fn test_collections_are_isolated() {
    let local = local();
    local.upsert(&invoice("a", 100.0)).unwrap();
    local.upsert(&expense("a", 10.0)).unwrap();
    assert!(local.remove::<Expense>("a").unwrap());
    assert_eq!(local.load::<Invoice>().unwrap().len(), 1);
    assert!(local.load::<Expense>().unwrap().is_empty());
  }

  #[test]
  fn test_remove_all_counts_present_records() {
    let local = local();
    local
      .upsert_all(&[expense("a", 1.0), expense("b", 2.0), expense("c", 3.0)])
      .unwrap();
    let removed = local
      .remove_all::<Expense>(&["a".into(), "c".into(), "zzz".into()])
      .unwrap();
    assert_eq!(removed, 2);
    let left: Vec<Expense> = local.load().unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, "b");
  }

  #[test]
  fn test_corrupt_collection_is_an_error() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    db.with_conn(|conn| {
      conn.execute(
        "INSERT INTO collections (name, data, updated_at) VALUES ('invoices', '{oops', '')",
        [],
      )?;
      Ok(())
    })
    .unwrap();
    let local = LocalDatabase::new(db);
    assert!(matches!(
      local.load::<Invoice>(),
      Err(StoreError::Serialization(_))
    ));
  }

  #[test]
  fn test_flags_round_trip() {
    let local = local();
    assert_eq!(local.flag("offline").unwrap(), None);
    local.set_flag("offline", true).unwrap();
    assert_eq!(local.flag("offline").unwrap(), Some(true));
    local.set_flag("offline", false).unwrap();
    assert_eq!(local.flag("offline").unwrap(), Some(false));
  }
}
