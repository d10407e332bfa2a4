//! Cache tier implementations: SQLite-backed tiers with a byte quota, and a
//! no-op tier used when storage is unavailable.

use chrono::{TimeZone, Utc};
use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::traits::{CacheTier, CachedBytes};
use crate::db::Database;
use crate::error::StoreError;

/// Tier that doesn't cache anything.
/// Used when a tier failed to initialize - reads always miss.
pub struct NoopTier;

impl CacheTier for NoopTier {
  fn name(&self) -> &'static str {
    "noop"
  }

  fn read(&self, _key: &str) -> Result<Option<CachedBytes>, StoreError> {
    Ok(None) // Always miss
  }

  fn write(&self, _key: &str, _data: &[u8]) -> Result<(), StoreError> {
    Ok(()) // Discard
  }

  fn remove(&self, _key: &str) -> Result<(), StoreError> {
    Ok(())
  }

  fn clear(&self) -> Result<(), StoreError> {
    Ok(())
  }
}

/// Which table a [`SqliteTier`] writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierKind {
  /// Small tier keyed by collection name
  Record,
  /// Large tier keyed by the SHA-256 of an arbitrary string key
  Blob,
}

/// SQLite-backed cache tier with a total byte quota.
pub struct SqliteTier {
  db: Arc<Database>,
  kind: TierKind,
  quota_bytes: u64,
}

impl SqliteTier {
  pub fn new(db: Arc<Database>, kind: TierKind, quota_bytes: u64) -> Self {
    Self {
      db,
      kind,
      quota_bytes,
    }
  }

  /// Primary key for `key` in this tier's table.
  fn row_key(&self, key: &str) -> String {
    match self.kind {
      TierKind::Record => key.to_string(),
      TierKind::Blob => hash_key(key),
    }
  }

  /// Bytes currently stored under keys other than `row_key`.
  fn used_bytes_excluding(
    &self,
    conn: &rusqlite::Connection,
    row_key: &str,
  ) -> Result<u64, StoreError> {
    let sql = match self.kind {
      TierKind::Record => {
        "SELECT COALESCE(SUM(length(data)), 0) FROM record_cache WHERE cache_key != ?"
      }
      TierKind::Blob => "SELECT COALESCE(SUM(length(data)), 0) FROM blob_cache WHERE key_hash != ?",
    };
    let used: i64 = conn.query_row(sql, params![row_key], |row| row.get(0))?;
    Ok(used.max(0) as u64)
  }
}

/// SHA256 hash for stable, fixed-length keys
fn hash_key(key: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(key.as_bytes());
  hex::encode(hasher.finalize())
}

impl CacheTier for SqliteTier {
  fn name(&self) -> &'static str {
    match self.kind {
      TierKind::Record => "record",
      TierKind::Blob => "blob",
    }
  }

  fn read(&self, key: &str) -> Result<Option<CachedBytes>, StoreError> {
    let row_key = self.row_key(key);
    let sql = match self.kind {
      TierKind::Record => "SELECT data, cached_at FROM record_cache WHERE cache_key = ?",
      TierKind::Blob => "SELECT data, cached_at FROM blob_cache WHERE key_hash = ?",
    };

    let row: Option<(Vec<u8>, i64)> = self.db.with_conn(|conn| {
      conn
        .query_row(sql, params![row_key], |row| Ok((row.get(0)?, row.get(1)?)))
        .optional()
        .map_err(StoreError::from)
    })?;

    Ok(row.and_then(|(data, millis)| {
      Utc
        .timestamp_millis_opt(millis)
        .single()
        .map(|cached_at| CachedBytes { data, cached_at })
    }))
  }

  fn write(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
    let row_key = self.row_key(key);
    let now = Utc::now().timestamp_millis();

    self.db.with_conn(|conn| {
      let needed = self.used_bytes_excluding(conn, &row_key)? + data.len() as u64;
      if needed > self.quota_bytes {
        return Err(StoreError::QuotaExceeded {
          key: key.to_string(),
          needed,
          limit: self.quota_bytes,
        });
      }

      match self.kind {
        TierKind::Record => conn.execute(
          "INSERT OR REPLACE INTO record_cache (cache_key, data, cached_at) VALUES (?, ?, ?)",
          params![row_key, data, now],
        )?,
        TierKind::Blob => conn.execute(
          "INSERT OR REPLACE INTO blob_cache (key_hash, cache_key, data, cached_at)
           VALUES (?, ?, ?, ?)",
          params![row_key, key, data, now],
        )?,
      };
      Ok(())
    })
  }

  fn remove(&self, key: &str) -> Result<(), StoreError> {
    let row_key = self.row_key(key);
    let sql = match self.kind {
      TierKind::Record => "DELETE FROM record_cache WHERE cache_key = ?",
      TierKind::Blob => "DELETE FROM blob_cache WHERE key_hash = ?",
    };
    self.db.with_conn(|conn| {
      conn.execute(sql, params![row_key])?;
      Ok(())
    })
  }

  fn clear(&self) -> Result<(), StoreError> {
    let sql = match self.kind {
      TierKind::Record => "DELETE FROM record_cache",
      TierKind::Blob => "DELETE FROM blob_cache",
    };
    self.db.with_conn(|conn| {
      conn.execute(sql, [])?;
      Ok(())
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn tier(kind: TierKind, quota: u64) -> SqliteTier {
    SqliteTier::new(Arc::new(Database::open_in_memory().unwrap()), kind, quota)
  }

  #[test]
  fn test_write_then_read() {
    let tier = tier(TierKind::Record, 1024);
    tier.write("invoices", b"[1,2,3]").unwrap();
    let cached = tier.read("invoices").unwrap().unwrap();
    assert_eq!(cached.data, b"[1,2,3]");
    assert!(cached.is_fresh(chrono::Duration::minutes(1)));
    assert!(!cached.is_fresh(chrono::Duration::zero()));
  }

  #[test]
  fn test_quota_rejects_oversized_write() {
    let tier = tier(TierKind::Record, 8);
    let err = tier.write("invoices", b"0123456789").unwrap_err();
    assert!(matches!(err, StoreError::QuotaExceeded { needed: 10, limit: 8, .. }));
    assert!(tier.read("invoices").unwrap().is_none());
  }

  #[test]
  fn test_quota_counts_other_keys_only() {
    let tier = tier(TierKind::Record, 10);
    tier.write("a", b"12345").unwrap();
    // Overwriting the same key doesn't double count it
    tier.write("a", b"123456").unwrap();
    tier.write("b", b"1234").unwrap();
    assert!(tier.write("c", b"1").is_err());
  }

  #[test]
  fn test_blob_keys_are_hashed() {
    let tier = tier(TierKind::Blob, 1024);
    let key = "history/invoices/2019-2024 full export";
    tier.write(key, b"{}").unwrap();
    assert!(tier.read(key).unwrap().is_some());

    let stored: String = tier
      .db
      .with_conn(|conn| {
        conn
          .query_row("SELECT key_hash FROM blob_cache", [], |row| row.get(0))
          .map_err(StoreError::from)
      })
      .unwrap();
    assert_eq!(stored.len(), 64);
    assert_eq!(stored, hash_key(key));
  }

  #[test]
  fn test_remove_and_clear() {
    let tier = tier(TierKind::Blob, 1024);
    tier.write("a", b"1").unwrap();
    tier.write("b", b"2").unwrap();
    tier.remove("a").unwrap();
    assert!(tier.read("a").unwrap().is_none());
    assert!(tier.read("b").unwrap().is_some());
    tier.clear().unwrap();
    assert!(tier.read("b").unwrap().is_none());
  }

  #[test]
  fn test_noop_tier_always_misses() {
    NoopTier.write("a", b"1").unwrap();
    assert!(NoopTier.read("a").unwrap().is_none());
  }
}
