//! Two-tier cache: a small TTL-bounded tier for collection lists and a larger
//! keyed tier for payloads that don't fit the first tier's quota.

use chrono::Duration;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

use super::storage::{NoopTier, SqliteTier, TierKind};
use super::traits::{CacheTier, CachedBytes};
use crate::config::CacheConfig;
use crate::db::Database;
use crate::error::StoreError;

/// Key prefix for collections that overflowed into the blob tier.
const OVERFLOW_PREFIX: &str = "collection:";

/// Cache layer that the pipeline reads through and invalidates.
///
/// Every operation is best-effort. Failures are logged and reported as a miss
/// (reads) or silently skipped (writes); the cache never blocks the operation
/// it was trying to accelerate.
#[derive(Clone)]
pub struct TieredCache {
  records: Arc<dyn CacheTier>,
  blobs: BlobStore,
  /// How long a cached collection stays fresh
  ttl: Duration,
}

impl TieredCache {
  pub fn new(records: Arc<dyn CacheTier>, blobs: Arc<dyn CacheTier>, ttl: Duration) -> Self {
    Self {
      records,
      blobs: BlobStore { tier: blobs },
      ttl,
    }
  }

  /// Both tiers backed by the shared SQLite database.
  pub fn sqlite(db: Arc<Database>, config: &CacheConfig) -> Self {
    Self::new(
      Arc::new(SqliteTier::new(
        Arc::clone(&db),
        TierKind::Record,
        config.record_quota_bytes,
      )),
      Arc::new(SqliteTier::new(db, TierKind::Blob, config.blob_quota_bytes)),
      config.ttl(),
    )
  }

  /// A cache that stores nothing, for when storage could not be opened.
  pub fn disabled(ttl: Duration) -> Self {
    Self::new(Arc::new(NoopTier), Arc::new(NoopTier), ttl)
  }

  pub fn ttl(&self) -> Duration {
    self.ttl
  }

  /// The larger keyed tier.
  pub fn blobs(&self) -> &BlobStore {
    &self.blobs
  }

  /// Get a cached collection if it was written less than `max_age` ago.
  pub fn get_collection<T: DeserializeOwned>(&self, name: &str, max_age: Duration) -> Option<Vec<T>> {
    let cached = match self.records.read(name) {
      Ok(Some(cached)) => Some(cached),
      Ok(None) => self.blobs.read_fresh(&overflow_key(name), max_age),
      Err(e) => {
        tracing::warn!(collection = name, tier = self.records.name(), error = %e, "Cache read failed");
        None
      }
    }?;

    if !cached.is_fresh(max_age) {
      tracing::debug!(collection = name, "Cached collection expired");
      return None;
    }

    match serde_json::from_slice(&cached.data) {
      Ok(data) => Some(data),
      Err(e) => {
        tracing::warn!(collection = name, error = %e, "Dropping undecodable cache entry");
        self.invalidate(name);
        None
      }
    }
  }

  /// Overwrite the cached copy of a collection with a fresh timestamp.
  ///
  /// Payloads over the record tier's quota overflow into the blob tier.
  pub fn put_collection<T: Serialize>(&self, name: &str, data: &[T]) {
    let bytes = match serde_json::to_vec(data) {
      Ok(bytes) => bytes,
      Err(e) => {
        tracing::warn!(collection = name, error = %e, "Failed to serialize collection for cache");
        return;
      }
    };

    match self.records.write(name, &bytes) {
      Ok(()) => {
        // Drop any overflow copy left by an earlier oversized write
        if let Err(e) = self.blobs.tier.remove(&overflow_key(name)) {
          tracing::warn!(
            collection = name,
            tier = self.blobs.tier.name(),
            error = %e,
            "Failed to drop overflow copy"
          );
        }
      }
      Err(StoreError::QuotaExceeded { needed, limit, .. }) => {
        tracing::info!(
          collection = name,
          needed,
          limit,
          "Collection exceeds record tier quota, using blob tier"
        );
        if let Err(e) = self.records.remove(name) {
          tracing::warn!(
            collection = name,
            tier = self.records.name(),
            error = %e,
            "Failed to drop stale record entry"
          );
        }
        if let Err(e) = self.blobs.tier.write(&overflow_key(name), &bytes) {
          tracing::warn!(collection = name, error = %e, "Skipping cache write");
        }
      }
      Err(e) => {
        tracing::warn!(collection = name, error = %e, "Skipping cache write");
      }
    }
  }

  /// Drop the cached copy of a collection from both tiers.
  pub fn invalidate(&self, name: &str) {
    if let Err(e) = self.records.remove(name) {
      tracing::warn!(collection = name, tier = self.records.name(), error = %e, "Cache invalidation failed");
    }
    if let Err(e) = self.blobs.tier.remove(&overflow_key(name)) {
      tracing::warn!(collection = name, tier = self.blobs.tier.name(), error = %e, "Cache invalidation failed");
    }
  }

  /// Empty both tiers.
  pub fn clear(&self) {
    if let Err(e) = self.records.clear() {
      tracing::warn!(tier = self.records.name(), error = %e, "Failed to clear cache tier");
    }
    self.blobs.clear();
  }
}

fn overflow_key(name: &str) -> String {
  format!("{}{}", OVERFLOW_PREFIX, name)
}

/// The larger-capacity tier, addressed by arbitrary string keys.
#[derive(Clone)]
pub struct BlobStore {
  tier: Arc<dyn CacheTier>,
}

impl BlobStore {
  fn read_fresh(&self, key: &str, max_age: Duration) -> Option<CachedBytes> {
    match self.tier.read(key) {
      Ok(cached) => cached.filter(|c| c.is_fresh(max_age)),
      Err(e) => {
        tracing::warn!(key, tier = self.tier.name(), error = %e, "Cache read failed");
        None
      }
    }
  }

  pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    let cached = match self.tier.read(key) {
      Ok(cached) => cached?,
      Err(e) => {
        tracing::warn!(key, tier = self.tier.name(), error = %e, "Cache read failed");
        return None;
      }
    };
    serde_json::from_slice(&cached.data)
      .map_err(|e| tracing::warn!(key, error = %e, "Undecodable blob entry"))
      .ok()
  }

  /// Store `value` under `key`. Returns whether it was stored.
  pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
    let result = serde_json::to_vec(value)
      .map_err(StoreError::from)
      .and_then(|bytes| self.tier.write(key, &bytes));
    match result {
      Ok(()) => true,
      Err(e) => {
        tracing::warn!(key, tier = self.tier.name(), error = %e, "Skipping cache write");
        false
      }
    }
  }

  pub fn delete(&self, key: &str) {
    if let Err(e) = self.tier.remove(key) {
      tracing::warn!(key, tier = self.tier.name(), error = %e, "Failed to delete cache entry");
    }
  }

  pub fn clear(&self) {
    if let Err(e) = self.tier.clear() {
      tracing::warn!(tier = self.tier.name(), error = %e, "Failed to clear cache tier");
    }
  }

  /// Time since `key` was written, if present.
  pub fn age(&self, key: &str) -> Option<Duration> {
    self.tier.read(key).ok().flatten().map(|c| c.age())
  }
}
