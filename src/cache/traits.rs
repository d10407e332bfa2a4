//! Core traits and types for the cache tiers.

use chrono::{DateTime, Duration, Utc};

use crate::error::StoreError;

/// Raw bytes read back from a tier, with the time they were written.
#[derive(Debug, Clone)]
pub struct CachedBytes {
  pub data: Vec<u8>,
  pub cached_at: DateTime<Utc>,
}

impl CachedBytes {
  pub fn age(&self) -> Duration {
    Utc::now() - self.cached_at
  }

  /// Whether the entry is younger than `max_age`.
  pub fn is_fresh(&self, max_age: Duration) -> bool {
    self.age() < max_age
  }
}

/// A byte-addressed persistent cache tier.
///
/// Tiers are disposable: anything stored here can vanish without data loss,
/// so callers treat every error as a miss.
pub trait CacheTier: Send + Sync {
  /// Short name used in log events.
  fn name(&self) -> &'static str;

  fn read(&self, key: &str) -> Result<Option<CachedBytes>, StoreError>;

  /// Overwrite `key` with `data`, stamping the current time.
  fn write(&self, key: &str, data: &[u8]) -> Result<(), StoreError>;

  fn remove(&self, key: &str) -> Result<(), StoreError>;

  fn clear(&self) -> Result<(), StoreError>;
}
