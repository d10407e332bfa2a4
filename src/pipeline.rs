//! Per-entity CRUD surface.
//!
//! Every call tries the remote backend first and degrades to the local
//! database on any failure. Internally each path returns an [`Outcome`] so the
//! fallback is visible to tests and logs; the public methods collapse it to a
//! plain value and never fail, except for a read that neither side can serve.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::cache::TieredCache;
use crate::connectivity::Connectivity;
use crate::db::LocalDatabase;
use crate::error::BooksError;
use crate::model::{Collection, Entity};
use crate::remote::ApiClient;

/// Collection used for the availability probe.
const PROBE_COLLECTION: Collection = Collection::Invoices;

/// Which path produced a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
  /// Served from a live cache entry
  Cached(T),
  /// The remote backend handled the call
  Remote(T),
  /// Offline by choice or by memoized probe; the local database handled it
  Local(T),
  /// The remote attempt failed and the local database handled it
  LocalFallback(T),
  /// Neither path worked
  Failed(String),
}

impl<T> Outcome<T> {
  pub fn value(self) -> Option<T> {
    match self {
      Self::Cached(v) | Self::Remote(v) | Self::Local(v) | Self::LocalFallback(v) => Some(v),
      Self::Failed(_) => None,
    }
  }

  pub fn is_remote(&self) -> bool {
    matches!(self, Self::Remote(_))
  }

  pub fn is_fallback(&self) -> bool {
    matches!(self, Self::LocalFallback(_))
  }
}

/// Everything the pipeline, batch executor and migration share.
pub(crate) struct Context {
  pub(crate) api: ApiClient,
  pub(crate) connectivity: Connectivity,
  pub(crate) cache: TieredCache,
  pub(crate) local: LocalDatabase,
}

impl Context {
  /// Whether the remote should be attempted, probing once if needed.
  pub(crate) async fn is_online(&self) -> bool {
    self
      .connectivity
      .is_available(|| self.api.probe(PROBE_COLLECTION))
      .await
  }

  /// Probe again regardless of the memoized result.
  pub(crate) async fn reprobe(&self) -> bool {
    self
      .connectivity
      .refresh(|| self.api.probe(PROBE_COLLECTION))
      .await
  }
}

/// The CRUD surface for one entity type.
pub struct Store<T> {
  ctx: Arc<Context>,
  _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Store<T> {
  fn clone(&self) -> Self {
    Self {
      ctx: Arc::clone(&self.ctx),
      _marker: PhantomData,
    }
  }
}

impl<T: Entity> Store<T> {
  pub(crate) fn new(ctx: Arc<Context>) -> Self {
    Self {
      ctx,
      _marker: PhantomData,
    }
  }

  fn name(&self) -> &'static str {
    T::COLLECTION.as_str()
  }

  /// List the collection.
  ///
  /// Returns the cached copy when `force_fresh` is false and it is younger
  /// than the TTL. Remote and local failures are absorbed; the only error is
  /// a collection that neither path can read.
  pub async fn list(&self, force_fresh: bool) -> Result<Vec<T>, BooksError> {
    match self.fetch(force_fresh).await {
      Outcome::Failed(reason) => {
        tracing::error!(collection = self.name(), %reason, "Collection unreadable");
        Err(BooksError::Unreadable {
          collection: self.name(),
          reason,
        })
      }
      outcome => Ok(outcome.value().unwrap_or_default()),
    }
  }

  /// [`Store::list`] with the serving path exposed.
  pub async fn fetch(&self, force_fresh: bool) -> Outcome<Vec<T>> {
    let ctx = &self.ctx;

    if !force_fresh {
      if let Some(hit) = ctx.cache.get_collection(self.name(), ctx.cache.ttl()) {
        tracing::debug!(collection = self.name(), "Serving cached collection");
        return Outcome::Cached(hit);
      }
    }

    if !ctx.is_online().await {
      return match ctx.local.load() {
        Ok(records) => Outcome::Local(records),
        Err(e) => Outcome::Failed(format!("local: {}", e)),
      };
    }

    match ctx.api.list::<T>().await {
      Ok(records) => {
        ctx.connectivity.record(true);
        ctx.cache.put_collection(self.name(), &records);
        Outcome::Remote(records)
      }
      Err(remote) => {
        ctx.connectivity.record(false);
        tracing::warn!(collection = self.name(), error = %remote, "Remote read failed, using local data");
        match ctx.local.load() {
          Ok(records) => Outcome::LocalFallback(records),
          Err(local) => Outcome::Failed(format!("remote: {}; local: {}", remote, local)),
        }
      }
    }
  }

  /// Create a record. Returns the server's copy, or the record as given when
  /// it was stored locally.
  pub async fn add(&self, mut record: T) -> T {
    record.ensure_id();
    let fallback = record.clone();
    self.try_add(record).await.value().unwrap_or(fallback)
  }

  pub async fn try_add(&self, mut record: T) -> Outcome<T> {
    record.ensure_id();
    let ctx = &self.ctx;
    let outcome = if ctx.connectivity.is_forced_offline() {
      self.store_locally(record, None)
    } else {
      match ctx.api.create(&record).await {
        Ok(saved) => {
          ctx.connectivity.record(true);
          Outcome::Remote(saved)
        }
        Err(e) => {
          ctx.connectivity.record(false);
          self.store_locally(record, Some(e.to_string()))
        }
      }
    };
    ctx.cache.invalidate(self.name());
    outcome
  }

  /// Replace a record. Returns the server's copy, or the record as given when
  /// it was stored locally.
  pub async fn update(&self, record: T) -> T {
    let fallback = record.clone();
    self.try_update(record).await.value().unwrap_or(fallback)
  }

  pub async fn try_update(&self, record: T) -> Outcome<T> {
    let ctx = &self.ctx;
    let outcome = if ctx.connectivity.is_forced_offline() {
      self.store_locally(record, None)
    } else {
      match ctx.api.update(&record).await {
        Ok(saved) => {
          ctx.connectivity.record(true);
          Outcome::Remote(saved)
        }
        Err(e) => {
          ctx.connectivity.record(false);
          self.store_locally(record, Some(e.to_string()))
        }
      }
    };
    ctx.cache.invalidate(self.name());
    outcome
  }

  /// Delete a record by id.
  pub async fn delete(&self, id: &str) {
    if let Outcome::Failed(reason) = self.try_delete(id).await {
      tracing::error!(collection = self.name(), id, %reason, "Delete could not be applied");
    }
  }

  pub async fn try_delete(&self, id: &str) -> Outcome<()> {
    let ctx = &self.ctx;
    let outcome = if ctx.connectivity.is_forced_offline() {
      self.remove_locally(id, None)
    } else {
      match ctx.api.delete(T::COLLECTION, id).await {
        Ok(()) => {
          ctx.connectivity.record(true);
          Outcome::Remote(())
        }
        Err(e) => {
          ctx.connectivity.record(false);
          self.remove_locally(id, Some(e.to_string()))
        }
      }
    };
    ctx.cache.invalidate(self.name());
    outcome
  }

  /// Write to the local database. `remote_error` is set when this is a fallback.
  fn store_locally(&self, record: T, remote_error: Option<String>) -> Outcome<T> {
    if let Some(error) = &remote_error {
      tracing::warn!(collection = self.name(), id = record.id(), %error, "Remote write failed, saved locally");
    }
    match self.ctx.local.upsert(&record) {
      Ok(()) if remote_error.is_some() => Outcome::LocalFallback(record),
      Ok(()) => Outcome::Local(record),
      Err(e) => {
        tracing::error!(collection = self.name(), id = record.id(), error = %e, "Local write failed");
        Outcome::Failed(e.to_string())
      }
    }
  }

  fn remove_locally(&self, id: &str, remote_error: Option<String>) -> Outcome<()> {
    if let Some(error) = &remote_error {
      tracing::warn!(collection = self.name(), id, %error, "Remote delete failed, deleting locally");
    }
    match self.ctx.local.remove::<T>(id) {
      Ok(_) if remote_error.is_some() => Outcome::LocalFallback(()),
      Ok(_) => Outcome::Local(()),
      Err(e) => Outcome::Failed(e.to_string()),
    }
  }
}
