//! Entry point that wires the stores together.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;

use crate::batch::BatchExecutor;
use crate::cache::TieredCache;
use crate::config::{BatchConfig, Config};
use crate::connectivity::Connectivity;
use crate::db::{Database, LocalDatabase};
use crate::migration::{MigrationOutcome, Migrator};
use crate::model::{Client, Entity, Expense, Invoice};
use crate::pipeline::{Context, Store};
use crate::remote::ApiClient;
use crate::task::BackgroundTask;

/// Durable flag holding the user's offline override.
pub const OFFLINE_FLAG: &str = "force_offline";

/// The sync layer, constructed once and shared by the application.
pub struct Books {
  ctx: Arc<Context>,
  db: Arc<Database>,
  batch: BatchConfig,
}

impl Books {
  /// Open the on-disk database and build a reqwest-backed client from `config`.
  pub fn open(config: &Config) -> Result<Self> {
    let path = config.data_dir()?.join("books.db");
    let db = Arc::new(Database::open(&path)?);
    let cache = TieredCache::sqlite(Arc::clone(&db), &config.cache);
    let api = ApiClient::from_config(config)?;

    tracing::info!(db = %path.display(), api = %config.api.url, "Opened books");
    Self::from_parts(
      api,
      db,
      cache,
      config.batch.clone(),
      config.force_offline.unwrap_or(false),
    )
  }

  /// Assemble from explicit parts. A persisted offline override takes
  /// precedence over `default_offline`.
  pub fn from_parts(
    api: ApiClient,
    db: Arc<Database>,
    cache: TieredCache,
    batch: BatchConfig,
    default_offline: bool,
  ) -> Result<Self> {
    let local = LocalDatabase::new(Arc::clone(&db));
    let forced_offline = local
      .flag(OFFLINE_FLAG)
      .map_err(|e| eyre!("Failed to read offline override: {}", e))?
      .unwrap_or(default_offline);

    let ctx = Arc::new(Context {
      api,
      connectivity: Connectivity::new(forced_offline),
      cache,
      local,
    });

    Ok(Self { ctx, db, batch })
  }

  pub fn store<T: Entity>(&self) -> Store<T> {
    Store::new(Arc::clone(&self.ctx))
  }

  pub fn invoices(&self) -> Store<Invoice> {
    self.store()
  }

  pub fn expenses(&self) -> Store<Expense> {
    self.store()
  }

  pub fn clients(&self) -> Store<Client> {
    self.store()
  }

  pub fn batch(&self) -> BatchExecutor {
    BatchExecutor::new(
      Arc::clone(&self.ctx),
      self.batch.add_window,
      self.batch.delete_window,
    )
  }

  pub fn migrator(&self) -> Migrator {
    Migrator::new(Arc::clone(&self.ctx))
  }

  /// Start the one-time migration in the background. Must be called from
  /// within a tokio runtime.
  pub fn spawn_migration(&self) -> BackgroundTask<MigrationOutcome> {
    self.migrator().spawn()
  }

  pub fn api(&self) -> &ApiClient {
    &self.ctx.api
  }

  pub fn connectivity(&self) -> &Connectivity {
    &self.ctx.connectivity
  }

  pub fn cache(&self) -> &TieredCache {
    &self.ctx.cache
  }

  pub fn local(&self) -> &LocalDatabase {
    &self.ctx.local
  }

  pub fn database(&self) -> &Arc<Database> {
    &self.db
  }

  /// Whether the remote will be attempted, probing once if needed.
  pub async fn is_online(&self) -> bool {
    self.ctx.is_online().await
  }

  /// Set the offline override and persist it for future sessions.
  pub fn set_offline(&self, offline: bool) {
    self.ctx.connectivity.set_forced_offline(offline);
    if let Err(e) = self.ctx.local.set_flag(OFFLINE_FLAG, offline) {
      tracing::warn!(error = %e, "Failed to persist offline override");
    }
  }

  /// Forget the memoized availability and probe again.
  pub async fn refresh_connectivity(&self) -> bool {
    self.ctx.reprobe().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{books, FakeBackend};

  #[tokio::test]
  async fn test_offline_override_is_persisted() {
    let backend = FakeBackend::new();
    let first = books(&backend, false);
    first.set_offline(true);

    let db = Arc::clone(first.database());
    let second = Books::from_parts(
      ApiClient::new(backend.client()),
      db,
      TieredCache::disabled(chrono::Duration::days(7)),
      BatchConfig::default(),
      false,
    )
    .unwrap();
    assert!(second.connectivity().is_forced_offline());
    assert!(!second.is_online().await);
    assert_eq!(backend.call_count(), 0);
  }

  #[tokio::test]
  async fn test_refresh_reprobes_backend() {
    let backend = FakeBackend::new();
    let books = books(&backend, false);
    backend.set_down(true);
    assert!(!books.is_online().await);

    backend.set_down(false);
    assert!(!books.is_online().await);
    assert!(books.refresh_connectivity().await);
    assert!(books.is_online().await);
  }
}
