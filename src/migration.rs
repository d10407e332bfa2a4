//! One-time upload of records created while running local-only.
//!
//! Each dataset carries a durable flag once it has been migrated. A run
//! with nothing pending, nothing to send, or no backend is a no-op that sets
//! no flags, so a later start retries.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::error::StoreError;
use crate::model::{Client, Collection, Entity, Expense, Invoice};
use crate::pipeline::Context;
use crate::task::BackgroundTask;

const FLAG_PREFIX: &str = "migrated.";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationOutcome {
  /// Every dataset was migrated in an earlier run
  AlreadyDone,
  /// Pending datasets are all empty
  NothingToMigrate,
  /// The backend is unreachable this run
  Offline,
  Migrated {
    invoices: usize,
    expenses: usize,
    clients: usize,
    response: Value,
  },
  Failed(String),
}

/// Body of the migration request.
#[derive(Debug, Default, Serialize)]
struct MigrationPayload {
  invoices: Vec<Invoice>,
  expenses: Vec<Expense>,
  clients: Vec<Client>,
}

impl MigrationPayload {
  fn is_empty(&self) -> bool {
    self.invoices.is_empty() && self.expenses.is_empty() && self.clients.is_empty()
  }

  /// Datasets that actually carry records.
  fn non_empty(&self) -> Vec<Collection> {
    let mut collections = Vec::new();
    if !self.invoices.is_empty() {
      collections.push(Collection::Invoices);
    }
    if !self.expenses.is_empty() {
      collections.push(Collection::Expenses);
    }
    if !self.clients.is_empty() {
      collections.push(Collection::Clients);
    }
    collections
  }
}

fn flag_name(collection: Collection) -> String {
  format!("{}{}", FLAG_PREFIX, collection.as_str())
}

#[derive(Clone)]
pub struct Migrator {
  ctx: Arc<Context>,
}

impl Migrator {
  pub(crate) fn new(ctx: Arc<Context>) -> Self {
    Self { ctx }
  }

  /// Whether `collection` was migrated in some earlier run.
  pub fn migration_flag(&self, collection: Collection) -> Result<bool, StoreError> {
    Ok(self.ctx.local.flag(&flag_name(collection))?.unwrap_or(false))
  }

  /// [`Migrator::migration_flag`] for display; an unreadable flag reads as not migrated.
  pub fn is_migrated(&self, collection: Collection) -> bool {
    self.migration_flag(collection).unwrap_or_else(|e| {
      tracing::warn!(%collection, error = %e, "Failed to read migration flag");
      false
    })
  }

  /// Run the migration in the background. Must be called from within a tokio runtime.
  pub fn spawn(&self) -> BackgroundTask<MigrationOutcome> {
    let migrator = self.clone();
    BackgroundTask::spawn(async move { migrator.migrate_if_needed().await })
  }

  pub async fn migrate_if_needed(&self) -> MigrationOutcome {
    let outcome = self.run().await;
    match &outcome {
      MigrationOutcome::Migrated {
        invoices,
        expenses,
        clients,
        ..
      } => tracing::info!(invoices, expenses, clients, "Migrated local records"),
      MigrationOutcome::Failed(reason) => {
        tracing::warn!(%reason, "Migration failed, will retry next start")
      }
      other => tracing::debug!(outcome = ?other, "Migration skipped"),
    }
    outcome
  }

  async fn run(&self) -> MigrationOutcome {
    let mut pending = Vec::new();
    for collection in Collection::ALL {
      match self.migration_flag(collection) {
        Ok(true) => {}
        Ok(false) => pending.push(collection),
        // Uploading without knowing the flags could send a dataset twice
        Err(e) => return MigrationOutcome::Failed(format!("reading migration flags: {}", e)),
      }
    }
    if pending.is_empty() {
      return MigrationOutcome::AlreadyDone;
    }

    let payload = match self.collect(&pending) {
      Ok(payload) => payload,
      Err(e) => return MigrationOutcome::Failed(format!("reading local data: {}", e)),
    };
    if payload.is_empty() {
      return MigrationOutcome::NothingToMigrate;
    }

    if !self.ctx.is_online().await {
      return MigrationOutcome::Offline;
    }

    match self.ctx.api.migrate(&payload).await {
      Ok(response) => {
        self.ctx.connectivity.record(true);
        for collection in payload.non_empty() {
          if let Err(e) = self.ctx.local.set_flag(&flag_name(collection), true) {
            tracing::warn!(%collection, error = %e, "Failed to record migration flag");
          }
          self.ctx.cache.invalidate(collection.as_str());
        }
        MigrationOutcome::Migrated {
          invoices: payload.invoices.len(),
          expenses: payload.expenses.len(),
          clients: payload.clients.len(),
          response,
        }
      }
      Err(e) => {
        self.ctx.connectivity.record(false);
        MigrationOutcome::Failed(e.to_string())
      }
    }
  }

  fn collect(&self, pending: &[Collection]) -> Result<MigrationPayload, StoreError> {
    let mut payload = MigrationPayload::default();
    for collection in pending {
      match collection {
        Collection::Invoices => payload.invoices = self.load::<Invoice>()?,
        Collection::Expenses => payload.expenses = self.load::<Expense>()?,
        Collection::Clients => payload.clients = self.load::<Client>()?,
      }
    }
    Ok(payload)
  }

  fn load<T: Entity>(&self) -> Result<Vec<T>, StoreError> {
    self.ctx.local.load()
  }
}
