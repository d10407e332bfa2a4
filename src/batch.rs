//! Bulk adds and deletes in bounded concurrent windows.
//!
//! Windows run one after another; the requests inside a window run
//! concurrently. A failed record is logged and kept locally without aborting
//! the rest of the batch. The caller gets the optimistic result immediately
//! and a [`BackgroundTask`] reporting what actually happened.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;

use crate::error::RemoteError;
use crate::model::Entity;
use crate::pipeline::Context;
use crate::task::BackgroundTask;

/// How a batch was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPath {
  /// Windowed remote requests
  Remote,
  /// Offline: written straight to the local database
  Local,
  /// The remote run blew up before finishing; everything was written locally
  LocalAfterFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
  pub id: String,
  pub error: String,
}

/// Summary of a finished batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
  pub path: BatchPath,
  pub attempted: usize,
  pub succeeded: usize,
  pub failed: Vec<RecordFailure>,
  /// Number of remote windows sent (zero off the remote path)
  pub windows: usize,
}

impl BatchReport {
  fn local(path: BatchPath, attempted: usize) -> Self {
    Self {
      path,
      attempted,
      succeeded: attempted,
      failed: Vec::new(),
      windows: 0,
    }
  }

  /// Whether every record went through the remote backend.
  pub fn fully_remote(&self) -> bool {
    self.path == BatchPath::Remote && self.failed.is_empty()
  }
}

/// A submitted batch: the optimistic result plus the work in flight.
#[derive(Debug)]
pub struct Batch<T> {
  /// What the caller's view should show right away
  pub optimistic: Vec<T>,
  pub task: BackgroundTask<BatchReport>,
}

#[derive(Clone)]
pub struct BatchExecutor {
  ctx: Arc<Context>,
  add_window: usize,
  delete_window: usize,
}

impl BatchExecutor {
  pub(crate) fn new(ctx: Arc<Context>, add_window: usize, delete_window: usize) -> Self {
    Self {
      ctx,
      add_window: add_window.max(1),
      delete_window: delete_window.max(1),
    }
  }

  /// Add many records. Must be called from within a tokio runtime.
  pub fn bulk_add<T: Entity>(&self, records: Vec<T>) -> Batch<T> {
    let records: Vec<T> = records
      .into_iter()
      .map(|mut record| {
        record.ensure_id();
        record
      })
      .collect();

    // The optimistic view is already ahead of whatever is cached
    self.ctx.cache.invalidate(T::COLLECTION.as_str());
    let ctx = Arc::clone(&self.ctx);
    let window = self.add_window;
    let work = records.clone();
    Batch {
      optimistic: records,
      task: BackgroundTask::spawn(async move { run_add(ctx, work, window).await }),
    }
  }

  /// Delete many records by id. Must be called from within a tokio runtime.
  pub fn bulk_delete<T: Entity>(&self, ids: Vec<String>) -> Batch<String> {
    self.ctx.cache.invalidate(T::COLLECTION.as_str());
    let ctx = Arc::clone(&self.ctx);
    let window = self.delete_window;
    let work = ids.clone();
    Batch {
      optimistic: ids,
      task: BackgroundTask::spawn(async move { run_delete::<T>(ctx, work, window).await }),
    }
  }
}

async fn run_add<T: Entity>(ctx: Arc<Context>, records: Vec<T>, window: usize) -> BatchReport {
  let name = T::COLLECTION.as_str();

  let report = if !ctx.is_online().await {
    write_all_locally(&ctx, &records, BatchPath::Local)
  } else {
    let remote = tokio::spawn(windowed_add(Arc::clone(&ctx), records.clone(), window));
    match remote.await {
      Ok(report) => report,
      Err(e) => {
        tracing::warn!(collection = name, error = %e, "Bulk add failed, saving batch locally");
        write_all_locally(&ctx, &records, BatchPath::LocalAfterFailure)
      }
    }
  };

  ctx.cache.invalidate(name);
  summarize(name, "add", &report);
  report
}

async fn windowed_add<T: Entity>(ctx: Arc<Context>, records: Vec<T>, window: usize) -> BatchReport {
  let name = T::COLLECTION.as_str();
  let mut failed = Vec::new();
  let mut unsaved: Vec<T> = Vec::new();
  let mut windows = 0;

  for chunk in records.chunks(window) {
    windows += 1;
    let results = join_all(chunk.iter().map(|record| {
      let api = &ctx.api;
      async move { (record, api.create(record).await) }
    }))
    .await;

    for (record, result) in results {
      if let Err(e) = result {
        tracing::warn!(collection = name, id = record.id(), error = %e, "Bulk add: record failed");
        failed.push(failure(record.id(), &e));
        unsaved.push(record.clone());
      }
    }
  }

  if !unsaved.is_empty() {
    if let Err(e) = ctx.local.upsert_all(&unsaved) {
      tracing::error!(collection = name, count = unsaved.len(), error = %e, "Failed to keep records locally");
    }
  }

  finish_remote(&ctx, records.len(), failed, windows)
}

async fn run_delete<T: Entity>(ctx: Arc<Context>, ids: Vec<String>, window: usize) -> BatchReport {
  let name = T::COLLECTION.as_str();

  let report = if !ctx.is_online().await {
    delete_all_locally::<T>(&ctx, &ids, BatchPath::Local)
  } else {
    let remote = tokio::spawn(windowed_delete::<T>(Arc::clone(&ctx), ids.clone(), window));
    match remote.await {
      Ok(report) => report,
      Err(e) => {
        tracing::warn!(collection = name, error = %e, "Bulk delete failed, deleting locally");
        delete_all_locally::<T>(&ctx, &ids, BatchPath::LocalAfterFailure)
      }
    }
  };

  ctx.cache.invalidate(name);
  summarize(name, "delete", &report);
  report
}

async fn windowed_delete<T: Entity>(
  ctx: Arc<Context>,
  ids: Vec<String>,
  window: usize,
) -> BatchReport {
  let name = T::COLLECTION.as_str();
  let mut failed = Vec::new();
  let mut windows = 0;

  for chunk in ids.chunks(window) {
    windows += 1;
    let results = join_all(chunk.iter().map(|id| {
      let api = &ctx.api;
      async move { (id, api.delete(T::COLLECTION, id).await) }
    }))
    .await;

    for (id, result) in results {
      if let Err(e) = result {
        tracing::warn!(collection = name, id = %id, error = %e, "Bulk delete: record failed");
        failed.push(failure(id, &e));
      }
    }
  }

  if !failed.is_empty() {
    let failed_ids: Vec<String> = failed.iter().map(|f| f.id.clone()).collect();
    if let Err(e) = ctx.local.remove_all::<T>(&failed_ids) {
      tracing::error!(collection = name, error = %e, "Failed to apply deletes locally");
    }
  }

  finish_remote(&ctx, ids.len(), failed, windows)
}

fn failure(id: &str, error: &RemoteError) -> RecordFailure {
  RecordFailure {
    id: id.to_string(),
    error: error.to_string(),
  }
}

fn finish_remote(
  ctx: &Context,
  attempted: usize,
  failed: Vec<RecordFailure>,
  windows: usize,
) -> BatchReport {
  let succeeded = attempted - failed.len();
  if succeeded > 0 {
    ctx.connectivity.record(true);
  } else if attempted > 0 {
    ctx.connectivity.record(false);
  }
  BatchReport {
    path: BatchPath::Remote,
    attempted,
    succeeded,
    failed,
    windows,
  }
}

fn write_all_locally<T: Entity>(ctx: &Context, records: &[T], path: BatchPath) -> BatchReport {
  match ctx.local.upsert_all(records) {
    Ok(()) => BatchReport::local(path, records.len()),
    Err(e) => {
      tracing::error!(collection = T::COLLECTION.as_str(), error = %e, "Bulk add: local write failed");
      all_failed(path, records.iter().map(|r| r.id()), &e.to_string())
    }
  }
}

fn delete_all_locally<T: Entity>(ctx: &Context, ids: &[String], path: BatchPath) -> BatchReport {
  match ctx.local.remove_all::<T>(ids) {
    Ok(_) => BatchReport::local(path, ids.len()),
    Err(e) => {
      tracing::error!(collection = T::COLLECTION.as_str(), error = %e, "Bulk delete: local write failed");
      all_failed(path, ids.iter().map(String::as_str), &e.to_string())
    }
  }
}

fn all_failed<'a>(path: BatchPath, ids: impl Iterator<Item = &'a str>, error: &str) -> BatchReport {
  let failed: Vec<RecordFailure> = ids
    .map(|id| RecordFailure {
      id: id.to_string(),
      error: error.to_string(),
    })
    .collect();
  BatchReport {
    path,
    attempted: failed.len(),
    succeeded: 0,
    failed,
    windows: 0,
  }
}

/// One summary warning per batch that could not fully use the remote.
fn summarize(collection: &str, op: &str, report: &BatchReport) {
  if report.fully_remote() {
    tracing::info!(
      collection,
      op,
      count = report.attempted,
      windows = report.windows,
      "Bulk operation completed"
    );
  } else {
    tracing::warn!(
      collection,
      op,
      path = ?report.path,
      attempted = report.attempted,
      failed = report.failed.len(),
      "Bulk operation could not fully use the remote backend"
    );
  }
}
