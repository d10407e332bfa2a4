//! In-process stand-in for the books backend, plus record fixtures.

use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::books::Books;
use crate::cache::TieredCache;
use crate::config::{BatchConfig, CacheConfig};
use crate::db::Database;
use crate::error::RemoteError;
use crate::model::{Address, Client, Expense, Invoice, InvoiceStatus};
use crate::remote::{ApiClient, ApiRequest, HttpClient, HttpResponse};

const PREFIX: &str = "/api/cbsbooks/";

#[derive(Debug, Clone)]
pub struct RecordedCall {
  pub method: Method,
  pub path: String,
  pub body: Option<Value>,
}

#[derive(Default)]
struct State {
  collections: HashMap<String, Vec<Value>>,
  calls: Vec<RecordedCall>,
  failing: HashSet<String>,
  panicking: HashSet<String>,
}

/// Backend that keeps collections in memory and records every request.
#[derive(Clone, Default)]
pub struct FakeBackend {
  state: Arc<Mutex<State>>,
  latency: Option<Duration>,
  down: Arc<AtomicBool>,
  html: Arc<AtomicBool>,
  migration_fails: Arc<AtomicBool>,
  in_flight: Arc<AtomicUsize>,
  peak: Arc<AtomicUsize>,
}

impl FakeBackend {
  pub fn new() -> Self {
    Self::default()
  }

  /// Delay every response, so concurrent requests overlap.
  pub fn with_latency(mut self, latency: Duration) -> Self {
    self.latency = Some(latency);
    self
  }

  pub fn client(&self) -> Arc<dyn HttpClient> {
    Arc::new(self.clone())
  }

  fn state(&self) -> MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  pub fn seed<T: Serialize>(&self, collection: &str, records: &[T]) {
    let values = records
      .iter()
      .map(|r| serde_json::to_value(r).unwrap())
      .collect();
    self.state().collections.insert(collection.to_string(), values);
  }

  pub fn calls(&self) -> Vec<RecordedCall> {
    self.state().calls.clone()
  }

  pub fn call_count(&self) -> usize {
    self.state().calls.len()
  }

  pub fn count(&self, method: &str, path: &str) -> usize {
    self
      .state()
      .calls
      .iter()
      .filter(|c| c.method.as_str() == method && c.path == path)
      .count()
  }

  /// Refuse connections.
  pub fn set_down(&self, down: bool) {
    self.down.store(down, Ordering::SeqCst);
  }

  /// Answer everything with a 200 HTML page.
  pub fn serve_html(&self, html: bool) {
    self.html.store(html, Ordering::SeqCst);
  }

  /// Answer writes touching `id` with a 500.
  pub fn fail_id(&self, id: &str) {
    self.state().failing.insert(id.to_string());
  }

  /// Panic while handling a write touching `id`.
  pub fn panic_on(&self, id: &str) {
    self.state().panicking.insert(id.to_string());
  }

  pub fn fail_migration(&self, fail: bool) {
    self.migration_fails.store(fail, Ordering::SeqCst);
  }

  /// Highest number of requests that were being handled at once.
  pub fn peak_in_flight(&self) -> usize {
    self.peak.load(Ordering::SeqCst)
  }

  fn route(&self, request: &ApiRequest) -> HttpResponse {
    let rest = request.path.strip_prefix(PREFIX).unwrap_or(&request.path);
    let (collection, raw_id) = match rest.split_once('/') {
      Some((collection, id)) => (collection, Some(id)),
      None => (rest, None),
    };
    let decoded = raw_id.map(|id| {
      urlencoding::decode(id)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| id.to_string())
    });
    let id = decoded.as_deref();
    let body_id = request
      .body
      .as_ref()
      .and_then(|b| b.get("id"))
      .and_then(Value::as_str)
      .map(String::from);
    let target = id.map(String::from).or(body_id);

    let panics = target
      .as_ref()
      .map(|t| self.state().panicking.contains(t))
      .unwrap_or(false);
    if panics {
      panic!("backend blew up on {}", request.path);
    }

    let mut state = self.state();
    if let Some(target) = &target {
      if request.method != Method::GET && state.failing.contains(target) {
        return error(500, "write rejected");
      }
    }

    match (request.method.as_str(), collection, id) {
      ("GET", collection, None) => {
        let records = state.collections.get(collection).cloned().unwrap_or_default();
        ok(Value::Array(records))
      }
      ("POST", "migrate-localstorage", None) => {
        if self.migration_fails.load(Ordering::SeqCst) {
          error(500, "migration failed")
        } else {
          ok(json!({"success": true}))
        }
      }
      ("POST", "invoices" | "expenses" | "clients", None) | ("PUT", _, Some(_)) => {
        let body = request.body.clone().unwrap_or(Value::Null);
        let records = state.collections.entry(collection.to_string()).or_default();
        match records
          .iter_mut()
          .find(|r| r.get("id").and_then(Value::as_str) == target.as_deref())
        {
          Some(slot) => *slot = body.clone(),
          None => records.push(body.clone()),
        }
        ok(body)
      }
      ("POST", _, None) => ok(request.body.clone().unwrap_or(Value::Null)),
      ("DELETE", collection, Some(id)) => {
        if let Some(records) = state.collections.get_mut(collection) {
          records.retain(|r| r.get("id").and_then(Value::as_str) != Some(id));
        }
        HttpResponse {
          status: 204,
          content_type: None,
          body: String::new(),
        }
      }
      _ => error(404, "not found"),
    }
  }
}

fn ok(body: Value) -> HttpResponse {
  HttpResponse {
    status: 200,
    content_type: Some("application/json; charset=utf-8".into()),
    body: body.to_string(),
  }
}

fn error(status: u16, message: &str) -> HttpResponse {
  HttpResponse {
    status,
    content_type: Some("application/json".into()),
    body: json!({ "error": message }).to_string(),
  }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
  fn drop(&mut self) {
    self.0.fetch_sub(1, Ordering::SeqCst);
  }
}

#[async_trait]
impl HttpClient for FakeBackend {
  async fn execute(&self, request: &ApiRequest) -> Result<HttpResponse, RemoteError> {
    self.state().calls.push(RecordedCall {
      method: request.method.clone(),
      path: request.path.clone(),
      body: request.body.clone(),
    });

    let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    let _guard = InFlight(&self.in_flight);
    self.peak.fetch_max(now, Ordering::SeqCst);

    if let Some(latency) = self.latency {
      tokio::time::sleep(latency).await;
    }

    if self.down.load(Ordering::SeqCst) {
      return Err(RemoteError::Transport("connection refused".into()));
    }
    if self.html.load(Ordering::SeqCst) {
      return Ok(HttpResponse {
        status: 200,
        content_type: Some("text/html".into()),
        body: "<!doctype html><html><body>Not found</body></html>".into(),
      });
    }
    Ok(self.route(request))
  }
}

pub fn invoice(id: &str, total: f64) -> Invoice {
  Invoice {
    id: id.to_string(),
    invoice_number: format!("INV-{}", id),
    client_name: "Acme Builders".into(),
    client_email: "ap@acme.test".into(),
    project_details: None,
    payment_link: None,
    check_number: None,
    date_paid: None,
    date: "2024-03-01".into(),
    due_date: "2024-03-31".into(),
    items: Vec::new(),
    total,
    status: InvoiceStatus::Draft,
  }
}

pub fn expense(id: &str, amount: f64) -> Expense {
  Expense {
    id: id.to_string(),
    date: "2024-03-02".into(),
    payee: "Lumber Yard".into(),
    category: "Materials".into(),
    amount,
    description: None,
  }
}

pub fn client(id: &str, company_name: &str) -> Client {
  Client {
    id: id.to_string(),
    company_name: company_name.to_string(),
    email: format!("{}@builders.test", id),
    check_payor_name: None,
    address: Address::default(),
  }
}

fn assemble(backend: &FakeBackend, db: Database, forced_offline: bool) -> Books {
  let db = Arc::new(db);
  let cache = TieredCache::sqlite(Arc::clone(&db), &CacheConfig::default());
  Books::from_parts(
    ApiClient::new(backend.client()),
    db,
    cache,
    BatchConfig::default(),
    forced_offline,
  )
  .unwrap()
}

/// Books over an in-memory database.
pub fn books(backend: &FakeBackend, forced_offline: bool) -> Books {
  assemble(backend, Database::open_in_memory().unwrap(), forced_offline)
}

/// Books over `dir/books.db`, for tests that reopen the same data.
pub fn on_disk_books(backend: &FakeBackend, dir: &Path, forced_offline: bool) -> Books {
  assemble(backend, Database::open(&dir.join("books.db")).unwrap(), forced_offline)
}
