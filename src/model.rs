//! Bookkeeping records persisted through the sync layer.
//!
//! Field names serialize in camelCase so the JSON matches the remote API.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The entity collections the pipeline owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
  Invoices,
  Expenses,
  Clients,
}

impl Collection {
  pub const ALL: [Collection; 3] = [Self::Invoices, Self::Expenses, Self::Clients];

  /// Path segment, cache name and local database key.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Invoices => "invoices",
      Self::Expenses => "expenses",
      Self::Clients => "clients",
    }
  }
}

impl fmt::Display for Collection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Collection {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "invoices" | "invoice" | "i" => Ok(Self::Invoices),
      "expenses" | "expense" | "e" => Ok(Self::Expenses),
      "clients" | "client" | "builders" | "c" => Ok(Self::Clients),
      other => Err(format!("unknown collection '{}'", other)),
    }
  }
}

/// A record type that lives in one of the [`Collection`]s.
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  const COLLECTION: Collection;

  fn id(&self) -> &str;

  /// Assign a fresh id if the record has none yet.
  fn ensure_id(&mut self);
}

fn new_id() -> String {
  uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
  #[default]
  Draft,
  Sent,
  Paid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceItem {
  pub id: String,
  pub description: String,
  pub quantity: f64,
  pub rate: f64,
  pub amount: f64,
}

impl InvoiceItem {
  /// quantity x rate; callers keep `amount` in sync before submitting.
  pub fn computed_amount(&self) -> f64 {
    self.quantity * self.rate
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
  #[serde(default)]
  pub id: String,
  pub invoice_number: String,
  pub client_name: String,
  #[serde(default)]
  pub client_email: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub project_details: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub payment_link: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub check_number: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub date_paid: Option<String>,
  pub date: String,
  pub due_date: String,
  #[serde(default)]
  pub items: Vec<InvoiceItem>,
  pub total: f64,
  #[serde(default)]
  pub status: InvoiceStatus,
}

impl Invoice {
  pub fn items_total(&self) -> f64 {
    self.items.iter().map(|item| item.amount).sum()
  }
}

impl Entity for Invoice {
  const COLLECTION: Collection = Collection::Invoices;

  fn id(&self) -> &str {
    &self.id
  }

  fn ensure_id(&mut self) {
    if self.id.is_empty() {
      self.id = new_id();
    }
    for item in &mut self.items {
      if item.id.is_empty() {
        item.id = new_id();
      }
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub street: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub city: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub state: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub zip: Option<String>,
}

/// A builder/client the business invoices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
  #[serde(default)]
  pub id: String,
  pub company_name: String,
  #[serde(default)]
  pub email: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub check_payor_name: Option<String>,
  #[serde(default, flatten)]
  pub address: Address,
}

impl Entity for Client {
  const COLLECTION: Collection = Collection::Clients;

  fn id(&self) -> &str {
    &self.id
  }

  fn ensure_id(&mut self) {
    if self.id.is_empty() {
      self.id = new_id();
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
  #[serde(default)]
  pub id: String,
  pub date: String,
  pub payee: String,
  pub category: String,
  pub amount: f64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

impl Entity for Expense {
  const COLLECTION: Collection = Collection::Expenses;

  fn id(&self) -> &str {
    &self.id
  }

  fn ensure_id(&mut self) {
    if self.id.is_empty() {
      self.id = new_id();
    }
  }
}
