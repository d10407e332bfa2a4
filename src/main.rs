use cbsbooks_sync::{logging, Books, Client, Collection, Config, Entity, Expense, Invoice};
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "cbsbooks")]
#[command(about = "Offline-tolerant client for CBS Books invoices, expenses and clients")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/cbsbooks/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Work offline for this run without changing the saved setting
  #[arg(long, global = true)]
  offline: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show availability, offline override and migration state
  Status,
  /// List a collection
  List {
    entity: Collection,
    /// Bypass the cache
    #[arg(long)]
    fresh: bool,
  },
  /// Create a record from a JSON file
  Add { entity: Collection, file: PathBuf },
  /// Replace a record from a JSON file
  Update { entity: Collection, file: PathBuf },
  /// Delete a record by id
  Delete { entity: Collection, id: String },
  /// Bulk-add records from a JSON array file
  Import { entity: Collection, file: PathBuf },
  /// Bulk-delete records by id
  Purge {
    entity: Collection,
    #[arg(required = true)]
    ids: Vec<String>,
  },
  /// Upload locally held data to the backend if not done yet
  Migrate,
  /// Force offline mode on or off (persisted)
  Offline { state: Toggle },
  /// Drop every cached collection
  CacheClear,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Toggle {
  On,
  Off,
}

/// Entity-typed part of a command.
enum EntityOp {
  List { fresh: bool },
  Add(PathBuf),
  Update(PathBuf),
  Delete(String),
  Import(PathBuf),
  Purge(Vec<String>),
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.data_dir()?.join("logs"))?;

  let books = Books::open(&config)?;
  if args.offline {
    books.connectivity().set_forced_offline(true);
  }
  let migration = books.spawn_migration();

  let output = match args.command {
    Command::Status => status(&books).await,
    Command::Migrate => {
      let outcome = migration.wait().await.map_err(|e| eyre!(e))?;
      print_json(&serde_json::to_value(outcome)?)?;
      return Ok(());
    }
    Command::Offline { state } => {
      books.set_offline(matches!(state, Toggle::On));
      json!({ "forced_offline": books.connectivity().is_forced_offline() })
    }
    Command::CacheClear => {
      books.cache().clear();
      json!({ "cleared": true })
    }
    Command::List { entity, fresh } => run(&books, entity, EntityOp::List { fresh }).await?,
    Command::Add { entity, file } => run(&books, entity, EntityOp::Add(file)).await?,
    Command::Update { entity, file } => run(&books, entity, EntityOp::Update(file)).await?,
    Command::Delete { entity, id } => run(&books, entity, EntityOp::Delete(id)).await?,
    Command::Import { entity, file } => run(&books, entity, EntityOp::Import(file)).await?,
    Command::Purge { entity, ids } => run(&books, entity, EntityOp::Purge(ids)).await?,
  };
  print_json(&output)?;

  // Let a startup migration finish rather than cutting it off at exit
  if let Err(e) = migration.wait().await {
    tracing::warn!(error = %e, "Background migration did not complete");
  }
  Ok(())
}

async fn status(books: &Books) -> Value {
  let migrator = books.migrator();
  let migrated: serde_json::Map<String, Value> = Collection::ALL
    .into_iter()
    .map(|c| (c.to_string(), Value::Bool(migrator.is_migrated(c))))
    .collect();
  json!({
    "online": books.is_online().await,
    "forced_offline": books.connectivity().is_forced_offline(),
    "cache_ttl_hours": books.cache().ttl().num_hours(),
    "migrated": migrated,
  })
}

async fn run(books: &Books, entity: Collection, op: EntityOp) -> Result<Value> {
  match entity {
    Collection::Invoices => run_entity::<Invoice>(books, op).await,
    Collection::Expenses => run_entity::<Expense>(books, op).await,
    Collection::Clients => run_entity::<Client>(books, op).await,
  }
}

async fn run_entity<T: Entity>(books: &Books, op: EntityOp) -> Result<Value> {
  let store = books.store::<T>();
  let value = match op {
    EntityOp::List { fresh } => serde_json::to_value(store.list(fresh).await?)?,
    EntityOp::Add(file) => serde_json::to_value(store.add(read_json::<T>(&file)?).await)?,
    EntityOp::Update(file) => {
      let record = read_json::<T>(&file)?;
      if record.id().is_empty() {
        return Err(eyre!("Record in {} has no id", file.display()));
      }
      serde_json::to_value(store.update(record).await)?
    }
    EntityOp::Delete(id) => {
      store.delete(&id).await;
      json!({ "deleted": id })
    }
    EntityOp::Import(file) => {
      let batch = books.batch().bulk_add(read_json::<Vec<T>>(&file)?);
      let submitted = batch.optimistic.len();
      let report = batch.task.wait().await.map_err(|e| eyre!(e))?;
      json!({ "submitted": submitted, "report": report })
    }
    EntityOp::Purge(ids) => {
      let report = books
        .batch()
        .bulk_delete::<T>(ids)
        .task
        .wait()
        .await
        .map_err(|e| eyre!(e))?;
      serde_json::to_value(report)?
    }
  };
  Ok(value)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
  let contents = std::fs::read_to_string(path)
    .map_err(|e| eyre!("Failed to read {}: {}", path.display(), e))?;
  serde_json::from_str(&contents).map_err(|e| eyre!("Failed to parse {}: {}", path.display(), e))
}

fn print_json(value: &Value) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
