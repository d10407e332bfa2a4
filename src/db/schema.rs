/// Schema for the local database. Every statement is idempotent.
pub const SCHEMA: &str = r#"
-- Local emulated database: one JSON array per entity collection
CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Small TTL-bounded tier holding serialized collection lists
CREATE TABLE IF NOT EXISTS record_cache (
    cache_key TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    cached_at INTEGER NOT NULL
);

-- Larger tier for oversized payloads, addressed by hashed keys
CREATE TABLE IF NOT EXISTS blob_cache (
    key_hash TEXT PRIMARY KEY,
    cache_key TEXT NOT NULL,
    data BLOB NOT NULL,
    cached_at INTEGER NOT NULL
);

-- Durable booleans (offline override, migration markers)
CREATE TABLE IF NOT EXISTS flags (
    name TEXT PRIMARY KEY,
    value INTEGER NOT NULL,
    set_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
