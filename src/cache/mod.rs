//! Tiered caching for collection lists.
//!
//! This module provides a best-effort cache that:
//! - Keeps whole collections (e.g. "all invoices") for fast first paint
//! - Expires entries after a TTL, and drops them on every mutation
//! - Spills payloads that exceed the small tier's quota into a larger tier
//! - Degrades to a miss whenever storage misbehaves

mod layer;
mod storage;
mod traits;

pub use layer::{BlobStore, TieredCache};
pub use storage::{NoopTier, SqliteTier, TierKind};
pub use traits::{CacheTier, CachedBytes};
