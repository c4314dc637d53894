//! Postgres-backed persistence for the query-time pipeline: the response
//! cache (§4.1), conversational memory (§4.9 Memory Adapter), and the quota
//! counter store (§4.2). Each concern is a small async trait with a
//! `deadpool-postgres` implementation and an in-memory test double, so the
//! pipeline crate never has to know which one it's talking to.

pub mod cache;
pub mod memory;
pub mod pool;
pub mod quota;

pub use cache::{CacheStore, InMemoryCacheStore, PgCacheStore};
pub use memory::{InMemoryMemoryStore, MemoryStore, PgMemoryStore};
pub use pool::{build_pool, PoolConfig};
pub use quota::{InMemoryQuotaStore, PgQuotaStore, QuotaStore};
