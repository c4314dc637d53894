//! Data types for the Athenaeum query-time pipeline: identity and quota
//! shapes, query/plan/candidate/cache/memory entities, fingerprinting,
//! and the master error type. No I/O lives here.

mod cache;
mod candidate;
mod config;
mod embedding;
mod error;
mod filter;
mod fingerprint;
mod health;
mod identity;
mod memory;
mod plan;
mod query;
mod quota;

pub use cache::*;
pub use candidate::*;
pub use config::*;
pub use embedding::*;
pub use error::*;
pub use filter::*;
pub use fingerprint::*;
pub use health::*;
pub use identity::*;
pub use memory::*;
pub use plan::*;
pub use query::*;
pub use quota::*;
