//! Query-time orchestration (§2 System Overview, §4): the Quota Gate,
//! Query Fingerprint & Cache, Retrieval Adapter, Planner, Fan-out
//! Executor, Parallel Analyzer, and Response Assembler that together
//! turn one incoming query into a streamed response.

pub mod analyzer;
pub mod assembler;
pub mod cache;
pub mod executor;
pub mod highlight;
pub mod planner;
pub mod quota;
pub mod retrieval;

pub use analyzer::{AnalyzeOptions, AnalyzeOutcome, AnalyzerConfig, ParallelAnalyzer};
pub use assembler::{ResponseAssembler, StreamEvent};
pub use cache::ResponseCache;
pub use executor::FanoutExecutor;
pub use planner::{Planner, PlannerConfig, Strategy};
pub use quota::QuotaGate;
pub use retrieval::{InMemoryRetrievalAdapter, RetrievalAdapter, RetrievalOutcome, RetrievalParams};
