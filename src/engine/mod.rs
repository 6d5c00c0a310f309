//! Execution engine for calls to the reasoning service.
//!
//! - [`ResultCache`] memoizes responses per `(code, framework)`
//! - [`RequestGate`] bounds concurrency and per-minute volume, with backoff
//! - [`AnalysisOrchestrator`] ties both together for single and batch analysis

pub mod cache;
pub mod gate;
pub mod orchestrator;
pub mod parse;

pub use cache::{CacheConfig, ResultCache};
pub use gate::{GateConfig, RequestGate};
pub use orchestrator::AnalysisOrchestrator;
