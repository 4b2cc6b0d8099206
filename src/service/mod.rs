pub mod aggregator;
pub mod cache;
pub mod in_flight;
pub mod keyer;
pub mod orchestrator;
pub mod pipeline;
pub mod quota;
pub mod stages;

pub use cache::{CacheStats, CacheStore, EvictionReason};
pub use in_flight::{FlightRole, InFlightRegistry};
pub use keyer::derive_key;
pub use orchestrator::{AnalysisOrchestrator, PreloadSummary};
pub use pipeline::PipelineRunner;
pub use quota::{InMemoryQuotaStore, QuotaGate, QuotaStore};
pub use stages::{
    Collaborators, Crawler, HttpCrawler, RewriteGenerator, SemanticAnalyzer, TrustAnalyzer,
    VisibilityAnalyzer,
};
