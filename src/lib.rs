// Vantage Risk - Core Library
// Expected-utility lending decisions, append-only audit ledger, and policy
// backtests. Shared by the CLI, the API server, and tests.

pub mod config;
pub mod decision;
pub mod error;
pub mod history;
pub mod ledger;
pub mod logging;
pub mod metrics;
pub mod query;
pub mod scoring;
pub mod service;
pub mod simulation;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use config::ServiceConfig;
pub use decision::{
    expected_utility, Assessment, Decision, DecisionEngine, LoanApplication, DEFAULT_INTEREST_RATE,
};
pub use error::{LendingError, Result};
pub use history::{load_sample, synthesize, write_csv, HistoricalApplication};
pub use ledger::{AuditLedger, AuditSummary, ChainReport, DecisionEntry, DecisionRecord};
pub use metrics::ModelMetrics;
pub use query::{AuditOverview, QueryService};
pub use scoring::{
    ApplicantFeatures, ConstantScorer, FeatureScaler, LogisticScorer, ScoringAdapter,
    UnavailableScorer,
};
pub use service::{DecisionResult, LendingService};
pub use simulation::{BenchmarkPolicy, SimulationBenchmark, SimulationResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
