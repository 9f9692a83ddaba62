// Spending Signals - Core Library
// Anomaly, relationship and trend analysis over public-spending records.
// Exposes all modules for use in the CLI and tests.

pub mod error;
pub mod record;
pub mod config;
pub mod diagnostics;
pub mod loader;       // CSV → RecordTable
pub mod validator;    // Integrity checks
pub mod outlier;      // Z-score + isolation forest
pub mod graph;        // Department ↔ vendor relationship graph
pub mod centrality;   // Degree + betweenness
pub mod timeseries;   // Bucketing, decomposition, ADF
pub mod county;       // Per-county financial profile
pub mod aggregator;   // Single join point
pub mod pipeline;     // run_once
pub mod history;      // SQLite run history

// Re-export commonly used types
pub use error::{AnalysisError, ErrorKind, Result, StageOutcome};
pub use record::{parse_date, Column, ColumnKind, Record, RecordTable};
pub use config::{CountyConfig, NetworkConfig, OutlierConfig, PipelineConfig, TimeSeriesConfig};
pub use diagnostics::{DiagnosticEvent, DiagnosticLevel, Diagnostics};
pub use loader::{load_csv, load_csv_reader};
pub use validator::{QualityIssue, Severity, ValidationReport, Validator};
pub use outlier::{
    detect, AnomalyResult, AnomalySet, IsolationForestStrategy, OutlierDetector,
    OutlierStrategy, ZScoreStrategy,
};
pub use graph::{Edge, GraphBuilder, Node, RelationshipGraph};
pub use centrality::{CentralityScore, GraphAnalyzer, NetworkAnalysis};
pub use timeseries::{
    adf_test, schwert_max_lag, AdfResult, BucketWidth, Decomposer, SeriesDecomposition,
};
pub use county::{
    pearson_correlation, CommissionSupport, CountyProfile, CountyProfiler, CountyStats, CountySummary,
    ServiceDiscrepancy,
};
pub use aggregator::{aggregate, AggregatedReport, ReportTable};
pub use pipeline::run_once;
pub use history::{find_by_fingerprint, get_run, get_runs, record_run, setup_database, RunRecord};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
