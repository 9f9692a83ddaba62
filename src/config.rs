//! Pipeline configuration.
//!
//! Every threshold the analysis depends on lives here with its documented
//! default, so a run is reproducible from its configuration alone.
//!
//! ```rust,ignore
//! let config = PipelineConfig::from_file("signals.toml")?;
//! // or
//! let config = PipelineConfig::from_env()?;
//! ```

use crate::error::{AnalysisError, Result};
use crate::record::Column;
use crate::timeseries::BucketWidth;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Unified pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Run the independent stages on scoped threads.
    pub parallel: bool,
    pub outliers: OutlierConfig,
    pub network: NetworkConfig,
    pub time_series: TimeSeriesConfig,
    pub county: CountyConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            outliers: OutlierConfig::default(),
            network: NetworkConfig::default(),
            time_series: TimeSeriesConfig::default(),
            county: CountyConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierConfig {
    /// Fields scored independently by the z-score strategy.
    pub zscore_fields: Vec<Column>,
    /// |z| above this is anomalous.
    pub zscore_threshold: f64,
    /// Features the isolation forest sees jointly.
    pub density_fields: Vec<Column>,
    pub contamination: f64,
    pub n_trees: usize,
    pub max_samples: usize,
    pub seed: u64,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            zscore_fields: vec![Column::Amount, Column::Salary, Column::TotalWorth],
            zscore_threshold: 3.0,
            density_fields: vec![Column::Amount],
            contamination: 0.1,
            n_trees: 100,
            max_samples: 256,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// The two relationship endpoints of every transaction.
    pub source: Column,
    pub target: Column,
    pub top_k: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            source: Column::Department,
            target: Column::Vendor,
            top_k: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSeriesConfig {
    pub value_field: Column,
    pub period: usize,
    pub bucket: BucketWidth,
    /// p-value below this means stationary.
    pub stationarity_alpha: f64,
    /// Fixed ADF lag order; `None` picks it by AIC up to Schwert's bound.
    pub adf_lags: Option<usize>,
}

impl Default for TimeSeriesConfig {
    fn default() -> Self {
        Self {
            value_field: Column::Amount,
            period: 12,
            bucket: BucketWidth::Monthly,
            stationarity_alpha: 0.05,
            adf_lags: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountyConfig {
    pub commission_types: Vec<String>,
}

impl Default for CountyConfig {
    fn default() -> Self {
        Self {
            commission_types: vec!["Liquor".to_string(), "Cannabis".to_string()],
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AnalysisError::Config(format!("Failed to read config: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| AnalysisError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Defaults, overridden by `SPENDING_SIGNALS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SPENDING_SIGNALS_ZSCORE_THRESHOLD") {
            config.outliers.zscore_threshold = parse_env("ZSCORE_THRESHOLD", &val)?;
        }

        if let Ok(val) = std::env::var("SPENDING_SIGNALS_CONTAMINATION") {
            config.outliers.contamination = parse_env("CONTAMINATION", &val)?;
        }

        if let Ok(val) = std::env::var("SPENDING_SIGNALS_SEED") {
            config.outliers.seed = parse_env("SEED", &val)?;
        }

        if let Ok(val) = std::env::var("SPENDING_SIGNALS_PERIOD") {
            config.time_series.period = parse_env("PERIOD", &val)?;
        }

        if let Ok(val) = std::env::var("SPENDING_SIGNALS_STATIONARITY_ALPHA") {
            config.time_series.stationarity_alpha = parse_env("STATIONARITY_ALPHA", &val)?;
        }

        if let Ok(val) = std::env::var("SPENDING_SIGNALS_TOP_K") {
            config.network.top_k = parse_env("TOP_K", &val)?;
        }

        if let Ok(val) = std::env::var("SPENDING_SIGNALS_PARALLEL") {
            config.parallel = parse_flag("PARALLEL", &val)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| AnalysisError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| AnalysisError::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let o = &self.outliers;
        if !(o.zscore_threshold > 0.0) {
            return Err(AnalysisError::Config(
                "zscore_threshold must be positive".to_string(),
            ));
        }
        if !(o.contamination > 0.0 && o.contamination <= 0.5) {
            return Err(AnalysisError::Config(format!(
                "contamination must be in (0, 0.5], got {}",
                o.contamination
            )));
        }
        if o.n_trees == 0 || o.max_samples < 2 {
            return Err(AnalysisError::Config(
                "isolation forest needs at least one tree and two samples".to_string(),
            ));
        }
        if o.zscore_fields.iter().chain(&o.density_fields).any(|c| !c.is_numeric()) {
            return Err(AnalysisError::Config(
                "outlier fields must be numeric columns".to_string(),
            ));
        }

        let ts = &self.time_series;
        if ts.period < 2 {
            return Err(AnalysisError::Config("period must be at least 2".to_string()));
        }
        if !ts.value_field.is_numeric() {
            return Err(AnalysisError::Config(format!(
                "time-series value field {} is not numeric",
                ts.value_field
            )));
        }
        if !(ts.stationarity_alpha > 0.0 && ts.stationarity_alpha < 1.0) {
            return Err(AnalysisError::Config(
                "stationarity_alpha must be in (0, 1)".to_string(),
            ));
        }

        let net = &self.network;
        if net.source.is_numeric() || net.target.is_numeric() || net.source == Column::Date
            || net.target == Column::Date
        {
            return Err(AnalysisError::Config(
                "graph endpoints must be categorical columns".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, val: &str) -> Result<T> {
    val.trim().parse().map_err(|_| {
        AnalysisError::Config(format!("SPENDING_SIGNALS_{} has invalid value '{}'", name, val))
    })
}

/// `true`/`false`, also `1`/`0` and `yes`/`no`.
fn parse_flag(name: &str, val: &str) -> Result<bool> {
    match val.trim().to_lowercase().as_str() {
        "1" | "yes" => Ok(true),
        "0" | "no" => Ok(false),
        other => parse_env(name, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = PipelineConfig::default();

        assert_eq!(config.outliers.zscore_threshold, 3.0);
        assert_eq!(config.outliers.contamination, 0.1);
        assert_eq!(config.outliers.seed, 42);
        assert_eq!(config.time_series.period, 12);
        assert_eq!(config.time_series.stationarity_alpha, 0.05);
        assert_eq!(config.network.top_k, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
            parallel = true

            [outliers]
            contamination = 0.05
            zscore_fields = ["salary"]

            [time_series]
            period = 4
            bucket = "quarterly"
            "#,
        )
        .unwrap();

        assert!(config.parallel);
        assert_eq!(config.outliers.contamination, 0.05);
        assert_eq!(config.outliers.zscore_fields, vec![Column::Salary]);
        assert_eq!(config.outliers.n_trees, 100);
        assert_eq!(config.time_series.period, 4);
        assert_eq!(config.time_series.bucket, BucketWidth::Quarterly);
        assert_eq!(config.network.source, Column::Department);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.time_series.period = 1;
        assert!(matches!(config.validate(), Err(AnalysisError::Config(_))));

        let mut config = PipelineConfig::default();
        config.outliers.contamination = 0.9;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.network.target = Column::Amount;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.outliers.density_fields = vec![Column::Vendor];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_roundtrip_through_file() {
        let path = std::env::temp_dir().join(format!(
            "spending-signals-config-{}.toml",
            uuid::Uuid::new_v4()
        ));
        let mut config = PipelineConfig::default();
        config.network.top_k = 3;

        config.to_file(&path).unwrap();
        let loaded = PipelineConfig::from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_parallel_flag_values() {
        assert!(parse_flag("PARALLEL", "true").unwrap());
        assert!(parse_flag("PARALLEL", " TRUE ").unwrap());
        assert!(parse_flag("PARALLEL", "1").unwrap());
        assert!(!parse_flag("PARALLEL", "false").unwrap());
        assert!(!parse_flag("PARALLEL", "0").unwrap());
        assert!(!parse_flag("PARALLEL", "no").unwrap());
        assert!(matches!(
            parse_flag("PARALLEL", "sometimes"),
            Err(AnalysisError::Config(_))
        ));
    }

    #[test]
    fn test_env_parallel_false_stays_sequential() {
        // Only test in the crate that touches this variable.
        std::env::set_var("SPENDING_SIGNALS_PARALLEL", "false");
        let config = PipelineConfig::from_env();
        std::env::set_var("SPENDING_SIGNALS_PARALLEL", "1");
        let enabled = PipelineConfig::from_env();
        std::env::remove_var("SPENDING_SIGNALS_PARALLEL");

        assert!(!config.unwrap().parallel);
        assert!(enabled.unwrap().parallel);
    }
}
