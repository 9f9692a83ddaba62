// 🚀 Pipeline - one full analysis pass over a record table
//
//   validate -> [ outliers | network | time series | county ] -> aggregate
//
// Stages after validation only read the table, so they can run side by side.
// Each run is independent: nothing carries over between invocations.

use crate::aggregator::{aggregate, AggregatedReport};
use crate::centrality::{GraphAnalyzer, NetworkAnalysis};
use crate::config::PipelineConfig;
use crate::county::{CountyProfiler, CountySummary};
use crate::diagnostics::Diagnostics;
use crate::error::{AnalysisError, Result};
use crate::graph::GraphBuilder;
use crate::outlier::{AnomalySet, OutlierDetector};
use crate::record::RecordTable;
use crate::timeseries::{Decomposer, SeriesDecomposition};
use crate::validator::Validator;

/// Run every stage once and merge the results.
///
/// Only a schema error (or invalid configuration) is returned as `Err`;
/// stage-local failures are recorded inside the report.
pub fn run_once(
    table: &RecordTable,
    config: &PipelineConfig,
    diag: &mut Diagnostics,
) -> Result<AggregatedReport> {
    config.validate()?;
    diag.info(format!(
        "run started: {} records, {} columns, parallel={}",
        table.len(),
        table.columns().len(),
        config.parallel
    ));

    let validation = Validator::new().validate(table, diag).map_err(|e| {
        diag.error(format!("aborting run: {}", e));
        e
    })?;

    let (anomalies, network, series, county) = if config.parallel {
        run_parallel(table, config, diag)
    } else {
        run_sequential(table, config, diag)
    };

    let report = aggregate(Ok(validation), anomalies, network, series, county)?;

    for (stage, status, reason) in report.stage_statuses() {
        match status {
            "completed" => diag.debug(format!("{}: completed", stage)),
            _ => diag.warn(format!("{}: {} ({})", stage, status, reason)),
        }
    }

    Ok(report)
}

type StageResults = (
    Result<AnomalySet>,
    Result<NetworkAnalysis>,
    Result<SeriesDecomposition>,
    Result<CountySummary>,
);

fn detect_outliers(table: &RecordTable, config: &PipelineConfig, diag: &mut Diagnostics) -> Result<AnomalySet> {
    OutlierDetector::from_config(&config.outliers).detect(table, diag)
}

fn analyze_network(
    table: &RecordTable,
    config: &PipelineConfig,
    diag: &mut Diagnostics,
) -> Result<NetworkAnalysis> {
    let graph = GraphBuilder::from_config(&config.network).build(table, diag)?;
    GraphAnalyzer::from_config(&config.network).analyze(&graph, diag)
}

fn decompose_series(
    table: &RecordTable,
    config: &PipelineConfig,
    diag: &mut Diagnostics,
) -> Result<SeriesDecomposition> {
    let ts = &config.time_series;
    Decomposer::from_config(ts).decompose(table, ts.value_field, ts.period, diag)
}

fn profile_counties(
    table: &RecordTable,
    config: &PipelineConfig,
    diag: &mut Diagnostics,
) -> Result<CountySummary> {
    CountyProfiler::from_config(&config.county).profile(table, diag)
}

/// Log a stage failure in its own diagnostics before handing the result on.
fn logged<T>(result: Result<T>, diag: &mut Diagnostics) -> Result<T> {
    if let Err(e) = &result {
        diag.warn(e.to_string());
    }
    result
}

fn run_sequential(table: &RecordTable, config: &PipelineConfig, diag: &mut Diagnostics) -> StageResults {
    let mut d = diag.scoped("outliers");
    let anomalies = logged(detect_outliers(table, config, &mut d), &mut d);
    diag.merge(d);

    let mut d = diag.scoped("network");
    let network = logged(analyze_network(table, config, &mut d), &mut d);
    diag.merge(d);

    let mut d = diag.scoped("time_series");
    let series = logged(decompose_series(table, config, &mut d), &mut d);
    diag.merge(d);

    let mut d = diag.scoped("county");
    let county = logged(profile_counties(table, config, &mut d), &mut d);
    diag.merge(d);

    (anomalies, network, series, county)
}

/// Same stages on scoped threads. Child diagnostics are merged in the
/// sequential order, so the report and event order match `run_sequential`.
fn run_parallel(table: &RecordTable, config: &PipelineConfig, diag: &mut Diagnostics) -> StageResults {
    let mut outliers_diag = diag.scoped("outliers");
    let mut network_diag = diag.scoped("network");
    let mut series_diag = diag.scoped("time_series");
    let mut county_diag = diag.scoped("county");

    let results = std::thread::scope(|s| {
        let anomalies = s.spawn(|| logged(detect_outliers(table, config, &mut outliers_diag), &mut outliers_diag));
        let network = s.spawn(|| logged(analyze_network(table, config, &mut network_diag), &mut network_diag));
        let series = s.spawn(|| logged(decompose_series(table, config, &mut series_diag), &mut series_diag));
        let county = s.spawn(|| logged(profile_counties(table, config, &mut county_diag), &mut county_diag));

        (
            join_stage(anomalies.join()),
            join_stage(network.join()),
            join_stage(series.join()),
            join_stage(county.join()),
        )
    });

    diag.merge(outliers_diag);
    diag.merge(network_diag);
    diag.merge(series_diag);
    diag.merge(county_diag);

    results
}

fn join_stage<T>(joined: std::thread::Result<Result<T>>) -> Result<T> {
    joined.unwrap_or_else(|_| {
        Err(AnalysisError::Computation(
            "stage thread panicked".to_string(),
        ))
    })
}
