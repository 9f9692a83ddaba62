// 📋 Aggregator - single join point of the pipeline
// Pure merge of stage results into one report. Nothing is recomputed here.

use crate::centrality::{CentralityScore, NetworkAnalysis};
use crate::county::{CountyStats, CountySummary};
use crate::error::{Result, StageOutcome};
use crate::outlier::AnomalySet;
use crate::timeseries::SeriesDecomposition;
use crate::validator::ValidationReport;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedReport {
    pub validation: ValidationReport,
    pub anomalies: StageOutcome<AnomalySet>,
    pub network: StageOutcome<NetworkAnalysis>,
    pub time_series: StageOutcome<SeriesDecomposition>,
    pub county: StageOutcome<CountySummary>,
}

/// Flat, string-only table for delimited-text output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportTable {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ReportTable {
    fn new(name: &str, headers: &[&str]) -> Self {
        ReportTable {
            name: name.to_string(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    /// Render as CSV.
    pub fn to_csv(&self) -> std::result::Result<String, csv::Error> {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Merge stage results. A failed validation propagates unchanged; every
/// other stage is recorded as completed, skipped or failed.
pub fn aggregate(
    validation: Result<ValidationReport>,
    anomalies: Result<AnomalySet>,
    network: Result<NetworkAnalysis>,
    time_series: Result<SeriesDecomposition>,
    county: Result<CountySummary>,
) -> Result<AggregatedReport> {
    Ok(AggregatedReport {
        validation: validation?,
        anomalies: StageOutcome::from_result(anomalies),
        network: StageOutcome::from_result(network),
        time_series: StageOutcome::from_result(time_series),
        county: StageOutcome::from_result(county),
    })
}

impl AggregatedReport {
    /// (stage, status, reason) for every stage, in pipeline order.
    pub fn stage_statuses(&self) -> Vec<(&'static str, &str, &str)> {
        vec![
            ("validation", "completed", ""),
            ("anomalies", self.anomalies.status(), self.anomalies.reason()),
            ("network", self.network.status(), self.network.reason()),
            ("time_series", self.time_series.status(), self.time_series.reason()),
            ("county", self.county.status(), self.county.reason()),
        ]
    }

    /// Flat key → value view of the headline numbers.
    pub fn summary(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();

        for (key, value) in self.validation.counts() {
            out.insert(format!("validation.{}", key), value);
        }
        for (stage, status, reason) in self.stage_statuses() {
            out.insert(format!("{}.status", stage), status.to_string());
            if !reason.is_empty() {
                out.insert(format!("{}.reason", stage), reason.to_string());
            }
        }

        if let Some(anomalies) = self.anomalies.result() {
            out.insert("anomalies.scored".to_string(), anomalies.len().to_string());
            out.insert("anomalies.flagged".to_string(), anomalies.flagged_count().to_string());
            out.insert(
                "anomalies.flagged_records".to_string(),
                anomalies.flagged_records().len().to_string(),
            );
            out.insert("anomalies.conflicts".to_string(), anomalies.conflicts().len().to_string());
        }

        if let Some(network) = self.network.result() {
            out.insert("network.nodes".to_string(), network.node_count.to_string());
            out.insert("network.edges".to_string(), network.edge_count.to_string());
            out.insert("network.components".to_string(), network.component_count.to_string());
            out.insert("network.density".to_string(), network.density.to_string());
            if let Some(top) = network.top_degree.first() {
                out.insert("network.top_degree".to_string(), top.node.clone());
            }
            if let Some(top) = network.top_betweenness.first() {
                out.insert("network.top_betweenness".to_string(), top.node.clone());
            }
        }

        if let Some(series) = self.time_series.result() {
            out.insert("time_series.buckets".to_string(), series.len().to_string());
            match (&series.adf, series.is_stationary) {
                (Some(adf), Some(stationary)) => {
                    out.insert("time_series.adf_statistic".to_string(), adf.statistic.to_string());
                    out.insert("time_series.adf_lags".to_string(), adf.lags.to_string());
                    out.insert("time_series.p_value".to_string(), adf.p_value.to_string());
                    out.insert("time_series.is_stationary".to_string(), stationary.to_string());
                }
                _ => {
                    out.insert(
                        "time_series.adf_error".to_string(),
                        series.adf_error.clone().unwrap_or_default(),
                    );
                }
            }
        }

        if let Some(county) = self.county.result() {
            out.insert("county.counties".to_string(), county.len().to_string());
            for (indicator, status, _) in county.indicator_statuses() {
                out.insert(format!("county.{}", indicator), status.to_string());
            }
            if let Some(r) = county.enforcement_court_correlation.result() {
                out.insert("county.enforcement_court_r".to_string(), r.to_string());
            }
        }

        out
    }

    /// Every stage as flat tables. Stages that did not complete contribute
    /// only their row in `stages`.
    pub fn tables(&self) -> Vec<ReportTable> {
        let mut tables = Vec::new();

        let mut stages = ReportTable::new("stages", &["stage", "status", "reason"]);
        for (stage, status, reason) in self.stage_statuses() {
            stages.push(vec![stage.to_string(), status.to_string(), reason.to_string()]);
        }
        tables.push(stages);

        let mut validation = ReportTable::new("validation", &["check", "value"]);
        for (key, value) in self.validation.counts() {
            validation.push(vec![key, value]);
        }
        tables.push(validation);

        let mut issues = ReportTable::new(
            "validation_issues",
            &["severity", "field", "issue", "recommendation"],
        );
        for issue in &self.validation.issues {
            issues.push(vec![
                format!("{:?}", issue.severity),
                issue.field.clone(),
                issue.issue.clone(),
                issue.recommendation.clone(),
            ]);
        }
        tables.push(issues);

        if let Some(anomalies) = self.anomalies.result() {
            let mut table = ReportTable::new(
                "anomalies",
                &["record_id", "field", "strategy", "score", "is_anomaly"],
            );
            for r in &anomalies.results {
                table.push(vec![
                    r.record_id.to_string(),
                    r.field.clone(),
                    r.strategy.clone(),
                    r.score.to_string(),
                    r.is_anomaly.to_string(),
                ]);
            }
            tables.push(table);
        }

        if let Some(network) = self.network.result() {
            let mut table = ReportTable::new(
                "centrality",
                &["node", "kind", "degree_centrality", "betweenness_centrality"],
            );
            for s in &network.scores {
                table.push(vec![
                    s.node.clone(),
                    s.kind.to_string(),
                    s.degree_centrality.to_string(),
                    s.betweenness_centrality.to_string(),
                ]);
            }
            tables.push(table);
            tables.push(ranking("top_degree", &network.top_degree, |s| s.degree_centrality));
            tables.push(ranking("top_betweenness", &network.top_betweenness, |s| {
                s.betweenness_centrality
            }));
        }

        if let Some(series) = self.time_series.result() {
            let mut table = ReportTable::new(
                "time_series",
                &["bucket", "observed", "trend", "seasonal", "residual"],
            );
            for i in 0..series.len() {
                table.push(vec![
                    series.bucket_labels[i].clone(),
                    series.observed[i].to_string(),
                    series.trend[i].to_string(),
                    series.seasonal[i].to_string(),
                    series.residual[i].to_string(),
                ]);
            }
            tables.push(table);
        }

        if let Some(county) = self.county.result() {
            tables.push(county_table(county));
            tables.extend(county_indicator_tables(county));
        }

        tables
    }
}

fn ranking(name: &str, scores: &[CentralityScore], key: impl Fn(&CentralityScore) -> f64) -> ReportTable {
    let mut table = ReportTable::new(name, &["rank", "node", "score"]);
    for (i, s) in scores.iter().enumerate() {
        table.push(vec![(i + 1).to_string(), s.node.clone(), key(s).to_string()]);
    }
    table
}

fn county_table(summary: &CountySummary) -> ReportTable {
    let commission_types: Vec<String> = summary
        .counties
        .first()
        .map(|c| c.commission_income.keys().cloned().collect())
        .unwrap_or_default();

    let mut headers: Vec<String> = [
        "county",
        "records",
        "salary_mean",
        "salary_median",
        "salary_max",
        "total_worth_mean",
        "total_worth_median",
        "total_worth_max",
        "fees",
        "fines",
    ]
    .iter()
    .map(|h| h.to_string())
    .collect();
    headers.extend(commission_types.iter().map(|t| format!("commission_{}", t.to_lowercase())));

    let stats = |s: &Option<CountyStats>| -> Vec<String> {
        match s {
            Some(s) => vec![s.mean.to_string(), s.median.to_string(), s.max.to_string()],
            None => vec![String::new(); 3],
        }
    };

    let rows = summary
        .counties
        .iter()
        .map(|c| {
            let mut row = vec![c.county.clone(), c.records.to_string()];
            row.extend(stats(&c.salary));
            row.extend(stats(&c.total_worth));
            row.push(c.fees.to_string());
            row.push(c.fines.to_string());
            row.extend(
                commission_types
                    .iter()
                    .map(|t| c.commission_income.get(t).copied().unwrap_or(0.0).to_string()),
            );
            row
        })
        .collect();

    ReportTable {
        name: "county_profiles".to_string(),
        headers,
        rows,
    }
}

/// One status row per indicator, plus a table for each completed one.
fn county_indicator_tables(summary: &CountySummary) -> Vec<ReportTable> {
    let mut indicators = ReportTable::new("county_indicators", &["indicator", "status", "value", "reason"]);
    for (indicator, status, reason) in summary.indicator_statuses() {
        let value = match indicator {
            "enforcement_court_correlation" => summary
                .enforcement_court_correlation
                .result()
                .map(|r| r.to_string())
                .unwrap_or_default(),
            _ => String::new(),
        };
        indicators.push(vec![
            indicator.to_string(),
            status.to_string(),
            value,
            reason.to_string(),
        ]);
    }
    let mut tables = vec![indicators];

    if let Some(rows) = summary.fee_fine_vs_service.result() {
        let mut table = ReportTable::new(
            "fee_fine_vs_service",
            &["county", "fees_and_fines", "service_spending", "discrepancy"],
        );
        for r in rows {
            table.push(vec![
                r.county.clone(),
                r.fees_and_fines.to_string(),
                r.service_spending.to_string(),
                r.discrepancy.to_string(),
            ]);
        }
        tables.push(table);
    }

    if let Some(rows) = summary.commission_support.result() {
        let mut table = ReportTable::new(
            "commission_support",
            &["commission_type", "county", "commission_income", "business_support", "support_ratio"],
        );
        for r in rows {
            table.push(vec![
                r.commission_type.clone(),
                r.county.clone(),
                r.commission_income.to_string(),
                r.business_support.to_string(),
                r.support_ratio.map(|v| v.to_string()).unwrap_or_default(),
            ]);
        }
        tables.push(table);
    }

    tables
}
