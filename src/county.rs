// 🏛️ County Profiler - per-county financial profile
// Salary / total-worth distribution, fees and fines collected, and
// commission income for the configured commission types.
//
// Three indicators need extra columns and are reported on their own:
// fees and fines against public-service spending, business support bought
// by commission income, and the enforcement / court-outcome correlation.

use crate::config::CountyConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{AnalysisError, Result, StageOutcome};
use crate::record::{Column, RecordTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountyStats {
    pub mean: f64,
    pub median: f64,
    pub max: f64,
}

impl CountyStats {
    /// `None` for an empty slice.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let n = sorted.len();
        let median = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        };

        Some(CountyStats {
            mean: sorted.iter().sum::<f64>() / n as f64,
            median,
            max: sorted[n - 1],
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountyProfile {
    pub county: String,
    pub records: usize,
    pub salary: Option<CountyStats>,
    pub total_worth: Option<CountyStats>,
    pub fees: f64,
    pub fines: f64,
    /// Commission type → summed income; every configured type is present.
    pub commission_income: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDiscrepancy {
    pub county: String,
    pub fees_and_fines: f64,
    pub service_spending: f64,
    /// Collected in fees and fines minus spent on public services.
    pub discrepancy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionSupport {
    pub county: String,
    pub commission_type: String,
    pub commission_income: f64,
    /// Business grants plus business loans.
    pub business_support: f64,
    /// Support per unit of commission income; `None` without income.
    pub support_ratio: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountySummary {
    /// Sorted by county name.
    pub counties: Vec<CountyProfile>,
    /// Sorted by county name.
    pub fee_fine_vs_service: StageOutcome<Vec<ServiceDiscrepancy>>,
    /// Grouped by commission type (configured order), then county.
    pub commission_support: StageOutcome<Vec<CommissionSupport>>,
    /// Pearson correlation over every record holding both values.
    pub enforcement_court_correlation: StageOutcome<f64>,
}

impl CountySummary {
    pub fn get(&self, county: &str) -> Option<&CountyProfile> {
        self.counties.iter().find(|c| c.county == county)
    }

    pub fn len(&self) -> usize {
        self.counties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counties.is_empty()
    }

    /// Name, status and reason of each extra indicator.
    pub fn indicator_statuses(&self) -> Vec<(&'static str, &str, &str)> {
        vec![
            (
                "fee_fine_vs_service",
                self.fee_fine_vs_service.status(),
                self.fee_fine_vs_service.reason(),
            ),
            (
                "commission_support",
                self.commission_support.status(),
                self.commission_support.reason(),
            ),
            (
                "enforcement_court_correlation",
                self.enforcement_court_correlation.status(),
                self.enforcement_court_correlation.reason(),
            ),
        ]
    }
}

#[derive(Default)]
struct Accumulator {
    records: usize,
    salary: Vec<f64>,
    total_worth: Vec<f64>,
    fees: f64,
    fines: f64,
    service_spending: f64,
    commission_income: BTreeMap<String, f64>,
    /// Only for commission types seen in this county.
    business_support: BTreeMap<String, f64>,
}

pub struct CountyProfiler {
    commission_types: Vec<String>,
}

impl CountyProfiler {
    pub fn new(commission_types: Vec<String>) -> Self {
        CountyProfiler { commission_types }
    }

    pub fn from_config(config: &CountyConfig) -> Self {
        Self::new(config.commission_types.clone())
    }

    pub fn profile(&self, table: &RecordTable, diag: &mut Diagnostics) -> Result<CountySummary> {
        table.require_columns(&[Column::County])?;

        let mut by_county: BTreeMap<&str, Accumulator> = BTreeMap::new();
        let mut unassigned = 0;

        for record in table.records() {
            let Some(county) = record.text(Column::County) else {
                unassigned += 1;
                continue;
            };
            let acc = by_county.entry(county).or_default();
            acc.records += 1;
            acc.salary.extend(record.salary);
            acc.total_worth.extend(record.total_worth);
            acc.fees += record.fees.unwrap_or(0.0);
            acc.fines += record.fines.unwrap_or(0.0);
            acc.service_spending += record.public_service_spending.unwrap_or(0.0);

            if let Some(kind) = record.commission_type.as_deref() {
                if self.commission_types.iter().any(|t| t == kind) {
                    if let Some(income) = record.commission_income {
                        *acc.commission_income.entry(kind.to_string()).or_insert(0.0) += income;
                    }
                    let support = record.business_grants.unwrap_or(0.0) + record.business_loans.unwrap_or(0.0);
                    *acc.business_support.entry(kind.to_string()).or_insert(0.0) += support;
                }
            }
        }

        if unassigned > 0 {
            diag.warn(format!("{} record(s) have no county", unassigned));
        }

        let fee_fine_vs_service = StageOutcome::from_result(
            table
                .require_columns(&[Column::Fees, Column::Fines, Column::PublicServiceSpending])
                .map(|_| service_discrepancies(&by_county)),
        );
        let commission_support = StageOutcome::from_result(
            table
                .require_columns(&[
                    Column::CommissionType,
                    Column::CommissionIncome,
                    Column::BusinessGrants,
                    Column::BusinessLoans,
                ])
                .map(|_| self.commission_support(&by_county)),
        );
        let enforcement_court_correlation = StageOutcome::from_result(enforcement_court_correlation(table));

        let counties: Vec<CountyProfile> = by_county
            .into_iter()
            .map(|(county, acc)| {
                let mut commission_income = acc.commission_income;
                for kind in &self.commission_types {
                    commission_income.entry(kind.clone()).or_insert(0.0);
                }
                CountyProfile {
                    county: county.to_string(),
                    records: acc.records,
                    salary: CountyStats::from_values(&acc.salary),
                    total_worth: CountyStats::from_values(&acc.total_worth),
                    fees: acc.fees,
                    fines: acc.fines,
                    commission_income,
                }
            })
            .collect();

        let summary = CountySummary {
            counties,
            fee_fine_vs_service,
            commission_support,
            enforcement_court_correlation,
        };
        for (indicator, status, reason) in summary.indicator_statuses() {
            match status {
                "completed" => diag.debug(format!("{}: completed", indicator)),
                _ => diag.info(format!("{}: {} ({})", indicator, status, reason)),
            }
        }

        diag.info(format!("profiled {} counties", summary.len()));
        Ok(summary)
    }

    fn commission_support(&self, by_county: &BTreeMap<&str, Accumulator>) -> Vec<CommissionSupport> {
        let mut rows = Vec::new();
        for kind in &self.commission_types {
            for (county, acc) in by_county {
                let Some(&business_support) = acc.business_support.get(kind) else {
                    continue;
                };
                let commission_income = acc.commission_income.get(kind).copied().unwrap_or(0.0);
                rows.push(CommissionSupport {
                    county: county.to_string(),
                    commission_type: kind.clone(),
                    commission_income,
                    business_support,
                    support_ratio: (commission_income != 0.0).then(|| business_support / commission_income),
                });
            }
        }
        rows
    }
}

impl Default for CountyProfiler {
    fn default() -> Self {
        Self::from_config(&CountyConfig::default())
    }
}

fn service_discrepancies(by_county: &BTreeMap<&str, Accumulator>) -> Vec<ServiceDiscrepancy> {
    by_county
        .iter()
        .map(|(county, acc)| {
            let fees_and_fines = acc.fees + acc.fines;
            ServiceDiscrepancy {
                county: county.to_string(),
                fees_and_fines,
                service_spending: acc.service_spending,
                discrepancy: fees_and_fines - acc.service_spending,
            }
        })
        .collect()
}

fn enforcement_court_correlation(table: &RecordTable) -> Result<f64> {
    table.require_columns(&[Column::EnforcementActions, Column::CourtOutcomes])?;
    let pairs: Vec<(f64, f64)> = table
        .records()
        .iter()
        .filter_map(|r| Some((r.enforcement_actions?, r.court_outcomes?)))
        .collect();
    pearson_correlation(&pairs)
}

/// Pearson correlation over complete pairs.
pub fn pearson_correlation(pairs: &[(f64, f64)]) -> Result<f64> {
    let n = pairs.len();
    if n < 2 {
        return Err(AnalysisError::InsufficientData(format!(
            "correlation needs at least 2 complete pairs, found {}",
            n
        )));
    }

    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n as f64;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n as f64;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for &(x, y) in pairs {
        sxy += (x - mean_x) * (y - mean_y);
        sxx += (x - mean_x).powi(2);
        syy += (y - mean_y).powi(2);
    }

    if sxx == 0.0 || syy == 0.0 {
        return Err(AnalysisError::Computation(
            "correlation undefined for a constant column".to_string(),
        ));
    }
    Ok((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    fn official(county: &str, salary: f64, worth: f64) -> Record {
        Record::default()
            .with_county(county)
            .with_numeric(Column::Amount, 0.0)
            .with_salary(salary)
            .with_numeric(Column::TotalWorth, worth)
    }

    fn local_finances(county: &str, fees: f64, fines: f64, services: f64) -> Record {
        Record::default()
            .with_county(county)
            .with_numeric(Column::Fees, fees)
            .with_numeric(Column::Fines, fines)
            .with_numeric(Column::PublicServiceSpending, services)
    }

    fn commission(county: &str, kind: &str, income: f64, grants: f64, loans: f64) -> Record {
        Record::default()
            .with_county(county)
            .with_text(Column::CommissionType, kind)
            .with_numeric(Column::CommissionIncome, income)
            .with_numeric(Column::BusinessGrants, grants)
            .with_numeric(Column::BusinessLoans, loans)
    }

    #[test]
    fn test_salary_and_worth_stats() {
        let table = RecordTable::from_records(vec![
            official("Adams", 40_000.0, 100_000.0),
            official("Adams", 60_000.0, 300_000.0),
            official("Adams", 80_000.0, 2_000_000.0),
            official("Brown", 55_000.0, 90_000.0),
        ]);

        let summary = CountyProfiler::default()
            .profile(&table, &mut Diagnostics::new())
            .unwrap();

        assert_eq!(summary.len(), 2);
        let adams = summary.get("Adams").unwrap();
        assert_eq!(adams.records, 3);
        assert_eq!(
            adams.salary,
            Some(CountyStats {
                mean: 60_000.0,
                median: 60_000.0,
                max: 80_000.0
            })
        );
        assert_eq!(adams.total_worth.as_ref().unwrap().median, 300_000.0);
        assert_eq!(summary.counties[1].county, "Brown");
    }

    #[test]
    fn test_fees_fines_and_commissions() {
        let table = RecordTable::from_records(vec![
            Record::default()
                .with_county("Clark")
                .with_numeric(Column::Fees, 120.0)
                .with_numeric(Column::Fines, 30.0)
                .with_numeric(Column::CommissionIncome, 500.0)
                .with_text(Column::CommissionType, "Liquor"),
            Record::default()
                .with_county("Clark")
                .with_numeric(Column::Fees, 80.0)
                .with_numeric(Column::CommissionIncome, 250.0)
                .with_text(Column::CommissionType, "Liquor"),
            Record::default()
                .with_county("Clark")
                .with_numeric(Column::CommissionIncome, 999.0)
                .with_text(Column::CommissionType, "Tobacco"),
        ]);

        let summary = CountyProfiler::default()
            .profile(&table, &mut Diagnostics::new())
            .unwrap();
        let clark = summary.get("Clark").unwrap();

        assert_eq!(clark.fees, 200.0);
        assert_eq!(clark.fines, 30.0);
        assert_eq!(clark.commission_income.get("Liquor"), Some(&750.0));
        assert_eq!(clark.commission_income.get("Cannabis"), Some(&0.0));
        assert!(!clark.commission_income.contains_key("Tobacco"));
        assert_eq!(clark.salary, None);
    }

    #[test]
    fn test_fee_fine_vs_service_discrepancy() {
        let table = RecordTable::from_records(vec![
            local_finances("Adams", 500.0, 200.0, 100.0),
            local_finances("Adams", 100.0, 0.0, 50.0),
            local_finances("Brown", 50.0, 25.0, 400.0),
        ]);

        let summary = CountyProfiler::default()
            .profile(&table, &mut Diagnostics::new())
            .unwrap();
        let rows = summary.fee_fine_vs_service.result().unwrap();

        assert_eq!(
            rows[0],
            ServiceDiscrepancy {
                county: "Adams".to_string(),
                fees_and_fines: 800.0,
                service_spending: 150.0,
                discrepancy: 650.0,
            }
        );
        assert_eq!(rows[1].county, "Brown");
        assert_eq!(rows[1].discrepancy, -325.0);
        assert_eq!(summary.commission_support.status(), "skipped");
    }

    #[test]
    fn test_commission_support_ratio() {
        let table = RecordTable::from_records(vec![
            commission("Adams", "Liquor", 1_000.0, 100.0, 50.0),
            commission("Adams", "Liquor", 1_000.0, 0.0, 50.0),
            commission("Brown", "Liquor", 0.0, 10.0, 0.0),
            commission("Brown", "Cannabis", 400.0, 200.0, 200.0),
            commission("Brown", "Tobacco", 900.0, 1.0, 1.0),
        ]);

        let summary = CountyProfiler::default()
            .profile(&table, &mut Diagnostics::new())
            .unwrap();
        let rows = summary.commission_support.result().unwrap();

        let keys: Vec<(&str, &str)> = rows
            .iter()
            .map(|r| (r.commission_type.as_str(), r.county.as_str()))
            .collect();
        assert_eq!(keys, vec![("Liquor", "Adams"), ("Liquor", "Brown"), ("Cannabis", "Brown")]);

        assert_eq!(rows[0].commission_income, 2_000.0);
        assert_eq!(rows[0].business_support, 200.0);
        assert_eq!(rows[0].support_ratio, Some(0.1));
        assert_eq!(rows[1].support_ratio, None);
        assert_eq!(rows[2].support_ratio, Some(1.0));
    }

    #[test]
    fn test_enforcement_court_correlation() {
        let mut records = vec![
            Record::default().with_county("Adams"),
            Record::default().with_county("Adams"),
            Record::default().with_county("Brown"),
            Record::default().with_county("Brown"),
        ];
        for (record, (actions, outcomes)) in records
            .iter_mut()
            .zip([(1.0, Some(2.0)), (2.0, Some(4.0)), (3.0, Some(6.5)), (50.0, None)])
        {
            record.enforcement_actions = Some(actions);
            record.court_outcomes = outcomes;
        }
        let table = RecordTable::from_records(records);

        let summary = CountyProfiler::default()
            .profile(&table, &mut Diagnostics::new())
            .unwrap();
        let r = *summary.enforcement_court_correlation.result().unwrap();

        // The record without a court outcome is left out.
        assert!(r > 0.99 && r <= 1.0, "r = {}", r);
        assert_eq!(summary.fee_fine_vs_service.status(), "skipped");
    }

    #[test]
    fn test_indicators_skipped_without_columns() {
        let table = RecordTable::from_records(vec![official("Adams", 40_000.0, 100_000.0)]);

        let summary = CountyProfiler::default()
            .profile(&table, &mut Diagnostics::new())
            .unwrap();

        for (indicator, status, reason) in summary.indicator_statuses() {
            assert_eq!(status, "skipped", "{}", indicator);
            assert!(!reason.is_empty());
        }
    }

    #[test]
    fn test_pearson_edge_cases() {
        assert_eq!(pearson_correlation(&[(1.0, 3.0), (2.0, 1.0)]).unwrap(), -1.0);
        assert!(matches!(
            pearson_correlation(&[(1.0, 2.0)]),
            Err(AnalysisError::InsufficientData(_))
        ));
        assert!(matches!(
            pearson_correlation(&[(1.0, 2.0), (1.0, 5.0)]),
            Err(AnalysisError::Computation(_))
        ));
    }

    #[test]
    fn test_requires_county_column() {
        let table = RecordTable::from_records(vec![Record::payment("Roads", "Acme", 1.0)]);
        let err = CountyProfiler::default()
            .profile(&table, &mut Diagnostics::new())
            .unwrap_err();
        assert!(matches!(err, AnalysisError::MissingField(_)));
    }
}
