// ✅ Validator - table integrity checks before analysis
// Counts problems, never fixes or drops rows. Only a structurally missing
// required column is an error.

use crate::diagnostics::Diagnostics;
use crate::error::{AnalysisError, Result};
use crate::record::{parse_date, Column, ColumnKind, RecordTable};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

// ============================================================================
// QUALITY ISSUES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Severity {
    Critical, // Analysis results for this field are unreliable
    Warning,  // Data is questionable or incomplete
    Info,     // Worth a look, not a problem on its own
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: Severity,
    pub field: String,
    pub issue: String,
    pub recommendation: String,
}

// ============================================================================
// VALIDATION REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub total_records: usize,
    /// Null cells across every present column.
    pub missing_values: usize,
    /// Rows identical to an earlier row (first occurrences not counted).
    pub duplicates: usize,
    /// `None` when the table has no date column.
    pub date_format_valid: Option<bool>,
    pub invalid_dates: usize,
    /// Negative-value count per present numeric column.
    pub negative_values: BTreeMap<String, usize>,
    /// Distinct non-null values per present categorical column.
    pub distinct_values: BTreeMap<String, usize>,
    pub issues: Vec<QualityIssue>,
}

impl ValidationReport {
    pub fn summary(&self) -> String {
        format!(
            "{} records: {} missing cells, {} duplicates, dates {} | {} issues ({} critical)",
            self.total_records,
            self.missing_values,
            self.duplicates,
            match self.date_format_valid {
                Some(true) => "valid",
                Some(false) => "INVALID",
                None => "absent",
            },
            self.issues.len(),
            self.issues
                .iter()
                .filter(|i| i.severity == Severity::Critical)
                .count()
        )
    }

    pub fn has_critical_issues(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Critical)
    }

    /// Flat key → count view, one entry per check.
    pub fn counts(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        out.insert("total_records".to_string(), self.total_records.to_string());
        out.insert("missing_values".to_string(), self.missing_values.to_string());
        out.insert("duplicates".to_string(), self.duplicates.to_string());
        if let Some(valid) = self.date_format_valid {
            out.insert("date_format_valid".to_string(), valid.to_string());
            out.insert("invalid_dates".to_string(), self.invalid_dates.to_string());
        }
        for (field, count) in &self.negative_values {
            out.insert(format!("{}_negative_values", field), count.to_string());
        }
        for (field, count) in &self.distinct_values {
            out.insert(format!("{}_distinct_values", field), count.to_string());
        }
        out
    }
}

// ============================================================================
// VALIDATOR
// ============================================================================

pub struct Validator {
    /// Columns that must exist for any analysis to run.
    required: Vec<Column>,
}

impl Validator {
    pub fn new() -> Self {
        Validator {
            required: vec![Column::Amount],
        }
    }

    /// Validate the table and count integrity problems.
    pub fn validate(&self, table: &RecordTable, diag: &mut Diagnostics) -> Result<ValidationReport> {
        self.check_schema(table)?;

        let columns = table.columns();
        let mut issues = Vec::new();

        // Check 1: missing values
        let missing_values: usize = table
            .records()
            .iter()
            .map(|r| columns.iter().filter(|c| r.is_null(**c)).count())
            .sum();
        if missing_values > 0 {
            issues.push(QualityIssue {
                severity: Severity::Warning,
                field: "*".to_string(),
                issue: format!("{} missing cells", missing_values),
                recommendation: "Fill or confirm missing values at the source".to_string(),
            });
        }

        // Check 2: exact duplicate rows
        let duplicates = self.count_duplicates(table);
        if duplicates > 0 {
            issues.push(QualityIssue {
                severity: Severity::Warning,
                field: "*".to_string(),
                issue: format!("{} duplicate rows", duplicates),
                recommendation: "Check for double-entered transactions".to_string(),
            });
        }

        // Check 3: date parseability (table-level verdict)
        let (date_format_valid, invalid_dates) = self.check_dates(table);
        if date_format_valid == Some(false) {
            issues.push(QualityIssue {
                severity: Severity::Critical,
                field: Column::Date.name().to_string(),
                issue: format!("{} unparseable dates", invalid_dates),
                recommendation: "Use YYYY-MM-DD or MM/DD/YYYY".to_string(),
            });
        }

        // Check 4: negative values in numeric columns
        let mut negative_values = BTreeMap::new();
        for column in columns.iter().filter(|c| c.kind() == ColumnKind::Numeric) {
            let negatives = table
                .records()
                .iter()
                .filter(|r| r.numeric(*column).map_or(false, |v| v < 0.0))
                .count();
            if negatives > 0 {
                issues.push(QualityIssue {
                    severity: Severity::Warning,
                    field: column.name().to_string(),
                    issue: format!("{} negative values", negatives),
                    recommendation: "Negative amounts must be explicitly justified".to_string(),
                });
            }
            negative_values.insert(column.name().to_string(), negatives);
        }

        // Check 5: categorical cardinality
        let mut distinct_values = BTreeMap::new();
        for column in columns.iter().filter(|c| c.kind() == ColumnKind::Categorical) {
            let distinct: BTreeSet<&str> = table
                .records()
                .iter()
                .filter_map(|r| r.text(*column))
                .collect();
            if distinct.len() == table.len() && table.len() > 1 && *column == Column::Category {
                issues.push(QualityIssue {
                    severity: Severity::Info,
                    field: column.name().to_string(),
                    issue: "every record has its own category".to_string(),
                    recommendation: "Category looks like a free-text field".to_string(),
                });
            }
            distinct_values.insert(column.name().to_string(), distinct.len());
        }

        let report = ValidationReport {
            total_records: table.len(),
            missing_values,
            duplicates,
            date_format_valid,
            invalid_dates,
            negative_values,
            distinct_values,
            issues,
        };

        diag.info(format!("validation completed: {}", report.summary()));
        Ok(report)
    }

    fn check_schema(&self, table: &RecordTable) -> Result<()> {
        for column in &self.required {
            if !table.has_column(*column) {
                return Err(AnalysisError::Schema(format!(
                    "required column '{}' is absent",
                    column
                )));
            }
        }

        if !Column::ENTITIES.iter().any(|c| table.has_column(*c)) {
            return Err(AnalysisError::Schema(
                "no entity identifier column (county, department or vendor)".to_string(),
            ));
        }

        Ok(())
    }

    fn count_duplicates(&self, table: &RecordTable) -> usize {
        let mut seen = HashSet::with_capacity(table.len());
        table
            .records()
            .iter()
            .filter(|r| !seen.insert(r.fingerprint(table.columns())))
            .count()
    }

    fn check_dates(&self, table: &RecordTable) -> (Option<bool>, usize) {
        if !table.has_column(Column::Date) {
            return (None, 0);
        }

        let invalid = table
            .records()
            .iter()
            .filter_map(|r| r.date.as_deref())
            .filter(|d| parse_date(d).is_none())
            .count();

        (Some(invalid == 0), invalid)
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    fn create_clean_table() -> RecordTable {
        RecordTable::from_records(vec![
            Record::payment("Roads", "Acme Paving", 1200.0)
                .with_date("2024-01-15")
                .with_category("Infrastructure")
                .with_county("Adams"),
            Record::payment("Parks", "GreenCo", 300.0)
                .with_date("2024-02-01")
                .with_category("Maintenance")
                .with_county("Adams"),
            Record::payment("Roads", "Acme Paving", 800.0)
                .with_date("2024-03-10")
                .with_category("Infrastructure")
                .with_county("Brown"),
        ])
    }

    #[test]
    fn test_validate_clean_table() {
        let report = Validator::new()
            .validate(&create_clean_table(), &mut Diagnostics::new())
            .unwrap();

        println!("Report: {}", report.summary());

        assert_eq!(report.total_records, 3);
        assert_eq!(report.missing_values, 0);
        assert_eq!(report.duplicates, 0);
        assert_eq!(report.date_format_valid, Some(true));
        assert_eq!(report.negative_values.get("amount"), Some(&0));
        assert_eq!(report.distinct_values.get("department"), Some(&2));
        assert_eq!(report.distinct_values.get("county"), Some(&2));
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_counts_duplicates_and_nulls() {
        let mut records = create_clean_table().records().to_vec();
        records.push(records[0].clone());
        records.push(records[0].clone());
        let mut partial = records[1].clone();
        partial.category = None;
        partial.county = None;
        records.push(partial);

        let table = RecordTable::new(create_clean_table().columns().to_vec(), records);
        let report = Validator::new().validate(&table, &mut Diagnostics::new()).unwrap();

        assert_eq!(report.duplicates, 2);
        assert_eq!(report.missing_values, 2);
        assert_eq!(report.total_records, 6);
    }

    #[test]
    fn test_invalid_date_is_table_level_and_not_dropped() {
        let mut records = create_clean_table().records().to_vec();
        records[1].date = Some("sometime in spring".to_string());
        let table = RecordTable::new(create_clean_table().columns().to_vec(), records);

        let report = Validator::new().validate(&table, &mut Diagnostics::new()).unwrap();

        assert_eq!(report.date_format_valid, Some(false));
        assert_eq!(report.invalid_dates, 1);
        assert_eq!(report.total_records, 3);
        assert!(report.has_critical_issues());
    }

    #[test]
    fn test_negative_values_per_numeric_field() {
        let table = RecordTable::from_records(vec![
            Record::payment("Roads", "Acme", -10.0).with_salary(50_000.0),
            Record::payment("Roads", "Acme", 20.0).with_salary(-1.0),
            Record::payment("Roads", "Bolt", -5.0).with_salary(60_000.0),
        ]);

        let report = Validator::new().validate(&table, &mut Diagnostics::new()).unwrap();

        assert_eq!(report.negative_values.get("amount"), Some(&2));
        assert_eq!(report.negative_values.get("salary"), Some(&1));
        assert_eq!(report.counts().get("salary_negative_values").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_missing_amount_column_is_schema_error() {
        let table = RecordTable::new(
            vec![Column::Department, Column::Vendor],
            vec![Record::payment("Roads", "Acme", 1.0)],
        );

        let err = Validator::new().validate(&table, &mut Diagnostics::new()).unwrap_err();
        assert!(matches!(err, AnalysisError::Schema(_)));
    }

    #[test]
    fn test_missing_entity_columns_is_schema_error() {
        let table = RecordTable::new(
            vec![Column::Amount],
            vec![Record::default().with_numeric(Column::Amount, 3.0)],
        );

        let err = Validator::new().validate(&table, &mut Diagnostics::new()).unwrap_err();
        assert!(matches!(err, AnalysisError::Schema(_)));
    }

    #[test]
    fn test_no_date_column_reports_none() {
        let table = RecordTable::from_records(vec![Record::payment("Roads", "Acme", 1.0)]);
        let report = Validator::new().validate(&table, &mut Diagnostics::new()).unwrap();

        assert_eq!(report.date_format_valid, None);
        assert!(!report.counts().contains_key("date_format_valid"));
    }
}
