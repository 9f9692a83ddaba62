// 📋 Record Table - typed, in-memory view of the spending dataset
// Built once by the loader (or by hand in tests), validated once, then only read.

use crate::error::{AnalysisError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// SCHEMA
// ============================================================================

/// Every column the pipeline knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    County,
    Department,
    Vendor,
    Amount,
    Date,
    Category,
    Salary,
    TotalWorth,
    Fees,
    Fines,
    CommissionIncome,
    CommissionType,
    TransactionCount,
    PublicServiceSpending,
    BusinessGrants,
    BusinessLoans,
    EnforcementActions,
    CourtOutcomes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Numeric,
    Categorical,
    Date,
}

impl Column {
    pub const ALL: [Column; 18] = [
        Column::County,
        Column::Department,
        Column::Vendor,
        Column::Amount,
        Column::Date,
        Column::Category,
        Column::Salary,
        Column::TotalWorth,
        Column::Fees,
        Column::Fines,
        Column::CommissionIncome,
        Column::CommissionType,
        Column::TransactionCount,
        Column::PublicServiceSpending,
        Column::BusinessGrants,
        Column::BusinessLoans,
        Column::EnforcementActions,
        Column::CourtOutcomes,
    ];

    /// Entity-identifier columns. At least one must be present.
    pub const ENTITIES: [Column; 3] = [Column::County, Column::Department, Column::Vendor];

    pub fn name(&self) -> &'static str {
        match self {
            Column::County => "county",
            Column::Department => "department",
            Column::Vendor => "vendor",
            Column::Amount => "amount",
            Column::Date => "date",
            Column::Category => "category",
            Column::Salary => "salary",
            Column::TotalWorth => "total_worth",
            Column::Fees => "fees",
            Column::Fines => "fines",
            Column::CommissionIncome => "commission_income",
            Column::CommissionType => "commission_type",
            Column::TransactionCount => "transaction_count",
            Column::PublicServiceSpending => "public_service_spending",
            Column::BusinessGrants => "business_grants",
            Column::BusinessLoans => "business_loans",
            Column::EnforcementActions => "enforcement_actions",
            Column::CourtOutcomes => "court_outcomes",
        }
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Column::Amount
            | Column::Salary
            | Column::TotalWorth
            | Column::Fees
            | Column::Fines
            | Column::CommissionIncome
            | Column::TransactionCount
            | Column::PublicServiceSpending
            | Column::BusinessGrants
            | Column::BusinessLoans
            | Column::EnforcementActions
            | Column::CourtOutcomes => ColumnKind::Numeric,
            Column::Date => ColumnKind::Date,
            Column::County
            | Column::Department
            | Column::Vendor
            | Column::Category
            | Column::CommissionType => ColumnKind::Categorical,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.kind() == ColumnKind::Numeric
    }

    /// Map a CSV header onto a column (case and surrounding space insensitive).
    pub fn from_header(header: &str) -> Option<Column> {
        let normalized = header.trim().to_lowercase().replace([' ', '-'], "_");
        Column::ALL.iter().copied().find(|c| c.name() == normalized)
    }

    pub fn from_name(name: &str) -> Option<Column> {
        Column::ALL.iter().copied().find(|c| c.name() == name)
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// RECORD
// ============================================================================

/// One spending transaction. Every cell is optional; which columns exist at
/// all is tracked by the owning `RecordTable`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub county: Option<String>,
    pub department: Option<String>,
    pub vendor: Option<String>,
    pub amount: Option<f64>,

    /// Raw date text; parsed on demand so malformed dates can be counted.
    pub date: Option<String>,
    pub category: Option<String>,

    // Optional domain fields (county-level financial data)
    pub salary: Option<f64>,
    pub total_worth: Option<f64>,
    pub fees: Option<f64>,
    pub fines: Option<f64>,
    pub commission_income: Option<f64>,
    pub commission_type: Option<String>,
    pub transaction_count: Option<f64>,
    pub public_service_spending: Option<f64>,
    pub business_grants: Option<f64>,
    pub business_loans: Option<f64>,
    pub enforcement_actions: Option<f64>,
    pub court_outcomes: Option<f64>,
}

impl Record {
    /// Department → vendor payment, the common case.
    pub fn payment(department: &str, vendor: &str, amount: f64) -> Self {
        Record {
            department: Some(department.to_string()),
            vendor: Some(vendor.to_string()),
            amount: Some(amount),
            ..Default::default()
        }
    }

    pub fn with_date(mut self, date: &str) -> Self {
        self.date = Some(date.to_string());
        self
    }

    pub fn with_county(mut self, county: &str) -> Self {
        self.county = Some(county.to_string());
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn with_salary(mut self, salary: f64) -> Self {
        self.salary = Some(salary);
        self
    }

    /// Set any numeric column by name.
    pub fn with_numeric(mut self, column: Column, value: f64) -> Self {
        match column {
            Column::Amount => self.amount = Some(value),
            Column::Salary => self.salary = Some(value),
            Column::TotalWorth => self.total_worth = Some(value),
            Column::Fees => self.fees = Some(value),
            Column::Fines => self.fines = Some(value),
            Column::CommissionIncome => self.commission_income = Some(value),
            Column::TransactionCount => self.transaction_count = Some(value),
            Column::PublicServiceSpending => self.public_service_spending = Some(value),
            Column::BusinessGrants => self.business_grants = Some(value),
            Column::BusinessLoans => self.business_loans = Some(value),
            Column::EnforcementActions => self.enforcement_actions = Some(value),
            Column::CourtOutcomes => self.court_outcomes = Some(value),
            _ => {}
        }
        self
    }

    /// Set any text column (categorical or date) by name.
    pub fn with_text(mut self, column: Column, value: &str) -> Self {
        let value = Some(value.to_string());
        match column {
            Column::County => self.county = value,
            Column::Department => self.department = value,
            Column::Vendor => self.vendor = value,
            Column::Date => self.date = value,
            Column::Category => self.category = value,
            Column::CommissionType => self.commission_type = value,
            _ => {}
        }
        self
    }

    pub fn numeric(&self, column: Column) -> Option<f64> {
        match column {
            Column::Amount => self.amount,
            Column::Salary => self.salary,
            Column::TotalWorth => self.total_worth,
            Column::Fees => self.fees,
            Column::Fines => self.fines,
            Column::CommissionIncome => self.commission_income,
            Column::TransactionCount => self.transaction_count,
            Column::PublicServiceSpending => self.public_service_spending,
            Column::BusinessGrants => self.business_grants,
            Column::BusinessLoans => self.business_loans,
            Column::EnforcementActions => self.enforcement_actions,
            Column::CourtOutcomes => self.court_outcomes,
            _ => None,
        }
    }

    pub fn text(&self, column: Column) -> Option<&str> {
        let value = match column {
            Column::County => &self.county,
            Column::Department => &self.department,
            Column::Vendor => &self.vendor,
            Column::Date => &self.date,
            Column::Category => &self.category,
            Column::CommissionType => &self.commission_type,
            _ => return None,
        };
        value.as_deref()
    }

    pub fn is_null(&self, column: Column) -> bool {
        if column.is_numeric() {
            self.numeric(column).is_none()
        } else {
            self.text(column).is_none()
        }
    }

    pub fn parsed_date(&self) -> Option<NaiveDate> {
        self.date.as_deref().and_then(parse_date)
    }

    /// Content hash over the given columns. Two records with equal hashes
    /// are field-wise identical on those columns.
    pub fn fingerprint(&self, columns: &[Column]) -> String {
        let mut hasher = Sha256::new();
        for column in columns {
            let cell = if column.is_numeric() {
                self.numeric(*column)
                    .map(|v| format!("{:016x}", v.to_bits()))
                    .unwrap_or_default()
            } else {
                self.text(*column).map(|s| s.to_string()).unwrap_or_default()
            };
            let marker: u8 = if self.is_null(*column) { 0 } else { 1 };
            hasher.update([marker]);
            hasher.update(cell.as_bytes());
            hasher.update([0x1f]);
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Parse a date cell. Accepts `YYYY-MM-DD`, `MM/DD/YYYY`, and timestamps
/// whose first ten characters are `YYYY-MM-DD`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%m/%d/%Y") {
        return Some(d);
    }
    raw.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

// ============================================================================
// RECORD TABLE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordTable {
    /// Columns present in the source, in source order.
    columns: Vec<Column>,
    records: Vec<Record>,
}

impl RecordTable {
    /// Build a table with an explicit schema. Duplicate columns are dropped.
    pub fn new(columns: Vec<Column>, records: Vec<Record>) -> Self {
        let mut unique = Vec::with_capacity(columns.len());
        for c in columns {
            if !unique.contains(&c) {
                unique.push(c);
            }
        }
        RecordTable {
            columns: unique,
            records,
        }
    }

    /// Build a table whose schema is every column holding at least one value.
    pub fn from_records(records: Vec<Record>) -> Self {
        let columns = Column::ALL
            .iter()
            .copied()
            .filter(|c| records.iter().any(|r| !r.is_null(*c)))
            .collect();
        RecordTable { columns, records }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, column: Column) -> bool {
        self.columns.contains(&column)
    }

    /// Fail with `MissingField` unless every listed column is present.
    pub fn require_columns(&self, columns: &[Column]) -> Result<()> {
        let missing: Vec<&str> = columns
            .iter()
            .filter(|c| !self.has_column(**c))
            .map(|c| c.name())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AnalysisError::MissingField(format!(
                "column(s) not present: {}",
                missing.join(", ")
            )))
        }
    }

    /// Non-null values of a numeric column, tagged with their row index.
    pub fn numeric_values(&self, column: Column) -> Vec<(usize, f64)> {
        self.records
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.numeric(column).map(|v| (i, v)))
            .collect()
    }

    /// SHA-256 over every row, used to recognise re-runs on an identical table.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for column in &self.columns {
            hasher.update(column.name().as_bytes());
            hasher.update([0x1e]);
        }
        for record in &self.records {
            hasher.update(record.fingerprint(&self.columns).as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_from_header() {
        assert_eq!(Column::from_header("Amount"), Some(Column::Amount));
        assert_eq!(Column::from_header(" total worth "), Some(Column::TotalWorth));
        assert_eq!(Column::from_header("Commission-Income"), Some(Column::CommissionIncome));
        assert_eq!(
            Column::from_header("Public Service Spending"),
            Some(Column::PublicServiceSpending)
        );
        assert_eq!(Column::from_header("fraud_flag"), None);
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(parse_date("2024-03-15"), Some(expected));
        assert_eq!(parse_date("03/15/2024"), Some(expected));
        assert_eq!(parse_date("2024-03-15T08:30:00Z"), Some(expected));
        assert_eq!(parse_date("15th of March"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_from_records_infers_schema() {
        let table = RecordTable::from_records(vec![
            Record::payment("Roads", "Acme", 100.0),
            Record::payment("Parks", "Bolt", 50.0).with_date("2024-01-01"),
        ]);

        assert!(table.has_column(Column::Amount));
        assert!(table.has_column(Column::Date));
        assert!(!table.has_column(Column::Salary));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_require_columns_lists_missing() {
        let table = RecordTable::from_records(vec![Record::payment("Roads", "Acme", 1.0)]);

        let err = table
            .require_columns(&[Column::Amount, Column::Date, Column::Salary])
            .unwrap_err();

        match err {
            AnalysisError::MissingField(msg) => {
                assert!(msg.contains("date"));
                assert!(msg.contains("salary"));
                assert!(!msg.contains("amount"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_fingerprint_distinguishes_null_from_empty() {
        let columns = [Column::Department, Column::Amount];
        let a = Record::payment("", "Acme", 1.0);
        let mut b = a.clone();
        b.department = None;

        assert_ne!(a.fingerprint(&columns), b.fingerprint(&columns));
        assert_eq!(a.fingerprint(&columns), a.clone().fingerprint(&columns));
    }
}
