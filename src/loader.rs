// 📥 CSV Loader - delimited text into a RecordTable
// Header row decides the schema. Unknown headers are ignored; cells that
// don't parse become nulls and are left for the validator to count.

use crate::record::{Column, Record, RecordTable};
use anyhow::{bail, Context, Result};
use std::io::Read;
use std::path::Path;

/// Load a CSV file with a header row.
pub fn load_csv(csv_path: &Path) -> Result<RecordTable> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open file: {}", csv_path.display()))?;

    let table = load_csv_reader(file)
        .with_context(|| format!("Failed to load {}", csv_path.display()))?;

    tracing::info!(
        path = %csv_path.display(),
        records = table.len(),
        columns = table.columns().len(),
        "loaded record table"
    );
    Ok(table)
}

/// Load CSV from any reader.
pub fn load_csv_reader<R: Read>(reader: R) -> Result<RecordTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers().context("Failed to read CSV header")?.clone();

    // Position in the row → column, for the headers we recognise.
    let mut mapping: Vec<(usize, Column)> = Vec::new();
    for (i, header) in headers.iter().enumerate() {
        match Column::from_header(header) {
            Some(column) if mapping.iter().any(|(_, c)| *c == column) => {
                tracing::warn!(header, "duplicate column header, keeping the first");
            }
            Some(column) => mapping.push((i, column)),
            None => tracing::warn!(header, "ignoring unknown column"),
        }
    }

    if mapping.is_empty() {
        bail!("no recognised columns in header: {:?}", headers);
    }

    let mut records = Vec::new();
    let mut unparseable = 0usize;

    for (line_num, result) in rdr.records().enumerate() {
        // +2: 1-indexed, plus the header row
        let row = result.with_context(|| format!("Failed to parse CSV line {}", line_num + 2))?;

        let mut record = Record::default();
        for &(i, column) in &mapping {
            let cell = row.get(i).unwrap_or("");
            if cell.is_empty() {
                continue;
            }
            if column.is_numeric() {
                match parse_number(cell) {
                    Some(value) => record = record.with_numeric(column, value),
                    None => {
                        unparseable += 1;
                        tracing::debug!(line = line_num + 2, %column, cell, "unparseable number");
                    }
                }
            } else {
                record = record.with_text(column, cell);
            }
        }
        records.push(record);
    }

    if unparseable > 0 {
        tracing::warn!(unparseable, "numeric cells that did not parse were loaded as nulls");
    }

    Ok(RecordTable::new(
        mapping.into_iter().map(|(_, c)| c).collect(),
        records,
    ))
}

/// Parse amounts like `1234.5`, `$1,234.50` or `-$20.00`.
fn parse_number(cell: &str) -> Option<f64> {
    let cleaned: String = cell.chars().filter(|c| *c != '$' && *c != ',').collect();
    cleaned.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_maps_headers_and_nulls() {
        let data = "\
Department,Vendor,Amount,Date,Notes
Roads,Acme Paving,\"$1,200.50\",2024-01-15,first
Parks,,300,02/01/2024,
Roads,Acme Paving,n/a,2024-03-10,bad amount
";
        let table = load_csv_reader(data.as_bytes()).unwrap();

        assert_eq!(
            table.columns(),
            &[Column::Department, Column::Vendor, Column::Amount, Column::Date]
        );
        assert_eq!(table.len(), 3);

        let records = table.records();
        assert_eq!(records[0].amount, Some(1200.5));
        assert_eq!(records[1].vendor, None);
        assert_eq!(records[1].parsed_date().map(|d| d.to_string()), Some("2024-02-01".to_string()));
        assert_eq!(records[2].amount, None);
    }

    #[test]
    fn test_header_normalization() {
        let data = " Total Worth ,COUNTY,commission-type\n10,Adams,Liquor\n";
        let table = load_csv_reader(data.as_bytes()).unwrap();

        assert_eq!(
            table.columns(),
            &[Column::TotalWorth, Column::County, Column::CommissionType]
        );
        assert_eq!(table.records()[0].total_worth, Some(10.0));
    }

    #[test]
    fn test_no_known_columns_is_error() {
        assert!(load_csv_reader("foo,bar\n1,2\n".as_bytes()).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = load_csv(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(err.to_string().contains("Failed to open file"));
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("-$20.00"), Some(-20.0));
        assert_eq!(parse_number("1,000"), Some(1000.0));
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("abc"), None);
    }
}
