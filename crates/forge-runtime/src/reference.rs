//! Reference tables on disk
//!
//! Expected outputs are CSV files. Reading infers a type per column: a
//! column whose present cells all parse as numbers is numeric, anything else
//! is text, and missing-value tokens become [`Cell::Null`].

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use forge_artifact::{Cell, Table, TableError};

/// Tokens read as a missing value
const NA_TOKENS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-NaN", "-nan", "<NA>", "N/A", "NA", "NULL", "NaN", "None",
    "n/a", "nan", "null",
];

/// Reference loading and writing failures
#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    /// The file could not be opened or created
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV syntax or I/O error
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// The CSV does not form a well-formed table
    #[error("malformed reference table: {0}")]
    Malformed(#[from] TableError),
}

fn is_missing(raw: &str) -> bool {
    NA_TOKENS.contains(&raw.trim())
}

/// Load a reference table from a CSV file with a header row
///
/// # Errors
/// Returns error if the file cannot be read or is not a rectangular CSV
pub fn load_reference(path: &Path) -> Result<Table, ReferenceError> {
    let file = File::open(path).map_err(|source| ReferenceError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    read_reference(file)
}

/// Read a reference table from CSV text
///
/// # Errors
/// Returns error if the input is not a rectangular CSV with unique headers
pub fn read_reference<R: Read>(reader: R) -> Result<Table, ReferenceError> {
    let mut csv = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    let columns: Vec<String> = csv.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let mut raw_rows: Vec<Vec<String>> = Vec::new();
    for record in csv.records() {
        raw_rows.push(record?.iter().map(ToString::to_string).collect());
    }

    let numeric: Vec<bool> = (0..columns.len())
        .map(|col| {
            let mut present = raw_rows
                .iter()
                .filter_map(|row| row.get(col))
                .filter(|raw| !is_missing(raw))
                .peekable();
            present.peek().is_some() && present.all(|raw| raw.trim().parse::<f64>().is_ok())
        })
        .collect();

    let rows = raw_rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .enumerate()
                .map(|(col, raw)| {
                    if is_missing(&raw) {
                        Cell::Null
                    } else if numeric.get(col).copied().unwrap_or(false) {
                        raw.trim().parse::<f64>().map_or(Cell::Text(raw), Cell::Number)
                    } else {
                        Cell::Text(raw)
                    }
                })
                .collect()
        })
        .collect();

    let table = Table { columns, rows };
    table.check_well_formed()?;
    Ok(table)
}

/// Write `table` as CSV with a header row
///
/// # Errors
/// Returns error if the destination cannot be written
pub fn write_table<W: Write>(table: &Table, writer: W) -> Result<(), ReferenceError> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(&table.columns)?;
    for row in &table.rows {
        csv.write_record(row.iter().map(ToString::to_string))?;
    }
    csv.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Write `table` to a CSV file
///
/// # Errors
/// Returns error if the file cannot be created or written
pub fn save_table(table: &Table, path: &Path) -> Result<(), ReferenceError> {
    let file = File::create(path).map_err(|source| ReferenceError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    write_table(table, file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const STATEMENT: &str = "\
Date,Description,Debit Amt,Credit Amt,Balance
01-08-2024,Salary Credit,,1935.3,6864.58
02-08-2024,ATM Withdrawal,500,,6364.58
03-08-2024,UPI 00123,1200.5,,5164.08
";

    #[test]
    fn numeric_columns_are_inferred() {
        let table = read_reference(STATEMENT.as_bytes()).unwrap();
        assert_eq!(
            table.columns,
            vec!["Date", "Description", "Debit Amt", "Credit Amt", "Balance"]
        );
        assert_eq!(
            table.rows[0],
            vec![
                Cell::Text("01-08-2024".into()),
                Cell::Text("Salary Credit".into()),
                Cell::Null,
                Cell::Number(1935.3),
                Cell::Number(6864.58),
            ]
        );
        assert_eq!(table.rows[1][2], Cell::Number(500.0));
    }

    #[test]
    fn mixed_column_stays_text() {
        let table = read_reference("Ref,Amount\n00123,1\nABC,2\n".as_bytes()).unwrap();
        assert_eq!(table.rows[0][0], Cell::Text("00123".into()));
        assert_eq!(table.rows[1][1], Cell::Number(2.0));
    }

    #[test]
    fn all_missing_column_is_null() {
        let table = read_reference("A,B\n1,\n2,NaN\n".as_bytes()).unwrap();
        assert_eq!(table.rows[0][1], Cell::Null);
        assert_eq!(table.rows[1][1], Cell::Null);
    }

    #[test]
    fn ragged_csv_is_rejected() {
        assert!(read_reference("A,B\n1,2,3\n".as_bytes()).is_err());
    }

    #[test]
    fn duplicate_headers_are_rejected() {
        assert!(matches!(
            read_reference("A,A\n1,2\n".as_bytes()),
            Err(ReferenceError::Malformed(_))
        ));
    }

    #[test]
    fn written_table_reads_back() {
        let table = read_reference(STATEMENT.as_bytes()).unwrap();
        let mut out = Vec::new();
        write_table(&table, &mut out).unwrap();
        assert_eq!(read_reference(out.as_slice()).unwrap(), table);
    }

    #[test]
    fn missing_file_is_open_error() {
        let err = load_reference(Path::new("/nonexistent/expected.csv")).unwrap_err();
        assert!(matches!(err, ReferenceError::Open { .. }));
    }
}
