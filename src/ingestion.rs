//! CSV ingestion - turns CSV exports into raw rows for the normalizer

use crate::core::models::{RawRow, RawValue};
use crate::error::Result;
use csv::ReaderBuilder;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

fn coerce_cell(s: &str) -> RawValue {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return RawValue::Empty;
    }

    if trimmed.eq_ignore_ascii_case("true") {
        return RawValue::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return RawValue::Bool(false);
    }

    if let Ok(f) = trimmed.parse::<f64>() {
        if f.is_finite() {
            return RawValue::Number(f);
        }
    }

    RawValue::Text(trimmed.to_string())
}

/// Read CSV with a header row into raw rows
///
/// Short records are padded with empty cells.
pub fn read_csv_rows<R: Read>(reader: R) -> Result<Vec<RawRow>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect::<Vec<_>>();

    let mut out = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let row: RawRow = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !h.is_empty())
            .map(|(idx, header)| (header.clone(), coerce_cell(record.get(idx).unwrap_or(""))))
            .collect();
        out.push(row);
    }

    debug!("read {} CSV row(s) over {} column(s)", out.len(), headers.len());
    Ok(out)
}

pub fn read_csv_file(path: impl AsRef<Path>) -> Result<Vec<RawRow>> {
    let file = File::open(path.as_ref())?;
    read_csv_rows(file)
}

/// Sheet name implied by a file: its stem (`Basefile_US.csv` -> `Basefile_US`)
pub fn sheet_name(path: impl AsRef<Path>) -> String {
    path.as_ref()
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_csv_rows_coerces_cells() {
        let data = "Brand, Year ,Sales,Flag\nApple,2024,1200.5,true\nSamsung,2025,n/a\n";
        let rows = read_csv_rows(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("Year"), Some(&RawValue::Number(2024.0)));
        assert_eq!(rows[0].get("Flag"), Some(&RawValue::Bool(true)));
        assert_eq!(rows[1].get("Sales"), Some(&RawValue::text("n/a")));
        assert_eq!(rows[1].get("Flag"), Some(&RawValue::Empty));
    }

    #[test]
    fn test_sheet_name_from_path() {
        assert_eq!(sheet_name("/tmp/Basefile_US.csv"), "Basefile_US");
    }
}
