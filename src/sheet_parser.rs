//! Upload parsing for the import wizard: xlsx/xlsm (and CSV) into a header
//! row plus string row-records.

use anyhow::{Context, Result};
use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use std::collections::HashMap;
use std::io::Cursor;

/// A row-record: cell text keyed by the exact header string of its column.
pub type RowRecord = HashMap<String, String>;

/// The first sheet of an uploaded workbook, decoded to strings.
///
/// `headers` preserves the file's column order; `rows` holds data rows only
/// (the header row is excluded from every count reported to callers).
#[derive(Debug, Clone)]
pub struct ParsedSheet {
    pub headers: Vec<String>,
    pub rows: Vec<RowRecord>,
}

/// Dispatch upload parsing by file extension.
pub fn parse_sheet(filename: &str, data: &[u8]) -> Result<ParsedSheet> {
    let ext = filename.rsplit('.').next().unwrap_or("").to_lowercase();

    match ext.as_str() {
        "xlsx" | "xlsm" => parse_xlsx(data),
        "csv" => parse_csv(data),
        _ => anyhow::bail!(
            "Unsupported file type: .{}. Supported: .xlsx, .xlsm, .csv",
            ext
        ),
    }
}

/// Parse the first worksheet of an xlsx/xlsm workbook.
fn parse_xlsx(data: &[u8]) -> Result<ParsedSheet> {
    let cursor = Cursor::new(data);
    let mut workbook: Xlsx<_> =
        open_workbook_from_rs(cursor).context("Failed to open Excel workbook")?;

    let first_sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .context("Workbook has no sheets")?;

    let range = workbook
        .worksheet_range(&first_sheet)
        .with_context(|| format!("Failed to read sheet '{}'", first_sheet))?;

    let mut row_iter = range.rows();

    // Row 1 is the header row, taken verbatim.
    let mut headers: Vec<String> = match row_iter.next() {
        Some(row) => row.iter().map(cell_to_string).collect(),
        None => anyhow::bail!("Excel file is empty"),
    };

    // The used range pads the header row out to the widest data row; those
    // trailing blanks are grid artifacts, not headers.
    while headers.last().map(|h| h.is_empty()).unwrap_or(false) {
        headers.pop();
    }
    if headers.is_empty() {
        anyhow::bail!("Excel file is empty");
    }

    let mut rows = Vec::new();
    for row in row_iter {
        let values: Vec<String> = row.iter().map(cell_to_string).collect();
        if values.iter().all(|v| v.is_empty()) {
            continue;
        }
        rows.push(build_record(&headers, &values));
    }

    Ok(ParsedSheet { headers, rows })
}

/// Parse a CSV upload. Same record semantics as the xlsx path.
fn parse_csv(data: &[u8]) -> Result<ParsedSheet> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(data);

    let headers: Vec<String> = reader
        .headers()
        .context("Failed to read CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        anyhow::bail!("CSV file is empty");
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.context("Failed to read CSV record")?;
        let values: Vec<String> = record.iter().map(|f| f.to_string()).collect();
        if values.iter().all(|v| v.is_empty()) {
            continue;
        }
        rows.push(build_record(&headers, &values));
    }

    Ok(ParsedSheet { headers, rows })
}

/// Key cell values by header: the cell at column i goes under header i.
/// Rows shorter than the header row read as empty strings for the missing
/// trailing columns; cells beyond the last header are dropped.
fn build_record(headers: &[String], values: &[String]) -> RowRecord {
    headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            let value = values.get(i).cloned().unwrap_or_default();
            (header.clone(), value)
        })
        .collect()
}

/// Convert a calamine cell to its string representation.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            // Avoid trailing ".0" for whole numbers
            if *f == (*f as i64) as f64 && f.abs() < i64::MAX as f64 {
                format!("{}", *f as i64)
            } else {
                format!("{}", f)
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_string(dt.as_f64()),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#ERR:{:?}", e),
    }
}

/// Convert an Excel serial date number to a human-readable string.
/// Excel epoch: 1899-12-30, with the 1900 leap-year bug (serial 60 is the
/// nonexistent Feb 29, 1900).
fn excel_serial_to_string(serial: f64) -> String {
    let days = serial as i64;
    let frac = serial - days as f64;

    let adjusted_days = if days > 59 { days - 1 } else { days };

    let base = 25569i64; // days from 1899-12-30 to 1970-01-01
    let unix_days = adjusted_days - base;
    let total_secs = unix_days * 86400 + (frac * 86400.0) as i64;

    let days_since_epoch = total_secs / 86400;
    let time_of_day = (total_secs % 86400 + 86400) % 86400;

    let hours = time_of_day / 3600;
    let minutes = (time_of_day % 3600) / 60;
    let seconds = time_of_day % 60;

    let mut year = 1970i32;
    let mut remaining = days_since_epoch as i32;

    if remaining >= 0 {
        loop {
            let diy = if is_leap(year) { 366 } else { 365 };
            if remaining < diy {
                break;
            }
            remaining -= diy;
            year += 1;
        }
    } else {
        loop {
            year -= 1;
            let diy = if is_leap(year) { 366 } else { 365 };
            remaining += diy;
            if remaining >= 0 {
                break;
            }
        }
    }

    let dim: [i32; 12] = if is_leap(year) {
        [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    } else {
        [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    };

    let mut month = 1;
    for d in dim {
        if remaining < d {
            break;
        }
        remaining -= d;
        month += 1;
    }
    let day = remaining + 1;

    if hours == 0 && minutes == 0 && seconds == 0 {
        format!("{:04}-{:02}-{:02}", year, month, day)
    } else {
        format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            year, month, day, hours, minutes, seconds
        )
    }
}

fn is_leap(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    fn xlsx_fixture(rows: &[&[&str]]) -> Vec<u8> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                sheet.write_string(r as u32, c as u16, *cell).unwrap();
            }
        }
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn test_parse_xlsx_basic() {
        let bytes = xlsx_fixture(&[
            &["Player Name", "Brand", "Season / Year"],
            &["LeBron James", "Panini", "2012-13"],
            &["Luka Doncic", "Topps", "2018-19"],
        ]);
        let sheet = parse_sheet("cards.xlsx", &bytes).unwrap();
        assert_eq!(sheet.headers, vec!["Player Name", "Brand", "Season / Year"]);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0]["Player Name"], "LeBron James");
        assert_eq!(sheet.rows[1]["Brand"], "Topps");
    }

    #[test]
    fn test_row_key_set_equals_headers() {
        let bytes = xlsx_fixture(&[&["A", "B"], &["1", "2"]]);
        let sheet = parse_sheet("t.xlsx", &bytes).unwrap();
        let mut keys: Vec<&str> = sheet.rows[0].keys().map(|k| k.as_str()).collect();
        keys.sort();
        assert_eq!(keys, vec!["A", "B"]);
    }

    #[test]
    fn test_short_row_pads_empty_strings() {
        let bytes = xlsx_fixture(&[&["A", "B", "C"], &["only-a"]]);
        let sheet = parse_sheet("t.xlsx", &bytes).unwrap();
        assert_eq!(sheet.rows[0]["A"], "only-a");
        assert_eq!(sheet.rows[0]["B"], "");
        assert_eq!(sheet.rows[0]["C"], "");
    }

    #[test]
    fn test_long_row_drops_extra_cells() {
        let bytes = xlsx_fixture(&[&["A", "B"], &["1", "2", "surplus"]]);
        let sheet = parse_sheet("t.xlsx", &bytes).unwrap();
        assert_eq!(sheet.rows[0].len(), 2);
        assert!(!sheet.rows[0].values().any(|v| v == "surplus"));
    }

    #[test]
    fn test_header_only_sheet_has_zero_rows() {
        let bytes = xlsx_fixture(&[&["Player Name", "Brand"]]);
        let sheet = parse_sheet("t.xlsx", &bytes).unwrap();
        assert!(sheet.rows.is_empty());
    }

    #[test]
    fn test_empty_workbook_is_an_error() {
        let mut workbook = Workbook::new();
        workbook.add_worksheet();
        let bytes = workbook.save_to_buffer().unwrap();
        assert!(parse_sheet("empty.xlsx", &bytes).is_err());
    }

    #[test]
    fn test_blank_rows_are_skipped() {
        let bytes = xlsx_fixture(&[&["A"], &[""], &["x"]]);
        let sheet = parse_sheet("t.xlsx", &bytes).unwrap();
        assert_eq!(sheet.rows.len(), 1);
        assert_eq!(sheet.rows[0]["A"], "x");
    }

    #[test]
    fn test_parse_csv_basic() {
        let csv_data = b"Player Name,Brand\nLeBron James,Panini\n";
        let sheet = parse_sheet("cards.csv", csv_data).unwrap();
        assert_eq!(sheet.headers, vec!["Player Name", "Brand"]);
        assert_eq!(sheet.rows.len(), 1);
        assert_eq!(sheet.rows[0]["Brand"], "Panini");
    }

    #[test]
    fn test_csv_flexible_short_row() {
        let csv_data = b"a,b,c\n1,2\n";
        let sheet = parse_sheet("flex.csv", csv_data).unwrap();
        assert_eq!(sheet.rows[0]["b"], "2");
        assert_eq!(sheet.rows[0]["c"], "");
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(parse_sheet("cards.pdf", b"data").is_err());
    }

    #[test]
    fn test_cell_float_rendering() {
        assert_eq!(cell_to_string(&Data::Float(147.0)), "147");
        assert_eq!(cell_to_string(&Data::Float(9.5)), "9.5");
    }

    #[test]
    fn test_excel_serial_dates() {
        // 2012-01-01 is serial 40909
        assert_eq!(excel_serial_to_string(40909.0), "2012-01-01");
        assert_eq!(excel_serial_to_string(40909.5), "2012-01-01 12:00:00");
    }
}
