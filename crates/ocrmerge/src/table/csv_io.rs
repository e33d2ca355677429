//! CSV rendering and reading for row tables.

use std::io::Read;
use std::path::Path;

use super::RowTable;

/// Renders a table as CSV text: header row first, then one line per row.
///
/// A table without headers renders as an empty string.
pub fn to_csv(table: &RowTable) -> Result<String, csv::Error> {
    if table.headers().is_empty() {
        return Ok(String::new());
    }

    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(table.headers())?;
    for row in table.rows() {
        writer.write_record(
            table
                .headers()
                .iter()
                .map(|h| row.get(h).map(String::as_str).unwrap_or("")),
        )?;
    }
    writer.flush()?;

    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Reads CSV with a header row into a table.
///
/// Header cells are trimmed; duplicate headers keep their first column.
/// Short records are padded with empty cells.
pub fn read_csv<R: Read>(reader: R) -> Result<RowTable, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut table = RowTable::with_headers(headers.iter().filter(|h| !h.is_empty()).cloned());

    for record in reader.records() {
        let record = record?;
        let mut cells: Vec<(String, String)> = Vec::with_capacity(headers.len());
        for (idx, header) in headers.iter().enumerate() {
            if header.is_empty() || cells.iter().any(|(h, _)| h == header) {
                continue;
            }
            let value = record.get(idx).unwrap_or("").to_string();
            cells.push((header.clone(), value));
        }
        table.push_row(cells);
    }

    Ok(table)
}

pub fn read_csv_path(path: &Path) -> Result<RowTable, csv::Error> {
    let file = std::fs::File::open(path)?;
    read_csv(file)
}
