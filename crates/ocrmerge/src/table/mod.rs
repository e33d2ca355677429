//! Flat tabular data derived from extraction results.

pub mod csv_io;
pub mod normalize;
pub mod value;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use csv_io::{read_csv, read_csv_path, to_csv};
pub use normalize::{NormalizeOptions, Normalizer};
pub use value::ExtractionValue;

/// One table row: header → cell value.
pub type Row = BTreeMap<String, String>;

/// An ordered list of rows sharing one header list.
///
/// Every row holds a value for every header; cells that were never set are
/// empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowTable {
    headers: Vec<String>,
    rows: Vec<Row>,
}

impl RowTable {
    /// Creates an empty table with the given headers (duplicates dropped).
    pub fn with_headers<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::default();
        for header in headers {
            table.add_header(header.into());
        }
        table
    }

    /// Builds a table from rows of `(header, value)` pairs.
    pub fn from_records<I, R>(records: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = (String, String)>,
    {
        let mut table = Self::default();
        for record in records {
            table.push_row(record);
        }
        table
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_header(&self, header: &str) -> bool {
        self.headers.iter().any(|h| h == header)
    }

    /// Appends a header, backfilling existing rows. No-op if already present.
    pub fn add_header(&mut self, header: String) {
        if self.has_header(&header) {
            return;
        }
        for row in &mut self.rows {
            row.insert(header.clone(), String::new());
        }
        self.headers.push(header);
    }

    /// Appends a row. Unknown headers are added in the order they appear.
    pub fn push_row<R>(&mut self, cells: R)
    where
        R: IntoIterator<Item = (String, String)>,
    {
        let mut row = Row::new();
        for (header, value) in cells {
            self.add_header(header.clone());
            row.insert(header, value);
        }
        for header in &self.headers {
            row.entry(header.clone()).or_default();
        }
        self.rows.push(row);
    }

    /// Returns a cell value, empty when the header is unknown.
    pub fn cell(&self, row: usize, header: &str) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(header))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Renames headers in one pass over the original header list.
    ///
    /// Each original header is looked up in `renames` once, so chained
    /// entries (`a → b`, `b → c`) do not cascade. When several columns land
    /// on the same name they are folded together: a column that kept its
    /// name wins, otherwise the first non-empty value in header order.
    pub fn rename_headers(&mut self, renames: &BTreeMap<String, String>) {
        let plan: Vec<(String, String)> = self
            .headers
            .iter()
            .map(|h| {
                let target = renames.get(h).unwrap_or(h);
                (h.clone(), target.clone())
            })
            .collect();
        if plan.iter().all(|(from, to)| from == to) {
            return;
        }

        let mut renamed = Self::with_headers(plan.iter().map(|(_, to)| to.clone()));
        for row in &self.rows {
            let mut out = Row::new();
            for (from, to) in plan.iter().filter(|(from, to)| from == to) {
                out.insert(to.clone(), row.get(from).cloned().unwrap_or_default());
            }
            for (from, to) in plan.iter().filter(|(from, to)| from != to) {
                let slot = out.entry(to.clone()).or_default();
                if slot.is_empty() {
                    *slot = row.get(from).cloned().unwrap_or_default();
                }
            }
            renamed.rows.push(out);
        }
        *self = renamed;
    }

    /// Appends all rows of `other`, extending the header list as needed.
    pub fn extend_from(&mut self, other: &RowTable) {
        for header in &other.headers {
            self.add_header(header.clone());
        }
        for row in &other.rows {
            let mut merged = row.clone();
            for header in &self.headers {
                merged.entry(header.clone()).or_default();
            }
            self.rows.push(merged);
        }
    }

}
