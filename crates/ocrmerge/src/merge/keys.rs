use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::table::RowTable;

/// How join key values are compared.
///
/// Both normalizations are on by default to tolerate OCR noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOptions {
    #[serde(default = "enabled")]
    pub trim: bool,
    #[serde(default = "enabled")]
    pub case_insensitive: bool,
}

fn enabled() -> bool {
    true
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            trim: true,
            case_insensitive: true,
        }
    }
}

impl MatchOptions {
    /// Strict byte-for-byte comparison.
    pub fn exact() -> Self {
        Self {
            trim: false,
            case_insensitive: false,
        }
    }

    /// Returns the comparison form of a key value, or `None` when it is blank.
    pub fn normalize(&self, raw: &str) -> Option<String> {
        let value = if self.trim { raw.trim() } else { raw };
        if value.trim().is_empty() {
            return None;
        }
        Some(if self.case_insensitive {
            value.to_lowercase()
        } else {
            value.to_string()
        })
    }
}

/// Row positions of a table grouped by the normalized value of one column.
#[derive(Debug, Default)]
pub struct KeyIndex {
    positions: HashMap<String, Vec<usize>>,
}

impl KeyIndex {
    /// Indexes `column` of `table`. Rows with a blank value are left out.
    pub fn build(table: &RowTable, column: &str, options: &MatchOptions) -> Self {
        let mut positions: HashMap<String, Vec<usize>> = HashMap::new();
        if !table.has_header(column) {
            return Self { positions };
        }
        for (idx, row) in table.rows().iter().enumerate() {
            if let Some(key) = row.get(column).and_then(|v| options.normalize(v)) {
                positions.entry(key).or_default().push(idx);
            }
        }
        Self { positions }
    }

    /// True when no row carries a value for the column.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Matching row positions in table order.
    pub fn lookup(&self, raw: &str, options: &MatchOptions) -> &[usize] {
        options
            .normalize(raw)
            .and_then(|key| self.positions.get(&key))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
