//! Flattens extraction payloads into row tables.
//!
//! Shape rules:
//! - a top-level array yields one row per element (the only place rows fan out)
//! - a top-level object or scalar yields exactly one row
//! - nested objects flatten into `parent<separator>child` headers
//! - nested arrays of scalars collapse into one delimited cell; nested arrays
//!   holding objects or arrays are kept as compact JSON text
//! - scalar array elements at the top level land in the `value` column

use serde::{Deserialize, Serialize};

use super::value::ExtractionValue;
use super::RowTable;
use crate::error::NormalizeError;

/// Separator between a parent key and a nested child key.
pub const DEFAULT_FLATTEN_SEPARATOR: &str = ".";

/// Delimiter used when collapsing a nested array of scalars into one cell.
pub const DEFAULT_ARRAY_DELIMITER: &str = "; ";

/// Header used for scalar payloads and scalar top-level array elements.
pub const SCALAR_COLUMN: &str = "value";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizeOptions {
    #[serde(default = "default_flatten_separator")]
    pub flatten_separator: String,
    #[serde(default = "default_array_delimiter")]
    pub array_delimiter: String,
}

fn default_flatten_separator() -> String {
    DEFAULT_FLATTEN_SEPARATOR.to_string()
}

fn default_array_delimiter() -> String {
    DEFAULT_ARRAY_DELIMITER.to_string()
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            flatten_separator: default_flatten_separator(),
            array_delimiter: default_array_delimiter(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    options: NormalizeOptions,
}

impl Normalizer {
    pub fn new(options: NormalizeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &NormalizeOptions {
        &self.options
    }

    /// Parses and normalizes a raw payload.
    pub fn normalize_payload(&self, payload: &str) -> Result<RowTable, NormalizeError> {
        let value = ExtractionValue::parse(payload)?;
        Ok(self.normalize(&value))
    }

    pub fn normalize(&self, value: &ExtractionValue) -> RowTable {
        let mut table = RowTable::default();
        if value.is_empty() {
            return table;
        }

        match value {
            ExtractionValue::Array(items) => {
                for item in items {
                    table.push_row(self.flatten_row(item));
                }
            }
            other => table.push_row(self.flatten_row(other)),
        }

        table
    }

    fn flatten_row(&self, value: &ExtractionValue) -> Vec<(String, String)> {
        let mut cells = Vec::new();
        match value {
            ExtractionValue::Object(fields) => self.flatten_fields(None, fields, &mut cells),
            ExtractionValue::Array(items) => {
                cells.push((SCALAR_COLUMN.to_string(), self.array_cell(items)))
            }
            scalar => cells.push((SCALAR_COLUMN.to_string(), scalar.to_cell())),
        }
        cells
    }

    fn flatten_fields(
        &self,
        prefix: Option<&str>,
        fields: &[(String, ExtractionValue)],
        out: &mut Vec<(String, String)>,
    ) {
        for (key, value) in fields {
            let header = match prefix {
                Some(p) => format!("{}{}{}", p, self.options.flatten_separator, key),
                None => key.clone(),
            };

            match value {
                ExtractionValue::Object(nested) if !nested.is_empty() => {
                    self.flatten_fields(Some(&header), nested, out);
                }
                ExtractionValue::Object(_) => out.push((header, String::new())),
                ExtractionValue::Array(items) => {
                    let cell = self.array_cell(items);
                    out.push((header, cell));
                }
                scalar => out.push((header, scalar.to_cell())),
            }
        }
    }

    fn array_cell(&self, items: &[ExtractionValue]) -> String {
        if items.iter().all(ExtractionValue::is_scalar) {
            items
                .iter()
                .map(ExtractionValue::to_cell)
                .collect::<Vec<_>>()
                .join(&self.options.array_delimiter)
        } else {
            serde_json::to_string(items).unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(payload: &str) -> RowTable {
        Normalizer::default().normalize_payload(payload).unwrap()
    }

    /// Writes rows back out as a JSON array of objects in header order.
    fn rows_to_json(table: &RowTable) -> String {
        let rows: Vec<String> = table
            .rows()
            .iter()
            .map(|row| {
                let fields: Vec<String> = table
                    .headers()
                    .iter()
                    .map(|h| {
                        format!(
                            "{}:{}",
                            serde_json::to_string(h).unwrap(),
                            serde_json::to_string(&row[h]).unwrap()
                        )
                    })
                    .collect();
                format!("{{{}}}", fields.join(","))
            })
            .collect();
        format!("[{}]", rows.join(","))
    }

    #[test]
    fn test_flat_table_is_a_fixed_point() {
        let first = normalize(
            r#"[{"phone": "555", "total": 12.5, "paid": true},
                {"phone": "556", "note": "late, \"urgent\""},
                {"total": null}]"#,
        );
        assert_eq!(first.len(), 3);

        let second = normalize(&rows_to_json(&first));
        assert_eq!(second, first);
    }

    #[test]
    fn test_array_of_objects_fans_out_rows() {
        let table = normalize(r#"[{"phone": "123", "name": "A"}, {"phone": "456", "name": "B"}]"#);
        assert_eq!(table.len(), 2);
        assert_eq!(table.headers(), &["phone".to_string(), "name".to_string()]);
        assert_eq!(table.cell(1, "phone"), "456");
    }

    #[test]
    fn test_nested_objects_flatten_with_separator() {
        let table = normalize(r#"{"customer": {"name": "Acme", "address": {"city": "Bern"}}, "total": 10}"#);
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.headers(),
            &[
                "customer.name".to_string(),
                "customer.address.city".to_string(),
                "total".to_string()
            ]
        );
        assert_eq!(table.cell(0, "customer.address.city"), "Bern");
    }

    #[test]
    fn test_custom_separator_and_delimiter() {
        let normalizer = Normalizer::new(NormalizeOptions {
            flatten_separator: "_".to_string(),
            array_delimiter: "|".to_string(),
        });
        let table = normalizer
            .normalize_payload(r#"{"a": {"b": 1}, "tags": ["x", "y"]}"#)
            .unwrap();
        assert_eq!(table.cell(0, "a_b"), "1");
        assert_eq!(table.cell(0, "tags"), "x|y");
    }

    #[test]
    fn test_nested_scalar_array_does_not_fan_out() {
        let table = normalize(r#"[{"id": "1", "codes": ["A", "B", "C"]}]"#);
        assert_eq!(table.len(), 1);
        assert_eq!(table.cell(0, "codes"), "A; B; C");
    }

    #[test]
    fn test_nested_object_array_kept_as_json() {
        let table = normalize(r#"{"lines": [{"sku": "x"}, {"sku": "y"}]}"#);
        assert_eq!(table.len(), 1);
        assert_eq!(table.cell(0, "lines"), r#"[{"sku":"x"},{"sku":"y"}]"#);
    }

    #[test]
    fn test_missing_headers_become_empty_strings() {
        let table = normalize(r#"[{"a": "1"}, {"b": "2"}, {"a": "3", "c": null}]"#);
        assert_eq!(
            table.headers(),
            &["a".to_string(), "b".to_string(), "c".to_string()]
        );
        for row in table.rows() {
            assert_eq!(row.len(), 3);
        }
        assert_eq!(table.cell(0, "c"), "");
        assert_eq!(table.cell(2, "c"), "");
    }

    #[test]
    fn test_empty_results() {
        for payload in ["", "null", "[]", "{}", "  "] {
            let table = normalize(payload);
            assert!(table.is_empty(), "payload {:?}", payload);
            assert!(table.headers().is_empty(), "payload {:?}", payload);
        }
    }

    #[test]
    fn test_scalar_payloads() {
        let table = normalize("42");
        assert_eq!(table.headers(), &[SCALAR_COLUMN.to_string()]);
        assert_eq!(table.cell(0, SCALAR_COLUMN), "42");

        let table = normalize(r#"["a", "b"]"#);
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(1, SCALAR_COLUMN), "b");
    }

    #[test]
    fn test_malformed_payload() {
        let result = Normalizer::default().normalize_payload("<html>oops</html>");
        assert!(matches!(result, Err(NormalizeError::MalformedResult(_))));
    }

    #[test]
    fn test_empty_nested_object_keeps_header() {
        let table = normalize(r#"{"meta": {}, "id": 1}"#);
        assert_eq!(table.headers(), &["meta".to_string(), "id".to_string()]);
        assert_eq!(table.cell(0, "meta"), "");
    }
}
