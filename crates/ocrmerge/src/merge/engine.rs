//! Left outer join of a primary table against attachment tables.
//!
//! For every primary row the external join keys are tried in priority order.
//! A key is only a candidate when the primary row has a value for it and some
//! attachment row does too; the first candidate with at least one match
//! decides the join. Unmatched primary rows are kept exactly once.

use std::collections::BTreeMap;

use log::warn;
use serde::{Deserialize, Serialize};

use super::keys::{KeyIndex, MatchOptions};
use crate::error::MergeError;
use crate::mapping::{EffectiveConfig, ItemType};
use crate::table::{Row, RowTable};

/// Provenance column naming the join key that produced the row.
pub const JOIN_KEY_COLUMN: &str = "_join_key";

/// Provenance column holding the primary value that matched.
pub const JOIN_VALUE_COLUMN: &str = "_join_value";

/// Provenance value for primary rows without any match.
pub const UNMATCHED: &str = "unmatched";

/// Result of a merge: the joined rows plus provenance columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedTable {
    table: RowTable,
}

impl MergedTable {
    pub fn headers(&self) -> &[String] {
        self.table.headers()
    }

    pub fn rows(&self) -> &[Row] {
        self.table.rows()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn as_table(&self) -> &RowTable {
        &self.table
    }

    pub fn into_table(self) -> RowTable {
        self.table
    }

    /// Concatenates merged tables in order. Headers are unioned in first-seen
    /// order with the provenance columns kept last.
    pub fn concat<I>(parts: I) -> MergedTable
    where
        I: IntoIterator<Item = MergedTable>,
    {
        let parts: Vec<MergedTable> = parts.into_iter().collect();
        if parts.is_empty() {
            return MergedTable::default();
        }

        let mut table = RowTable::with_headers(
            parts
                .iter()
                .flat_map(|p| p.headers().iter())
                .filter(|h| h.as_str() != JOIN_KEY_COLUMN && h.as_str() != JOIN_VALUE_COLUMN)
                .cloned()
                .chain([JOIN_KEY_COLUMN.to_string(), JOIN_VALUE_COLUMN.to_string()]),
        );
        for part in &parts {
            table.extend_from(&part.table);
        }
        MergedTable { table }
    }

    /// Counts rows per `_join_key` value.
    pub fn provenance_summary(&self) -> BTreeMap<String, usize> {
        let mut summary = BTreeMap::new();
        for row in self.rows() {
            let key = row.get(JOIN_KEY_COLUMN).cloned().unwrap_or_default();
            *summary.entry(key).or_insert(0) += 1;
        }
        summary
    }
}

/// Merges `attachments` into `primary` following the join plan.
///
/// Deterministic: identical inputs always produce identical output, row order
/// included.
pub fn merge(
    primary: &RowTable,
    attachments: &[RowTable],
    config: &EffectiveConfig,
    options: &MatchOptions,
) -> Result<MergedTable, MergeError> {
    let keys: Vec<&str> = config
        .external_join_keys
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect();
    if keys.is_empty() {
        return Err(MergeError::NoJoinKeysConfigured);
    }

    let aliased: Vec<RowTable> = attachments
        .iter()
        .map(|t| apply_aliases(t, &config.column_aliases))
        .collect();

    let combined = match config.item_type {
        ItemType::MultiSource => {
            let internal = config
                .internal_join_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .ok_or(MergeError::NoInternalJoinKey)?;
            chain_attachments(aliased, internal, options)
        }
        ItemType::SingleSource => stack_attachments(aliased),
    };

    Ok(join_primary(primary, &combined, &keys, options))
}

/// Renames aliased headers to their canonical names.
pub fn apply_aliases(table: &RowTable, aliases: &BTreeMap<String, String>) -> RowTable {
    let mut table = table.clone();
    table.rename_headers(aliases);
    table
}

fn stack_attachments(tables: Vec<RowTable>) -> RowTable {
    let mut tables = tables.into_iter();
    let mut combined = tables.next().unwrap_or_default();
    for table in tables {
        combined.extend_from(&table);
    }
    combined
}

/// Left-joins the attachments to each other, in order, on one fixed key.
///
/// Leading attachments without rows are skipped so they cannot blank out the
/// rest of the chain.
fn chain_attachments(tables: Vec<RowTable>, key: &str, options: &MatchOptions) -> RowTable {
    let skipped = tables.iter().take_while(|t| t.is_empty()).count();
    if skipped > 0 && skipped < tables.len() {
        warn!(
            "Skipping {} empty leading attachment(s) in multi-source chain on '{}'",
            skipped, key
        );
    }
    let mut tables = tables.into_iter().skip(skipped);
    let mut combined = tables.next().unwrap_or_default();

    for right in tables {
        let index = KeyIndex::build(&right, key, options);
        let new_headers: Vec<&String> = right
            .headers()
            .iter()
            .filter(|h| !combined.has_header(h))
            .collect();

        let mut joined = RowTable::with_headers(
            combined
                .headers()
                .iter()
                .chain(new_headers.iter().copied())
                .cloned(),
        );

        for left_row in combined.rows() {
            let value = left_row.get(key).map(String::as_str).unwrap_or("");
            let matches = index.lookup(value, options);
            if matches.is_empty() {
                joined.push_row(left_row.clone());
                continue;
            }
            for &idx in matches {
                let mut row = left_row.clone();
                extend_row(&mut row, &right.rows()[idx], &new_headers);
                joined.push_row(row);
            }
        }

        combined = joined;
    }

    combined
}

fn join_primary(
    primary: &RowTable,
    attachments: &RowTable,
    keys: &[&str],
    options: &MatchOptions,
) -> MergedTable {
    let new_headers: Vec<&String> = attachments
        .headers()
        .iter()
        .filter(|h| !primary.has_header(h))
        .filter(|h| h.as_str() != JOIN_KEY_COLUMN && h.as_str() != JOIN_VALUE_COLUMN)
        .collect();

    let mut table = RowTable::with_headers(
        primary
            .headers()
            .iter()
            .chain(new_headers.iter().copied())
            .cloned()
            .chain([JOIN_KEY_COLUMN.to_string(), JOIN_VALUE_COLUMN.to_string()]),
    );

    let indexes: Vec<(&str, KeyIndex)> = keys
        .iter()
        .map(|&k| (k, KeyIndex::build(attachments, k, options)))
        .collect();

    for primary_row in primary.rows() {
        let chosen = indexes.iter().find_map(|(key, index)| {
            let value = primary_row.get(*key).map(String::as_str).unwrap_or("");
            if index.is_empty() {
                return None;
            }
            let matches = index.lookup(value, options);
            (!matches.is_empty()).then_some((*key, value, matches))
        });

        match chosen {
            Some((key, value, matches)) => {
                for &idx in matches {
                    let mut row = primary_row.clone();
                    extend_row(&mut row, &attachments.rows()[idx], &new_headers);
                    row.insert(JOIN_KEY_COLUMN.to_string(), key.to_string());
                    row.insert(JOIN_VALUE_COLUMN.to_string(), value.to_string());
                    table.push_row(row);
                }
            }
            None => {
                let mut row = primary_row.clone();
                row.insert(JOIN_KEY_COLUMN.to_string(), UNMATCHED.to_string());
                row.insert(JOIN_VALUE_COLUMN.to_string(), String::new());
                table.push_row(row);
            }
        }
    }

    MergedTable { table }
}

/// Copies the non-overlapping attachment cells into a primary row.
fn extend_row(row: &mut Row, source: &Row, headers: &[&String]) {
    for header in headers {
        let value = source.get(*header).cloned().unwrap_or_default();
        row.insert((*header).clone(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::ConfigOrigin;

    fn record(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn table(rows: &[&[(&str, &str)]]) -> RowTable {
        RowTable::from_records(rows.iter().map(|r| record(r)))
    }

    fn config(keys: &[&str]) -> EffectiveConfig {
        EffectiveConfig::from_keys(
            ItemType::SingleSource,
            &keys.iter().map(|k| k.to_string()).collect::<Vec<_>>(),
        )
    }

    #[test]
    fn test_key_fallback() {
        let primary = table(&[&[("phone", "123"), ("acct", "A1")]]);
        let attachment = table(&[&[("acct", "A1"), ("dept", "Sales")]]);

        let merged = merge(
            &primary,
            &[attachment],
            &config(&["phone", "acct"]),
            &MatchOptions::default(),
        )
        .unwrap();

        assert_eq!(merged.len(), 1);
        let row = &merged.rows()[0];
        assert_eq!(row[JOIN_KEY_COLUMN], "acct");
        assert_eq!(row[JOIN_VALUE_COLUMN], "A1");
        assert_eq!(row["dept"], "Sales");
    }

    #[test]
    fn test_key_with_zero_matches_falls_through() {
        let primary = table(&[&[("phone", "999"), ("acct", "A1")]]);
        let attachment = table(&[
            &[("phone", "123"), ("acct", "A1"), ("dept", "Sales")],
        ]);

        let merged = merge(
            &primary,
            &[attachment],
            &config(&["phone", "acct"]),
            &MatchOptions::default(),
        )
        .unwrap();
        assert_eq!(merged.rows()[0][JOIN_KEY_COLUMN], "acct");
        assert_eq!(merged.rows()[0]["dept"], "Sales");
    }

    #[test]
    fn test_unmatched_row_kept_once() {
        let primary = table(&[&[("phone", "1")], &[("phone", "2")]]);
        let attachment = table(&[&[("phone", "1"), ("dept", "Ops")]]);

        let merged = merge(
            &primary,
            &[attachment],
            &config(&["phone"]),
            &MatchOptions::default(),
        )
        .unwrap();

        assert_eq!(merged.len(), 2);
        let unmatched = &merged.rows()[1];
        assert_eq!(unmatched["phone"], "2");
        assert_eq!(unmatched["dept"], "");
        assert_eq!(unmatched[JOIN_KEY_COLUMN], UNMATCHED);
        assert_eq!(unmatched[JOIN_VALUE_COLUMN], "");
    }

    #[test]
    fn test_primary_without_any_key_column() {
        let primary = table(&[&[("name", "Acme")]]);
        let attachment = table(&[&[("phone", "1")]]);

        let merged = merge(
            &primary,
            &[attachment],
            &config(&["phone"]),
            &MatchOptions::default(),
        )
        .unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.rows()[0][JOIN_KEY_COLUMN], UNMATCHED);
    }

    #[test]
    fn test_fan_out() {
        let primary = table(&[&[("acct", "A1"), ("total", "10")]]);
        let attachment = table(&[
            &[("acct", "A1"), ("line", "first")],
            &[("acct", "B2"), ("line", "other")],
            &[("acct", "a1 "), ("line", "second")],
        ]);

        let merged = merge(
            &primary,
            &[attachment],
            &config(&["acct"]),
            &MatchOptions::default(),
        )
        .unwrap();

        assert_eq!(merged.len(), 2);
        assert_eq!(merged.rows()[0]["line"], "first");
        assert_eq!(merged.rows()[1]["line"], "second");
        assert_eq!(merged.rows()[0]["total"], merged.rows()[1]["total"]);
    }

    #[test]
    fn test_exact_matching_disables_folding() {
        let primary = table(&[&[("acct", "A1")]]);
        let attachment = table(&[&[("acct", "a1"), ("dept", "Ops")]]);

        let merged = merge(
            &primary,
            &[attachment],
            &config(&["acct"]),
            &MatchOptions::exact(),
        )
        .unwrap();
        assert_eq!(merged.rows()[0][JOIN_KEY_COLUMN], UNMATCHED);
    }

    #[test]
    fn test_headers_union_and_overlap_keeps_primary() {
        let primary = table(&[&[("acct", "A1"), ("name", "Primary")]]);
        let attachment = table(&[&[("name", "Attachment"), ("acct", "A1"), ("empty", "")]]);

        let merged = merge(
            &primary,
            &[attachment],
            &config(&["acct"]),
            &MatchOptions::default(),
        )
        .unwrap();

        assert_eq!(
            merged.headers(),
            &[
                "acct".to_string(),
                "name".to_string(),
                "empty".to_string(),
                JOIN_KEY_COLUMN.to_string(),
                JOIN_VALUE_COLUMN.to_string(),
            ]
        );
        assert_eq!(merged.rows()[0]["name"], "Primary");
    }

    #[test]
    fn test_aliases_resolved_before_matching() {
        let primary = table(&[&[("phone", "555")]]);
        let attachment = table(&[&[("tel", "555"), ("dept", "Ops")]]);
        let mut cfg = config(&["phone"]);
        cfg.column_aliases
            .insert("tel".to_string(), "phone".to_string());

        let merged = merge(&primary, &[attachment], &cfg, &MatchOptions::default()).unwrap();
        assert_eq!(merged.rows()[0][JOIN_KEY_COLUMN], "phone");
        assert!(!merged.headers().contains(&"tel".to_string()));
    }

    #[test]
    fn test_chained_aliases_rename_original_headers_once() {
        let attachment = table(&[&[("a", "1"), ("x", "2")]]);
        let aliases: BTreeMap<String, String> = [("a", "b"), ("b", "c")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let aliased = apply_aliases(&attachment, &aliases);
        assert_eq!(aliased.headers(), &["b".to_string(), "x".to_string()]);
        assert_eq!(aliased.cell(0, "b"), "1");
    }

    #[test]
    fn test_no_join_keys() {
        let result = merge(
            &RowTable::default(),
            &[],
            &config(&[" "]),
            &MatchOptions::default(),
        );
        assert_eq!(result, Err(MergeError::NoJoinKeysConfigured));
    }

    #[test]
    fn test_multi_source_requires_internal_key() {
        let mut cfg = config(&["acct"]);
        cfg.item_type = ItemType::MultiSource;
        let result = merge(&RowTable::default(), &[], &cfg, &MatchOptions::default());
        assert_eq!(result, Err(MergeError::NoInternalJoinKey));
    }

    #[test]
    fn test_single_source_stacks_attachments() {
        let primary = table(&[&[("acct", "A1")], &[("acct", "B2")]]);
        let first = table(&[&[("acct", "A1"), ("dept", "Ops")]]);
        let second = table(&[&[("acct", "B2"), ("region", "North")]]);

        let merged = merge(
            &primary,
            &[first, second],
            &config(&["acct"]),
            &MatchOptions::default(),
        )
        .unwrap();

        assert_eq!(merged.len(), 2);
        assert_eq!(merged.rows()[0]["dept"], "Ops");
        assert_eq!(merged.rows()[1]["region"], "North");
        assert_eq!(merged.rows()[1]["dept"], "");
    }

    #[test]
    fn test_multi_source_chains_on_internal_key() {
        let primary = table(&[&[("acct", "A1")]]);
        let invoices = table(&[
            &[("invoice_id", "I1"), ("acct", "A1")],
            &[("invoice_id", "I2"), ("acct", "A1")],
        ]);
        let lines = table(&[
            &[("invoice_id", "I1"), ("sku", "X")],
            &[("invoice_id", "I2"), ("sku", "Y")],
        ]);
        let cfg = EffectiveConfig {
            item_type: ItemType::MultiSource,
            master_csv_path: None,
            external_join_keys: vec!["acct".to_string()],
            internal_join_key: Some("invoice_id".to_string()),
            column_aliases: BTreeMap::new(),
            origin: ConfigOrigin::OrderKeys,
        };

        let merged = merge(&primary, &[invoices, lines], &cfg, &MatchOptions::default()).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.rows()[0]["sku"], "X");
        assert_eq!(merged.rows()[1]["sku"], "Y");
        assert_eq!(merged.provenance_summary()["acct"], 2);
    }

    #[test]
    fn test_multi_source_skips_empty_leading_attachment() {
        let primary = table(&[&[("acct", "A1")]]);
        let invoices = table(&[&[("invoice_id", "I1"), ("acct", "A1")]]);
        let lines = table(&[&[("invoice_id", "I1"), ("sku", "X")]]);
        let mut cfg = config(&["acct"]);
        cfg.item_type = ItemType::MultiSource;
        cfg.internal_join_key = Some("invoice_id".to_string());

        let merged = merge(
            &primary,
            &[RowTable::default(), invoices, lines],
            &cfg,
            &MatchOptions::default(),
        )
        .unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.rows()[0]["sku"], "X");
        assert_eq!(merged.rows()[0][JOIN_KEY_COLUMN], "acct");
    }

    #[test]
    fn test_concat_keeps_provenance_last() {
        let first = merge(
            &table(&[&[("acct", "A1")]]),
            &[table(&[&[("acct", "A1"), ("amount", "5")]])],
            &config(&["acct"]),
            &MatchOptions::default(),
        )
        .unwrap();
        let second = merge(
            &table(&[&[("acct", "B2"), ("region", "EU")]]),
            &[],
            &config(&["acct"]),
            &MatchOptions::default(),
        )
        .unwrap();

        let combined = MergedTable::concat(vec![first, second]);
        assert_eq!(
            combined.headers(),
            &["acct", "amount", "region", JOIN_KEY_COLUMN, JOIN_VALUE_COLUMN]
        );
        assert_eq!(combined.len(), 2);
        assert_eq!(combined.as_table().cell(0, "region"), "");
        assert_eq!(combined.as_table().cell(1, JOIN_KEY_COLUMN), UNMATCHED);
        assert!(MergedTable::concat(Vec::new()).is_empty());
    }

    #[test]
    fn test_merge_is_deterministic() {
        let primary = table(&[&[("acct", "A1"), ("phone", "1")], &[("acct", "Z"), ("phone", "2")]]);
        let attachment = table(&[
            &[("phone", "2"), ("x", "b")],
            &[("acct", "a1"), ("x", "a")],
        ]);
        let cfg = config(&["acct", "phone"]);

        let first = merge(&primary, &[attachment.clone()], &cfg, &MatchOptions::default()).unwrap();
        let second = merge(&primary, &[attachment], &cfg, &MatchOptions::default()).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            crate::table::to_csv(first.as_table()).unwrap(),
            crate::table::to_csv(second.as_table()).unwrap()
        );
    }
}
