//! Mapping templates, per-scope defaults and the effective join configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// How many attachment tables a mapping merges into the primary table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    /// One attachment table merged into the primary.
    SingleSource,
    /// Several attachment tables chained on an internal key, then merged.
    MultiSource,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::SingleSource => "single_source",
            ItemType::MultiSource => "multi_source",
        }
    }

    /// Picks the item type implied by the number of attachment files.
    pub fn for_attachment_count(count: usize) -> Self {
        if count > 1 {
            ItemType::MultiSource
        } else {
            ItemType::SingleSource
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_source" => Ok(ItemType::SingleSource),
            "multi_source" => Ok(ItemType::MultiSource),
            other => Err(format!("unknown item type '{}'", other)),
        }
    }
}

/// The join configuration stored on a template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingConfig {
    /// Reference data CSV merged in as an additional attachment table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_csv_path: Option<String>,
    /// Candidate keys joining attachments to the primary, in priority order.
    #[serde(default)]
    pub external_join_keys: Vec<String>,
    /// Key linking attachment tables to each other (multi-source only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_join_key: Option<String>,
    /// OCR header → canonical header.
    #[serde(default)]
    pub column_aliases: BTreeMap<String, String>,
}

/// Partial configuration layered over a template's config.
///
/// A field that is present replaces the template value; `null` on an optional
/// field clears it. Aliases merge entry by entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingConfigOverride {
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub master_csv_path: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_join_keys: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub internal_join_key: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_aliases: Option<BTreeMap<String, String>>,
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`).
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl MappingConfig {
    /// Layers an override on top of this config.
    pub fn layered(&self, layer: &MappingConfigOverride) -> MappingConfig {
        let mut merged = self.clone();
        if let Some(master) = &layer.master_csv_path {
            merged.master_csv_path = master.clone();
        }
        if let Some(keys) = &layer.external_join_keys {
            merged.external_join_keys = keys.clone();
        }
        if let Some(internal) = &layer.internal_join_key {
            merged.internal_join_key = internal.clone();
        }
        if let Some(aliases) = &layer.column_aliases {
            for (from, to) in aliases {
                merged.column_aliases.insert(from.clone(), to.clone());
            }
        }
        merged
    }
}

/// A reusable, optionally scoped join configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingTemplate {
    /// Assigned by the store; zero before the template is saved.
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub item_type: ItemType,
    /// `None` matches any company.
    #[serde(default)]
    pub company_id: Option<String>,
    /// `None` matches any document type.
    #[serde(default)]
    pub document_type_id: Option<String>,
    /// Lower wins among templates of the same scope tier.
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub config: MappingConfig,
}

fn default_priority() -> i32 {
    100
}

impl MappingTemplate {
    /// Checks the template invariants. Returns a human-readable reason on
    /// failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("template name must not be empty".to_string());
        }
        if self.priority < 1 {
            return Err(format!(
                "priority must be a positive integer, got {}",
                self.priority
            ));
        }
        if self.item_type == ItemType::MultiSource
            && self
                .config
                .internal_join_key
                .as_deref()
                .map(str::trim)
                .unwrap_or("")
                .is_empty()
        {
            return Err("multi_source templates require an internal join key".to_string());
        }
        Ok(())
    }
}

/// Binds a (company, document type, item type) triple to a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingDefault {
    pub company_id: String,
    pub document_type_id: String,
    pub item_type: ItemType,
    pub template_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_override: Option<MappingConfigOverride>,
}

/// Where an effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ConfigOrigin {
    /// A mapping default (and its template) for the exact triple.
    Default { template_id: i64 },
    /// A template picked by scope tier.
    Template { template_id: i64 },
    /// Join keys chosen directly on the order.
    OrderKeys,
}

/// The join plan handed to the merge engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveConfig {
    pub item_type: ItemType,
    pub master_csv_path: Option<String>,
    pub external_join_keys: Vec<String>,
    pub internal_join_key: Option<String>,
    pub column_aliases: BTreeMap<String, String>,
    pub origin: ConfigOrigin,
}

impl EffectiveConfig {
    pub fn from_config(item_type: ItemType, config: MappingConfig, origin: ConfigOrigin) -> Self {
        Self {
            item_type,
            master_csv_path: config.master_csv_path,
            external_join_keys: config.external_join_keys,
            internal_join_key: config.internal_join_key,
            column_aliases: config.column_aliases,
            origin,
        }
    }

    /// A bare configuration built from user-selected join keys.
    pub fn from_keys(item_type: ItemType, keys: &[String]) -> Self {
        Self {
            item_type,
            master_csv_path: None,
            external_join_keys: keys.to_vec(),
            internal_join_key: None,
            column_aliases: BTreeMap::new(),
            origin: ConfigOrigin::OrderKeys,
        }
    }

    /// Replaces the external join keys with an order's selection.
    pub fn with_order_keys(mut self, keys: &[String]) -> Self {
        self.external_join_keys = keys.to_vec();
        self
    }
}
