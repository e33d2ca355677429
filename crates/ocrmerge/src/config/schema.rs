use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::mapping::{ItemType, MappingConfigOverride, MappingTemplate};
use crate::merge::MatchOptions;
use crate::table::NormalizeOptions;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub version: String,
    /// SQLite file; defaults to `~/.ocrmerge/data/ocrmerge.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,
    /// Root directory of the blob store.
    pub storage_root: String,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default)]
    pub normalize: NormalizeOptions,
    #[serde(default)]
    pub matching: MatchOptions,
    #[serde(default)]
    pub mapping: MappingSection,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

impl Config {
    pub fn resolved_database_path(&self) -> Option<PathBuf> {
        self.database_path
            .as_ref()
            .map(PathBuf::from)
            .or_else(crate::db::default_database_path)
    }
}

/// Templates and defaults seeded into the store at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingSection {
    #[serde(default)]
    pub templates: Vec<MappingTemplate>,
    #[serde(default)]
    pub defaults: Vec<DefaultBinding>,
}

/// A mapping default that names its template instead of using a database
/// id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultBinding {
    pub company_id: String,
    pub document_type_id: String,
    pub item_type: ItemType,
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_override: Option<MappingConfigOverride>,
}
