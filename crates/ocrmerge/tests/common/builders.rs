//! Builder patterns for creating test data programmatically.

#![allow(dead_code)]

use std::collections::BTreeMap;

use serde_json::{json, Value};

use ocrmerge::config::{Config, DefaultBinding, MappingSection};
use ocrmerge::mapping::{ItemType, MappingConfig, MappingTemplate};
use ocrmerge::merge::MatchOptions;
use ocrmerge::table::NormalizeOptions;

/// Builder for creating `Config` instances.
pub struct ConfigBuilder {
    storage_root: String,
    worker_count: usize,
    templates: Vec<MappingTemplate>,
    defaults: Vec<DefaultBinding>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            storage_root: "/tmp/ocrmerge".to_string(),
            worker_count: 1,
            templates: vec![],
            defaults: vec![],
        }
    }

    pub fn storage_root(mut self, path: &str) -> Self {
        self.storage_root = path.to_string();
        self
    }

    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    pub fn template(mut self, template: MappingTemplate) -> Self {
        self.templates.push(template);
        self
    }

    /// Binds a (company, document type, item type) triple to a template name.
    pub fn default_binding(
        mut self,
        company_id: &str,
        document_type_id: &str,
        item_type: ItemType,
        template: &str,
    ) -> Self {
        self.defaults.push(DefaultBinding {
            company_id: company_id.to_string(),
            document_type_id: document_type_id.to_string(),
            item_type,
            template: template.to_string(),
            config_override: None,
        });
        self
    }

    pub fn build(self) -> Config {
        Config {
            version: "1.0".to_string(),
            database_path: None,
            storage_root: self.storage_root,
            worker_count: self.worker_count,
            normalize: NormalizeOptions::default(),
            matching: MatchOptions::default(),
            mapping: MappingSection {
                templates: self.templates,
                defaults: self.defaults,
            },
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating `MappingTemplate` instances.
pub struct TemplateBuilder {
    template: MappingTemplate,
}

impl TemplateBuilder {
    /// A global single-source template.
    pub fn new(name: &str) -> Self {
        Self {
            template: MappingTemplate {
                id: 0,
                name: name.to_string(),
                item_type: ItemType::SingleSource,
                company_id: None,
                document_type_id: None,
                priority: 100,
                config: MappingConfig::default(),
            },
        }
    }

    pub fn multi_source(mut self, internal_key: &str) -> Self {
        self.template.item_type = ItemType::MultiSource;
        self.template.config.internal_join_key = Some(internal_key.to_string());
        self
    }

    pub fn company(mut self, company_id: &str) -> Self {
        self.template.company_id = Some(company_id.to_string());
        self
    }

    pub fn document_type(mut self, document_type_id: &str) -> Self {
        self.template.document_type_id = Some(document_type_id.to_string());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.template.priority = priority;
        self
    }

    pub fn keys(mut self, keys: &[&str]) -> Self {
        self.template.config.external_join_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn alias(mut self, from: &str, to: &str) -> Self {
        self.template
            .config
            .column_aliases
            .insert(from.to_string(), to.to_string());
        self
    }

    pub fn master_csv(mut self, path: &str) -> Self {
        self.template.config.master_csv_path = Some(path.to_string());
        self
    }

    pub fn build(self) -> MappingTemplate {
        self.template
    }
}

/// Builds a JSON array payload from rows of `(header, value)` pairs.
pub fn rows_payload(rows: &[&[(&str, &str)]]) -> String {
    let rows: Vec<Value> = rows
        .iter()
        .map(|cells| {
            let object: serde_json::Map<String, Value> = cells
                .iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                .collect();
            Value::Object(object)
        })
        .collect();
    Value::Array(rows).to_string()
}

/// A nested single-row payload, as OCR engines commonly return.
pub fn nested_invoice_payload(phone: &str, total: &str) -> String {
    json!({
        "customer": { "phone": phone, "name": "Jane Roe" },
        "total": total,
        "lines": ["a", "b"]
    })
    .to_string()
}

pub fn key_list(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

/// Column → value map for one merged row.
pub fn row_of(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
