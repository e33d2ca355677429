use std::collections::{HashMap, HashSet};
use std::path::Path;

use log::info;

use crate::config::schema::{Config, MappingSection};
use crate::error::{ConfigError, Result};
use crate::gateway::PersistenceGateway;
use crate::mapping::MappingDefault;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> std::result::Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> std::result::Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> std::result::Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| format!("{} at {}", e, e.instance_path()))
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> std::result::Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "workerCount must be at least 1".to_string(),
        });
    }

    if config.normalize.flatten_separator.is_empty() {
        return Err(ConfigError::Validation {
            message: "normalize.flattenSeparator must not be empty".to_string(),
        });
    }

    validate_mapping(&config.mapping)
}

fn validate_mapping(mapping: &MappingSection) -> std::result::Result<(), ConfigError> {
    let mut names = HashSet::new();
    for template in &mapping.templates {
        template
            .validate()
            .map_err(|reason| ConfigError::InvalidTemplate {
                name: template.name.clone(),
                reason,
            })?;
        if !names.insert(template.name.as_str()) {
            return Err(ConfigError::InvalidTemplate {
                name: template.name.clone(),
                reason: "Duplicate template name".to_string(),
            });
        }
    }

    let mut triples = HashSet::new();
    for binding in &mapping.defaults {
        let invalid = |reason: String| ConfigError::InvalidDefault {
            company_id: binding.company_id.clone(),
            document_type_id: binding.document_type_id.clone(),
            reason,
        };

        if !names.contains(binding.template.as_str()) {
            return Err(invalid(format!("Unknown template '{}'", binding.template)));
        }
        if !triples.insert((
            binding.company_id.as_str(),
            binding.document_type_id.as_str(),
            binding.item_type,
        )) {
            return Err(invalid(format!(
                "Duplicate default for item type {}",
                binding.item_type
            )));
        }
    }

    Ok(())
}

/// Counts of what a seed wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeedSummary {
    pub templates: usize,
    pub defaults: usize,
}

/// Upserts the configured templates (by name) and defaults into the store.
/// Running it twice leaves the store unchanged.
pub fn seed_mapping_config(
    gateway: &dyn PersistenceGateway,
    mapping: &MappingSection,
) -> Result<SeedSummary> {
    validate_mapping(mapping)?;

    let mut ids = HashMap::new();
    for template in &mapping.templates {
        let id = gateway.save_mapping_template(template)?;
        ids.insert(template.name.as_str(), id);
    }

    for binding in &mapping.defaults {
        let template_id = ids.get(binding.template.as_str()).copied().ok_or_else(|| {
            ConfigError::InvalidDefault {
                company_id: binding.company_id.clone(),
                document_type_id: binding.document_type_id.clone(),
                reason: format!("Unknown template '{}'", binding.template),
            }
        })?;
        gateway.save_mapping_default(&MappingDefault {
            company_id: binding.company_id.clone(),
            document_type_id: binding.document_type_id.clone(),
            item_type: binding.item_type,
            template_id,
            config_override: binding.config_override.clone(),
        })?;
    }

    let summary = SeedSummary {
        templates: mapping.templates.len(),
        defaults: mapping.defaults.len(),
    };
    info!(
        "Seeded {} mapping templates and {} defaults",
        summary.templates, summary.defaults
    );
    Ok(summary)
}
