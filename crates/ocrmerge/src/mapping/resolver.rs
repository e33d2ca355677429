//! Resolves the effective join configuration for a company / document type.
//!
//! Lookup order:
//! 1. the mapping default bound to the exact (company, doc type, item type)
//! 2. otherwise the best template by scope tier: company + doc type, company
//!    only, doc type only, global. Within a tier the lowest priority wins,
//!    then the lowest id.

use log::{debug, warn};

use super::template::{ConfigOrigin, EffectiveConfig, ItemType, MappingDefault, MappingTemplate};
use crate::db::DatabaseError;

/// Read access to stored templates and defaults.
pub trait MappingSource {
    fn mapping_default(
        &self,
        company_id: &str,
        document_type_id: &str,
        item_type: ItemType,
    ) -> Result<Option<MappingDefault>, DatabaseError>;

    fn mapping_template(&self, id: i64) -> Result<Option<MappingTemplate>, DatabaseError>;

    /// Returns the best template for the scope, following the tier order.
    fn find_mapping_template(
        &self,
        company_id: &str,
        document_type_id: &str,
        item_type: ItemType,
    ) -> Result<Option<MappingTemplate>, DatabaseError>;
}

/// Scope specificity of a template relative to a lookup. Lower is more specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScopeTier {
    CompanyAndDocumentType,
    CompanyOnly,
    DocumentTypeOnly,
    Global,
}

impl ScopeTier {
    /// Returns the tier a template falls into for the lookup, or `None` when
    /// its scope names a different company or document type.
    pub fn of(template: &MappingTemplate, company_id: &str, document_type_id: &str) -> Option<Self> {
        let company = match template.company_id.as_deref() {
            Some(c) if c == company_id => Some(true),
            Some(_) => None,
            None => Some(false),
        }?;
        let doc_type = match template.document_type_id.as_deref() {
            Some(d) if d == document_type_id => Some(true),
            Some(_) => None,
            None => Some(false),
        }?;

        Some(match (company, doc_type) {
            (true, true) => ScopeTier::CompanyAndDocumentType,
            (true, false) => ScopeTier::CompanyOnly,
            (false, true) => ScopeTier::DocumentTypeOnly,
            (false, false) => ScopeTier::Global,
        })
    }
}

/// Picks the template that applies to the lookup from a candidate set.
///
/// Scope specificity always beats priority; priority and then id only break
/// ties inside a tier.
pub fn select_template<'a, I>(
    templates: I,
    company_id: &str,
    document_type_id: &str,
    item_type: ItemType,
) -> Option<&'a MappingTemplate>
where
    I: IntoIterator<Item = &'a MappingTemplate>,
{
    templates
        .into_iter()
        .filter(|t| t.item_type == item_type)
        .filter_map(|t| ScopeTier::of(t, company_id, document_type_id).map(|tier| (tier, t)))
        .min_by_key(|(tier, t)| (*tier, t.priority, t.id))
        .map(|(_, t)| t)
}

/// Resolves the effective configuration. `Ok(None)` means no mapping is
/// available for the scope, which callers treat as a normal outcome.
pub fn resolve<S>(
    source: &S,
    company_id: &str,
    document_type_id: &str,
    item_type: ItemType,
) -> Result<Option<EffectiveConfig>, DatabaseError>
where
    S: MappingSource + ?Sized,
{
    if let Some(default) = source.mapping_default(company_id, document_type_id, item_type)? {
        match source.mapping_template(default.template_id)? {
            Some(template) if template.item_type != item_type => {
                warn!(
                    "Mapping default for {}/{} ({}) points at {} template {}, falling back to scoped templates",
                    company_id, document_type_id, item_type, template.item_type, template.id
                );
            }
            Some(template) => {
                let config = match &default.config_override {
                    Some(layer) => template.config.layered(layer),
                    None => template.config.clone(),
                };
                debug!(
                    "Resolved mapping for {}/{} ({}) from default template {}",
                    company_id, document_type_id, item_type, template.id
                );
                return Ok(Some(EffectiveConfig::from_config(
                    template.item_type,
                    config,
                    ConfigOrigin::Default {
                        template_id: template.id,
                    },
                )));
            }
            None => {
                warn!(
                    "Mapping default for {}/{} ({}) points at missing template {}, falling back to scoped templates",
                    company_id, document_type_id, item_type, default.template_id
                );
            }
        }
    }

    let template = source.find_mapping_template(company_id, document_type_id, item_type)?;
    Ok(template.map(|t| {
        debug!(
            "Resolved mapping for {}/{} ({}) from template {} '{}'",
            company_id, document_type_id, item_type, t.id, t.name
        );
        EffectiveConfig::from_config(
            t.item_type,
            t.config,
            ConfigOrigin::Template { template_id: t.id },
        )
    }))
}
