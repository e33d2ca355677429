//! Mapping template and default repository.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::codec::{json_column, optional_json_column, to_json};
use super::DatabaseError;
use crate::mapping::{select_template, ItemType, MappingDefault, MappingTemplate};

fn template_from_row(row: &Row<'_>) -> Result<MappingTemplate, rusqlite::Error> {
    Ok(MappingTemplate {
        id: row.get("id")?,
        name: row.get("name")?,
        item_type: row.get("item_type")?,
        company_id: row.get("company_id")?,
        document_type_id: row.get("document_type_id")?,
        priority: row.get("priority")?,
        config: json_column(row, "config")?,
    })
}

fn default_from_row(row: &Row<'_>) -> Result<MappingDefault, rusqlite::Error> {
    Ok(MappingDefault {
        company_id: row.get("company_id")?,
        document_type_id: row.get("document_type_id")?,
        item_type: row.get("item_type")?,
        template_id: row.get("template_id")?,
        config_override: optional_json_column(row, "config_override")?,
    })
}

/// Inserts or updates a template keyed by name. Returns the template id.
pub fn upsert_template(conn: &Connection, template: &MappingTemplate) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO mapping_templates (name, item_type, company_id, document_type_id, priority, config, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(name) DO UPDATE SET
            item_type = excluded.item_type,
            company_id = excluded.company_id,
            document_type_id = excluded.document_type_id,
            priority = excluded.priority,
            config = excluded.config,
            updated_at = excluded.updated_at",
        params![
            template.name,
            template.item_type,
            template.company_id,
            template.document_type_id,
            template.priority,
            to_json(&template.config)?,
            Utc::now(),
        ],
    )?;
    let id = conn.query_row(
        "SELECT id FROM mapping_templates WHERE name = ?1",
        params![template.name],
        |r| r.get(0),
    )?;
    Ok(id)
}

pub fn find_template(conn: &Connection, id: i64) -> Result<Option<MappingTemplate>, DatabaseError> {
    Ok(conn
        .query_row(
            "SELECT * FROM mapping_templates WHERE id = ?1",
            params![id],
            template_from_row,
        )
        .optional()?)
}

/// Templates whose scope admits the lookup.
pub fn candidates(
    conn: &Connection,
    company_id: &str,
    document_type_id: &str,
    item_type: ItemType,
) -> Result<Vec<MappingTemplate>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM mapping_templates
         WHERE item_type = ?3
           AND (company_id IS NULL OR company_id = ?1)
           AND (document_type_id IS NULL OR document_type_id = ?2)
         ORDER BY priority, id",
    )?;
    let templates = stmt
        .query_map(params![company_id, document_type_id, item_type], template_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(templates)
}

pub fn find_best_template(
    conn: &Connection,
    company_id: &str,
    document_type_id: &str,
    item_type: ItemType,
) -> Result<Option<MappingTemplate>, DatabaseError> {
    let templates = candidates(conn, company_id, document_type_id, item_type)?;
    Ok(select_template(&templates, company_id, document_type_id, item_type).cloned())
}

pub fn upsert_default(conn: &Connection, default: &MappingDefault) -> Result<(), DatabaseError> {
    let config_override = default.config_override.as_ref().map(to_json).transpose()?;
    conn.execute(
        "INSERT INTO mapping_defaults (company_id, document_type_id, item_type, template_id, config_override, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(company_id, document_type_id, item_type) DO UPDATE SET
            template_id = excluded.template_id,
            config_override = excluded.config_override,
            updated_at = excluded.updated_at",
        params![
            default.company_id,
            default.document_type_id,
            default.item_type,
            default.template_id,
            config_override,
            Utc::now(),
        ],
    )?;
    Ok(())
}

pub fn find_default(
    conn: &Connection,
    company_id: &str,
    document_type_id: &str,
    item_type: ItemType,
) -> Result<Option<MappingDefault>, DatabaseError> {
    Ok(conn
        .query_row(
            "SELECT * FROM mapping_defaults
             WHERE company_id = ?1 AND document_type_id = ?2 AND item_type = ?3",
            params![company_id, document_type_id, item_type],
            default_from_row,
        )
        .optional()?)
}
