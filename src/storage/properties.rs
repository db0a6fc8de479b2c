//! Property definitions and property groups.
//!
//! This is metadata only. Objects can carry any property name whether or
//! not a definition exists; definitions describe what the UI and clients
//! should expect.

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::model::{BatchError, BatchResult, now_timestamp};
use crate::{Error, Result};
use super::types;

const PROPERTY_COLUMNS: &str = "name, label, type, field_type, group_name, description, options, display_order, hidden, has_unique_value, hubspot_defined, archived, archived_at, created_at, updated_at";

const VALID_TYPES: &[&str] = &["string", "number", "date", "datetime", "enumeration", "bool", "phone_number"];

const VALID_FIELD_TYPES: &[&str] = &[
    "text",
    "textarea",
    "number",
    "date",
    "select",
    "radio",
    "checkbox",
    "booleancheckbox",
    "phonenumber",
    "file",
    "html",
    "calculation_equation",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyOption {
    pub label: String,
    pub value: String,
    #[serde(default)]
    pub display_order: i64,
    #[serde(default)]
    pub hidden: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDefinition {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub field_type: String,
    pub group_name: String,
    pub description: String,
    pub options: Vec<PropertyOption>,
    pub display_order: i64,
    pub hidden: bool,
    pub has_unique_value: bool,
    pub hubspot_defined: bool,
    pub archived: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Body of a property create request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyInput {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub field_type: String,
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub options: Vec<PropertyOption>,
    #[serde(default)]
    pub display_order: Option<i64>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub has_unique_value: bool,
}

impl PropertyInput {
    pub fn new(name: &str, label: &str, kind: &str, field_type: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: kind.to_string(),
            field_type: field_type.to_string(),
            group_name: None,
            description: String::new(),
            options: Vec::new(),
            display_order: None,
            hidden: false,
            has_unique_value: false,
        }
    }
}

/// Body of a property update request; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyPatch {
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub field_type: Option<String>,
    pub group_name: Option<String>,
    pub description: Option<String>,
    pub options: Option<Vec<PropertyOption>>,
    pub display_order: Option<i64>,
    pub hidden: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyGroup {
    pub name: String,
    pub label: String,
    pub display_order: i64,
    pub archived: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyGroupInput {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub display_order: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyGroupPatch {
    pub label: Option<String>,
    pub display_order: Option<i64>,
}

/// Property metadata store
pub struct PropertyStore<'a> {
    conn: &'a Connection,
}

impl<'a> PropertyStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    // ========== Property Operations ==========

    /// List definitions for a type; `archived` selects archived or live ones
    pub fn list(&self, type_ref: &str, archived: bool) -> Result<Vec<PropertyDefinition>> {
        let type_id = types::resolve(self.conn, type_ref)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM property_definitions WHERE object_type_id = ?1 AND archived = ?2 ORDER BY display_order, name",
            PROPERTY_COLUMNS
        ))?;
        let defs = stmt
            .query_map(params![type_id, archived], row_to_definition)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(defs)
    }

    /// Get a definition by name (archived definitions included)
    pub fn get(&self, type_ref: &str, name: &str) -> Result<PropertyDefinition> {
        let type_id = types::resolve(self.conn, type_ref)?;
        self.find(&type_id, name)?
            .ok_or_else(|| Error::not_found("property", name))
    }

    fn find(&self, type_id: &str, name: &str) -> Result<Option<PropertyDefinition>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM property_definitions WHERE object_type_id = ?1 AND name = ?2",
                    PROPERTY_COLUMNS
                ),
                params![type_id, name],
                row_to_definition,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Create a definition. A missing group name falls back to the type's
    /// default information group, which is created on demand.
    pub fn create(&self, type_ref: &str, input: PropertyInput) -> Result<PropertyDefinition> {
        let type_id = types::resolve(self.conn, type_ref)?;
        validate_kind(&input.kind, &input.field_type)?;
        if input.name.trim().is_empty() {
            return Err(Error::validation("property name is required"));
        }
        if input.label.trim().is_empty() {
            return Err(Error::validation("property label is required"));
        }

        let group_name = match input.group_name {
            Some(group) => {
                if self.find_group(&type_id, &group)?.is_none() {
                    return Err(Error::not_found("property group", group));
                }
                group
            }
            None => self.ensure_default_group(&type_id)?,
        };

        let now = now_timestamp();
        let options = serde_json::to_string(&input.options)?;
        self.conn
            .execute(
                r#"
                INSERT INTO property_definitions
                    (object_type_id, name, label, type, field_type, group_name, description, options,
                     display_order, hidden, has_unique_value, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
                "#,
                params![
                    type_id,
                    input.name,
                    input.label,
                    input.kind,
                    input.field_type,
                    group_name,
                    input.description,
                    options,
                    input.display_order.unwrap_or(-1),
                    input.hidden,
                    input.has_unique_value,
                    now,
                ],
            )
            .map_err(|e| {
                Error::conflict_on_unique(e, format!("property {} already exists", input.name))
            })?;

        tracing::debug!(object_type = %type_id, property = %input.name, "created property");
        self.get(&type_id, &input.name)
    }

    pub fn update(&self, type_ref: &str, name: &str, patch: PropertyPatch) -> Result<PropertyDefinition> {
        let type_id = types::resolve(self.conn, type_ref)?;
        let current = self
            .find(&type_id, name)?
            .ok_or_else(|| Error::not_found("property", name))?;

        let kind = patch.kind.unwrap_or(current.kind);
        let field_type = patch.field_type.unwrap_or(current.field_type);
        validate_kind(&kind, &field_type)?;
        if let Some(group) = &patch.group_name {
            if self.find_group(&type_id, group)?.is_none() {
                return Err(Error::not_found("property group", group.clone()));
            }
        }

        let options = match patch.options {
            Some(options) => options,
            None => current.options,
        };
        self.conn.execute(
            r#"
            UPDATE property_definitions
            SET label = ?1, type = ?2, field_type = ?3, group_name = ?4, description = ?5,
                options = ?6, display_order = ?7, hidden = ?8, updated_at = ?9
            WHERE object_type_id = ?10 AND name = ?11
            "#,
            params![
                patch.label.unwrap_or(current.label),
                kind,
                field_type,
                patch.group_name.unwrap_or(current.group_name),
                patch.description.unwrap_or(current.description),
                serde_json::to_string(&options)?,
                patch.display_order.unwrap_or(current.display_order),
                patch.hidden.unwrap_or(current.hidden),
                now_timestamp(),
                type_id,
                name,
            ],
        )?;
        self.get(&type_id, name)
    }

    /// Soft-delete a definition. Built-in definitions cannot be archived.
    pub fn archive(&self, type_ref: &str, name: &str) -> Result<()> {
        let type_id = types::resolve(self.conn, type_ref)?;
        let current = self
            .find(&type_id, name)?
            .ok_or_else(|| Error::not_found("property", name))?;
        if current.hubspot_defined {
            return Err(Error::validation(format!("{} is a built-in property and cannot be archived", name)));
        }
        let now = now_timestamp();
        self.conn.execute(
            "UPDATE property_definitions SET archived = 1, archived_at = ?1, updated_at = ?1 WHERE object_type_id = ?2 AND name = ?3",
            params![now, type_id, name],
        )?;
        Ok(())
    }

    /// Create several definitions, stopping at the first failure
    pub fn batch_create(&self, type_ref: &str, inputs: Vec<PropertyInput>) -> Result<BatchResult<PropertyDefinition>> {
        let started_at = now_timestamp();
        let mut results = Vec::with_capacity(inputs.len());
        for input in inputs {
            results.push(self.create(type_ref, input)?);
        }
        Ok(BatchResult::complete(started_at, results, Vec::new()))
    }

    /// Read several definitions; unknown names are reported, not fatal
    pub fn batch_read(&self, type_ref: &str, names: &[String]) -> Result<BatchResult<PropertyDefinition>> {
        let started_at = now_timestamp();
        let type_id = types::resolve(self.conn, type_ref)?;
        let mut results = Vec::new();
        let mut missing = Vec::new();
        for name in names {
            match self.find(&type_id, name)? {
                Some(def) => results.push(def),
                None => missing.push(name.clone()),
            }
        }
        let errors = missing
            .into_iter()
            .map(|name| BatchError::new("OBJECT_NOT_FOUND", format!("Property {} does not exist", name), vec![name]))
            .collect();
        Ok(BatchResult::complete(started_at, results, errors))
    }

    pub fn batch_archive(&self, type_ref: &str, names: &[String]) -> Result<()> {
        for name in names {
            self.archive(type_ref, name)?;
        }
        Ok(())
    }

    // ========== Group Operations ==========

    pub fn list_groups(&self, type_ref: &str) -> Result<Vec<PropertyGroup>> {
        let type_id = types::resolve(self.conn, type_ref)?;
        let mut stmt = self.conn.prepare(
            "SELECT name, label, display_order, archived FROM property_groups WHERE object_type_id = ?1 AND archived = 0 ORDER BY display_order, name",
        )?;
        let groups = stmt
            .query_map([&type_id], row_to_group)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(groups)
    }

    pub fn get_group(&self, type_ref: &str, name: &str) -> Result<PropertyGroup> {
        let type_id = types::resolve(self.conn, type_ref)?;
        self.find_group(&type_id, name)?
            .ok_or_else(|| Error::not_found("property group", name))
    }

    fn find_group(&self, type_id: &str, name: &str) -> Result<Option<PropertyGroup>> {
        self.conn
            .query_row(
                "SELECT name, label, display_order, archived FROM property_groups WHERE object_type_id = ?1 AND name = ?2 AND archived = 0",
                params![type_id, name],
                row_to_group,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn create_group(&self, type_ref: &str, input: PropertyGroupInput) -> Result<PropertyGroup> {
        let type_id = types::resolve(self.conn, type_ref)?;
        if input.name.trim().is_empty() {
            return Err(Error::validation("group name is required"));
        }
        self.conn
            .execute(
                "INSERT INTO property_groups (object_type_id, name, label, display_order) VALUES (?1, ?2, ?3, ?4)",
                params![type_id, input.name, input.label, input.display_order.unwrap_or(-1)],
            )
            .map_err(|e| Error::conflict_on_unique(e, format!("property group {} already exists", input.name)))?;
        self.get_group(&type_id, &input.name)
    }

    pub fn update_group(&self, type_ref: &str, name: &str, patch: PropertyGroupPatch) -> Result<PropertyGroup> {
        let current = self.get_group(type_ref, name)?;
        let type_id = types::resolve(self.conn, type_ref)?;
        self.conn.execute(
            "UPDATE property_groups SET label = ?1, display_order = ?2 WHERE object_type_id = ?3 AND name = ?4",
            params![
                patch.label.unwrap_or(current.label),
                patch.display_order.unwrap_or(current.display_order),
                type_id,
                name,
            ],
        )?;
        self.get_group(&type_id, name)
    }

    pub fn archive_group(&self, type_ref: &str, name: &str) -> Result<()> {
        self.get_group(type_ref, name)?;
        let type_id = types::resolve(self.conn, type_ref)?;
        self.conn.execute(
            "UPDATE property_groups SET archived = 1 WHERE object_type_id = ?1 AND name = ?2",
            params![type_id, name],
        )?;
        Ok(())
    }

    /// `<singular label>information`, e.g. `contactinformation`
    fn ensure_default_group(&self, type_id: &str) -> Result<String> {
        let singular: String = self.conn.query_row(
            "SELECT label_singular FROM object_types WHERE id = ?1",
            [type_id],
            |row| row.get(0),
        )?;
        let compact: String = singular
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        let name = format!("{}information", compact);
        self.conn.execute(
            "INSERT OR IGNORE INTO property_groups (object_type_id, name, label) VALUES (?1, ?2, ?3)",
            params![type_id, name, format!("{} information", singular)],
        )?;
        Ok(name)
    }

    /// Remove every definition and group of a type (schema deletion)
    pub(crate) fn purge_type(&self, type_id: &str) -> Result<()> {
        self.conn.execute("DELETE FROM property_definitions WHERE object_type_id = ?1", [type_id])?;
        self.conn.execute("DELETE FROM property_groups WHERE object_type_id = ?1", [type_id])?;
        Ok(())
    }
}

fn validate_kind(kind: &str, field_type: &str) -> Result<()> {
    if !VALID_TYPES.contains(&kind) {
        return Err(Error::validation(format!("Unknown property type: {}", kind)));
    }
    if !VALID_FIELD_TYPES.contains(&field_type) {
        return Err(Error::validation(format!("Unknown field type: {}", field_type)));
    }
    Ok(())
}

fn row_to_definition(row: &rusqlite::Row) -> rusqlite::Result<PropertyDefinition> {
    let options_json: String = row.get(6)?;
    let options: Vec<PropertyOption> = serde_json::from_str(&options_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(PropertyDefinition {
        name: row.get(0)?,
        label: row.get(1)?,
        kind: row.get(2)?,
        field_type: row.get(3)?,
        group_name: row.get(4)?,
        description: row.get(5)?,
        options,
        display_order: row.get(7)?,
        hidden: row.get(8)?,
        has_unique_value: row.get(9)?,
        hubspot_defined: row.get(10)?,
        archived: row.get(11)?,
        archived_at: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

fn row_to_group(row: &rusqlite::Row) -> rusqlite::Result<PropertyGroup> {
    Ok(PropertyGroup {
        name: row.get(0)?,
        label: row.get(1)?,
        display_order: row.get(2)?,
        archived: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;

    #[test]
    fn test_create_and_get_property() {
        let store = Store::open_in_memory().unwrap();
        let session = store.session();
        let props = session.properties();

        let mut input = PropertyInput::new("favorite_color", "Favorite color", "enumeration", "select");
        input.options = vec![PropertyOption {
            label: "Red".to_string(),
            value: "red".to_string(),
            display_order: 0,
            hidden: false,
        }];
        let created = props.create("contacts", input).unwrap();
        assert_eq!(created.group_name, "contactinformation");
        assert!(!created.hubspot_defined);

        let fetched = props.get("0-1", "favorite_color").unwrap();
        assert_eq!(fetched.options.len(), 1);
        assert_eq!(fetched.options[0].value, "red");
    }

    #[test]
    fn test_duplicate_property_is_conflict() {
        let store = Store::open_in_memory().unwrap();
        let session = store.session();
        let props = session.properties();

        props.create("contacts", PropertyInput::new("nickname", "Nickname", "string", "text")).unwrap();
        let err = props
            .create("contacts", PropertyInput::new("nickname", "Nickname", "string", "text"))
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_invalid_type_is_validation_error() {
        let store = Store::open_in_memory().unwrap();
        let session = store.session();
        let err = session
            .properties()
            .create("contacts", PropertyInput::new("x", "X", "blob", "text"))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_update_and_archive() {
        let store = Store::open_in_memory().unwrap();
        let session = store.session();
        let props = session.properties();

        props.create("deals", PropertyInput::new("region", "Region", "string", "text")).unwrap();
        let updated = props
            .update(
                "deals",
                "region",
                PropertyPatch {
                    label: Some("Sales region".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.label, "Sales region");
        assert_eq!(updated.kind, "string");

        props.archive("deals", "region").unwrap();
        assert!(props.list("deals", false).unwrap().iter().all(|p| p.name != "region"));
        assert!(props.list("deals", true).unwrap().iter().any(|p| p.name == "region"));
    }

    #[test]
    fn test_builtin_property_cannot_be_archived() {
        let store = Store::open_in_memory().unwrap();
        let session = store.session();
        let err = session.properties().archive("contacts", "email").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_batch_read_reports_missing() {
        let store = Store::open_in_memory().unwrap();
        let session = store.session();
        let result = session
            .properties()
            .batch_read("contacts", &["email".to_string(), "nope".to_string()])
            .unwrap();
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.num_errors, 1);
    }

    #[test]
    fn test_groups() {
        let store = Store::open_in_memory().unwrap();
        let session = store.session();
        let props = session.properties();

        let group = props
            .create_group(
                "companies",
                PropertyGroupInput {
                    name: "finance".to_string(),
                    label: "Finance".to_string(),
                    display_order: None,
                },
            )
            .unwrap();
        assert_eq!(group.label, "Finance");

        let mut input = PropertyInput::new("arr", "ARR", "number", "number");
        input.group_name = Some("finance".to_string());
        assert_eq!(props.create("companies", input).unwrap().group_name, "finance");

        let mut orphan = PropertyInput::new("mrr", "MRR", "number", "number");
        orphan.group_name = Some("missing".to_string());
        assert!(props.create("companies", orphan).unwrap_err().is_not_found());

        props.archive_group("companies", "finance").unwrap();
        assert!(props.get_group("companies", "finance").unwrap_err().is_not_found());
    }
}
