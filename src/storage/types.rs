//! Object type resolution and custom object schemas.
//!
//! `resolve` is the only place a type reference is turned into a type id;
//! every store goes through it.

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::model::{AssociationType, ObjectType, now_timestamp};
use crate::{Error, Result};
use super::associations;
use super::properties::{PropertyDefinition, PropertyInput, PropertyStore};
use super::seed;

/// Map a type name ("contacts") or id ("0-1") to the canonical type id.
pub fn resolve(conn: &Connection, type_ref: &str) -> Result<String> {
    conn.query_row(
        "SELECT id FROM object_types WHERE name = ?1 OR id = ?1",
        [type_ref],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| Error::not_found("object type", type_ref))
}

const TYPE_COLUMNS: &str = "id, name, label_singular, label_plural, primary_display_property, is_custom, created_at, updated_at, required_properties";

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaLabels {
    pub singular: String,
    pub plural: String,
}

/// Body of a schema create request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaInput {
    pub name: String,
    pub labels: SchemaLabels,
    #[serde(default)]
    pub primary_display_property: Option<String>,
    #[serde(default)]
    pub required_properties: Vec<String>,
    #[serde(default)]
    pub properties: Vec<PropertyInput>,
    #[serde(default)]
    pub associated_objects: Vec<String>,
}

/// Body of a schema update request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaPatch {
    pub labels: Option<SchemaLabels>,
    pub primary_display_property: Option<String>,
    pub required_properties: Option<Vec<String>>,
}

/// Body of a schema association registration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaAssociationInput {
    pub from_object_type_id: String,
    pub to_object_type_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// An object type with its property definitions and association types
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSchema {
    #[serde(flatten)]
    pub object_type: ObjectType,
    pub object_type_id: String,
    pub required_properties: Vec<String>,
    pub properties: Vec<PropertyDefinition>,
    pub associations: Vec<AssociationType>,
}

/// Custom object type store
pub struct SchemaStore<'a> {
    conn: &'a Connection,
}

impl<'a> SchemaStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Get an object type by name or id
    pub fn get_type(&self, type_ref: &str) -> Result<ObjectType> {
        let type_id = resolve(self.conn, type_ref)?;
        let (object_type, _) = self.conn.query_row(
            &format!("SELECT {} FROM object_types WHERE id = ?1", TYPE_COLUMNS),
            [&type_id],
            row_to_type,
        )?;
        Ok(object_type)
    }

    /// List object types; custom ones only unless `include_builtin`
    pub fn list_types(&self, include_builtin: bool) -> Result<Vec<ObjectType>> {
        let sql = if include_builtin {
            format!("SELECT {} FROM object_types ORDER BY is_custom, created_at, id", TYPE_COLUMNS)
        } else {
            format!("SELECT {} FROM object_types WHERE is_custom = 1 ORDER BY created_at, id", TYPE_COLUMNS)
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let types = stmt
            .query_map([], |row| row_to_type(row).map(|(t, _)| t))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(types)
    }

    /// Full schema of one type
    pub fn get(&self, type_ref: &str) -> Result<ObjectSchema> {
        let type_id = resolve(self.conn, type_ref)?;
        let (object_type, required_properties) = self.conn.query_row(
            &format!("SELECT {} FROM object_types WHERE id = ?1", TYPE_COLUMNS),
            [&type_id],
            row_to_type,
        )?;
        let properties = PropertyStore::new(self.conn).list(&type_id, false)?;
        let associations = associations::types_from(self.conn, &type_id)?;
        Ok(ObjectSchema {
            object_type_id: object_type.id.clone(),
            object_type,
            required_properties,
            properties,
            associations,
        })
    }

    /// Full schemas of every custom type
    pub fn list(&self) -> Result<Vec<ObjectSchema>> {
        self.list_types(false)?
            .into_iter()
            .map(|t| self.get(&t.id))
            .collect()
    }

    /// Register a custom object type as `2-N`
    pub fn create(&self, input: SchemaInput) -> Result<ObjectSchema> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::validation("schema name is required"));
        }
        if input.labels.singular.trim().is_empty() || input.labels.plural.trim().is_empty() {
            return Err(Error::validation("schema labels are required"));
        }
        if name.contains('-') && name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            return Err(Error::validation(format!("{} looks like a type id, not a name", name)));
        }

        let next: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(CAST(SUBSTR(id, 3) AS INTEGER)), 0) + 1 FROM object_types WHERE is_custom = 1",
            [],
            |row| row.get(0),
        )?;
        let type_id = format!("2-{}", next);
        let now = now_timestamp();

        self.conn
            .execute(
                r#"
                INSERT INTO object_types
                    (id, name, label_singular, label_plural, primary_display_property, required_properties, is_custom, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)
                "#,
                params![
                    type_id,
                    name,
                    input.labels.singular,
                    input.labels.plural,
                    input.primary_display_property,
                    serde_json::to_string(&input.required_properties)?,
                    now,
                ],
            )
            .map_err(|e| Error::conflict_on_unique(e, format!("object type {} already exists", name)))?;

        seed::seed_system_properties(self.conn, &type_id, &now)?;
        let properties = PropertyStore::new(self.conn);
        for property in input.properties {
            properties.create(&type_id, property)?;
        }

        for associated in &input.associated_objects {
            let target = resolve(self.conn, associated)?;
            associations::register_default_pair(self.conn, &type_id, &target, None)?;
        }

        tracing::info!(object_type = %type_id, name = %name, "registered custom object type");
        self.get(&type_id)
    }

    pub fn update(&self, type_ref: &str, patch: SchemaPatch) -> Result<ObjectSchema> {
        let type_id = resolve(self.conn, type_ref)?;
        let current = self.get(&type_id)?;
        let (singular, plural) = match patch.labels {
            Some(labels) => (labels.singular, labels.plural),
            None => (current.object_type.label_singular, current.object_type.label_plural),
        };
        let display = patch
            .primary_display_property
            .or(current.object_type.primary_display_property);
        let required = patch.required_properties.unwrap_or(current.required_properties);

        self.conn.execute(
            r#"
            UPDATE object_types
            SET label_singular = ?1, label_plural = ?2, primary_display_property = ?3,
                required_properties = ?4, updated_at = ?5
            WHERE id = ?6
            "#,
            params![singular, plural, display, serde_json::to_string(&required)?, now_timestamp(), type_id],
        )?;
        self.get(&type_id)
    }

    /// Delete a custom type. Refused while any object of the type exists.
    pub fn delete(&self, type_ref: &str) -> Result<()> {
        let object_type = self.get_type(type_ref)?;
        if !object_type.is_custom {
            return Err(Error::validation(format!("{} is a built-in type", object_type.name)));
        }
        let objects: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM objects WHERE object_type_id = ?1",
            [&object_type.id],
            |row| row.get(0),
        )?;
        if objects > 0 {
            return Err(Error::Conflict(format!(
                "object type {} still has {} objects",
                object_type.name, objects
            )));
        }

        associations::purge_types_for(self.conn, &object_type.id)?;
        PropertyStore::new(self.conn).purge_type(&object_type.id)?;
        self.conn.execute(
            "DELETE FROM list_memberships WHERE list_id IN (SELECT id FROM lists WHERE object_type_id = ?1)",
            [&object_type.id],
        )?;
        self.conn.execute("DELETE FROM lists WHERE object_type_id = ?1", [&object_type.id])?;
        self.conn.execute(
            "DELETE FROM pipeline_stages WHERE pipeline_id IN (SELECT id FROM pipelines WHERE object_type_id = ?1)",
            [&object_type.id],
        )?;
        self.conn.execute("DELETE FROM pipelines WHERE object_type_id = ?1", [&object_type.id])?;
        self.conn.execute("DELETE FROM object_types WHERE id = ?1", [&object_type.id])?;

        tracing::info!(object_type = %object_type.id, "deleted custom object type");
        Ok(())
    }

    /// Register an unlabelled association type in both directions.
    /// Returns the forward type.
    pub fn create_association(&self, type_ref: &str, input: SchemaAssociationInput) -> Result<AssociationType> {
        let owner = resolve(self.conn, type_ref)?;
        let from = resolve(self.conn, &input.from_object_type_id)?;
        let to = resolve(self.conn, &input.to_object_type_id)?;
        if from != owner && to != owner {
            return Err(Error::validation(format!(
                "association must involve {}",
                owner
            )));
        }
        let forward = associations::register_default_pair(self.conn, &from, &to, input.name.as_deref())?;
        associations::get_type(self.conn, forward)
    }
}

fn row_to_type(row: &rusqlite::Row) -> rusqlite::Result<(ObjectType, Vec<String>)> {
    let required_json: String = row.get(8)?;
    let required: Vec<String> = serde_json::from_str(&required_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok((
        ObjectType {
            id: row.get(0)?,
            name: row.get(1)?,
            label_singular: row.get(2)?,
            label_plural: row.get(3)?,
            primary_display_property: row.get(4)?,
            is_custom: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        },
        required,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AssociationCategory;
    use crate::storage::Store;

    fn car_schema(name: &str) -> SchemaInput {
        SchemaInput {
            name: name.to_string(),
            labels: SchemaLabels {
                singular: "Car".to_string(),
                plural: "Cars".to_string(),
            },
            primary_display_property: Some("model".to_string()),
            required_properties: vec!["model".to_string()],
            properties: vec![PropertyInput::new("model", "Model", "string", "text")],
            associated_objects: vec!["contacts".to_string()],
        }
    }

    #[test]
    fn test_resolve_by_name_and_id() {
        let store = Store::open_in_memory().unwrap();
        let session = store.session();
        assert_eq!(session.resolve_type("contacts").unwrap(), "0-1");
        assert_eq!(session.resolve_type("0-1").unwrap(), "0-1");
        assert_eq!(session.resolve_type("companies").unwrap(), "0-2");
    }

    #[test]
    fn test_resolve_unknown_is_typed_not_found() {
        let store = Store::open_in_memory().unwrap();
        let err = store.session().resolve_type("spaceships").unwrap_err();
        match err {
            Error::NotFound { kind, id } => {
                assert_eq!(kind, "object type");
                assert_eq!(id, "spaceships");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_custom_type_ids_increment() {
        let store = Store::open_in_memory().unwrap();
        let session = store.session();
        let schemas = session.schemas();

        let cars = schemas.create(car_schema("cars")).unwrap();
        let boats = schemas.create(car_schema("boats")).unwrap();
        assert_eq!(cars.object_type.id, "2-1");
        assert_eq!(boats.object_type.id, "2-2");
        assert!(cars.object_type.is_custom);
        assert_eq!(session.resolve_type("cars").unwrap(), "2-1");
        assert!(cars.properties.iter().any(|p| p.name == "model"));
        assert!(cars.properties.iter().any(|p| p.name == "hs_object_id"));
    }

    #[test]
    fn test_custom_type_registers_default_associations_both_ways() {
        let store = Store::open_in_memory().unwrap();
        let session = store.session();
        let cars = session.schemas().create(car_schema("cars")).unwrap();

        let forward = &cars.associations;
        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].to_object_type_id, "0-1");
        assert_eq!(forward[0].category, AssociationCategory::HubspotDefined);
        assert!(forward[0].label.is_none());

        let reverse = session.associations().list_labels("contacts", "cars").unwrap();
        assert_eq!(reverse.len(), 1);
    }

    #[test]
    fn test_duplicate_schema_name_is_conflict() {
        let store = Store::open_in_memory().unwrap();
        let session = store.session();
        session.schemas().create(car_schema("cars")).unwrap();
        let err = session.schemas().create(car_schema("cars")).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_delete_refused_while_objects_exist() {
        let store = Store::open_in_memory().unwrap();
        let session = store.session();
        session.schemas().create(car_schema("cars")).unwrap();

        let car = session
            .objects()
            .create("cars", [("model".to_string(), "T".to_string())].into())
            .unwrap();
        assert!(matches!(session.schemas().delete("cars"), Err(Error::Conflict(_))));

        session.objects().archive("cars", &car.id).unwrap();
        assert!(matches!(session.schemas().delete("cars"), Err(Error::Conflict(_))));

        session.schemas().create(car_schema("boats")).unwrap();
        session.schemas().delete("boats").unwrap();
        assert!(session.resolve_type("boats").unwrap_err().is_not_found());
        assert!(session.associations().list_labels("contacts", "cars").is_ok());
    }

    #[test]
    fn test_builtin_type_cannot_be_deleted() {
        let store = Store::open_in_memory().unwrap();
        let err = store.session().schemas().delete("contacts").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_update_labels() {
        let store = Store::open_in_memory().unwrap();
        let session = store.session();
        session.schemas().create(car_schema("cars")).unwrap();
        let updated = session
            .schemas()
            .update(
                "cars",
                SchemaPatch {
                    labels: Some(SchemaLabels {
                        singular: "Vehicle".to_string(),
                        plural: "Vehicles".to_string(),
                    }),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.object_type.label_plural, "Vehicles");
        assert_eq!(updated.required_properties, vec!["model".to_string()]);
    }

    #[test]
    fn test_schema_association_registration() {
        let store = Store::open_in_memory().unwrap();
        let session = store.session();
        session.schemas().create(car_schema("cars")).unwrap();

        let created = session
            .schemas()
            .create_association(
                "cars",
                SchemaAssociationInput {
                    from_object_type_id: "cars".to_string(),
                    to_object_type_id: "0-2".to_string(),
                    name: Some("car_to_company".to_string()),
                },
            )
            .unwrap();
        assert_eq!(created.from_object_type_id, "2-1");
        assert_eq!(created.to_object_type_id, "0-2");
        assert_eq!(created.name.as_deref(), Some("car_to_company"));
        assert!(session.associations().default_type_id("0-2", "2-1").unwrap().is_some());
    }
}
