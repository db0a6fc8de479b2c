//! Object Store - typed rows plus schema-less property cells.
//!
//! Objects are never hard-deleted. Archiving flips a flag, drops the
//! object's association edges and hides it from listings and search; a
//! direct `get` still finds it.

use rusqlite::{Connection, OptionalExtension, params};

use crate::model::{
    BatchError, BatchObjectInput, BatchReadInput, BatchResult, CrmObject, ObjectInput, Page,
    Paging, Properties, UpsertResult, now_timestamp,
};
use crate::{Error, Result};
use super::associations;
use super::types::resolve;
use super::values::{self, SOURCE_API};

/// Properties every read returns
pub const DEFAULT_PROPERTIES: &[&str] = &["hs_object_id", "createdate", "lastmodifieddate"];

/// Property used to key upserts when the caller names none
pub const DEFAULT_ID_PROPERTY: &str = "hs_object_id";

const MERGED_IDS_PROPERTY: &str = "hs_merged_object_ids";
const DEFAULT_LIST_LIMIT: usize = 10;
const MAX_LIST_LIMIT: usize = 100;

/// Which properties a read returns in addition to the defaults
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub properties: Vec<String>,
    pub properties_with_history: Vec<String>,
}

impl ReadOptions {
    pub fn with_properties(names: &[&str]) -> Self {
        Self {
            properties: names.iter().map(|n| n.to_string()).collect(),
            properties_with_history: Vec::new(),
        }
    }
}

/// Options for a keyset-paginated listing
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Page size; 0 means the default of 10, capped at 100
    pub limit: usize,
    /// Last id of the previous page
    pub after: Option<String>,
    pub archived: bool,
    pub properties: Vec<String>,
    pub properties_with_history: Vec<String>,
}

/// Object operations scoped to one locked connection
pub struct ObjectStore<'a> {
    conn: &'a Connection,
}

impl<'a> ObjectStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    // ========== Single-object Operations ==========

    /// Create an object. System properties are written first and the
    /// caller's values overlay them.
    pub fn create(&self, type_ref: &str, properties: Properties) -> Result<CrmObject> {
        let type_id = resolve(self.conn, type_ref)?;
        let id = self.insert(&type_id, properties)?;
        load(self.conn, &type_id, id, None, &[])
    }

    /// Create an object and attach the inline associations of `input`
    pub fn create_with(&self, type_ref: &str, input: ObjectInput) -> Result<CrmObject> {
        let type_id = resolve(self.conn, type_ref)?;
        let id = self.insert(&type_id, input.properties)?;
        if !input.associations.is_empty() {
            associations::attach_inline(self.conn, &type_id, id, &input.associations)?;
        }
        load(self.conn, &type_id, id, None, &[])
    }

    fn insert(&self, type_id: &str, properties: Properties) -> Result<i64> {
        let now = now_timestamp();
        self.conn.execute(
            "INSERT INTO objects (object_type_id, created_at, updated_at) VALUES (?1, ?2, ?2)",
            params![type_id, now],
        )?;
        let id = self.conn.last_insert_rowid();

        let mut values = system_properties(id, &now);
        values.extend(properties);
        values::write_properties(self.conn, id, &values, &now, SOURCE_API)?;

        tracing::debug!(object_type = %type_id, id, properties = values.len(), "created object");
        Ok(id)
    }

    /// Get an object of the given type by id, archived or not
    pub fn get(&self, type_ref: &str, id: &str, options: &ReadOptions) -> Result<CrmObject> {
        let type_id = resolve(self.conn, type_ref)?;
        let id = find(self.conn, &type_id, id)?;
        load_with(self.conn, &type_id, id, options)
    }

    /// First live object whose `name` property equals `value`, lowest id first
    pub fn get_by_property(
        &self,
        type_ref: &str,
        name: &str,
        value: &str,
        options: &ReadOptions,
    ) -> Result<CrmObject> {
        let type_id = resolve(self.conn, type_ref)?;
        let id = values::find_by_value(self.conn, &type_id, name, value)?
            .ok_or_else(|| Error::not_found("object", format!("{}={}", name, value)))?;
        load_with(self.conn, &type_id, id, options)
    }

    /// One page of objects ordered by id
    pub fn list(&self, type_ref: &str, options: &ListOptions) -> Result<Page<CrmObject>> {
        let type_id = resolve(self.conn, type_ref)?;
        let limit = match options.limit {
            0 => DEFAULT_LIST_LIMIT,
            n => n.min(MAX_LIST_LIMIT),
        };
        let after = match options.after.as_deref() {
            None | Some("") => 0,
            Some(after) => after
                .parse::<i64>()
                .map_err(|_| Error::validation(format!("after must be an object id, got {:?}", after)))?,
        };

        let mut stmt = self.conn.prepare_cached(
            r#"
            SELECT id FROM objects
            WHERE object_type_id = ?1 AND archived = ?2 AND id > ?3
            ORDER BY id ASC
            LIMIT ?4
            "#,
        )?;
        let mut ids = stmt
            .query_map(params![type_id, options.archived, after, (limit + 1) as i64], |row| {
                row.get::<_, i64>(0)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let has_more = ids.len() > limit;
        ids.truncate(limit);

        let read = ReadOptions {
            properties: options.properties.clone(),
            properties_with_history: options.properties_with_history.clone(),
        };
        let results = ids
            .iter()
            .map(|id| load_with(self.conn, &type_id, *id, &read))
            .collect::<Result<Vec<_>>>()?;

        let paging = match ids.last() {
            Some(last) if has_more => Some(Paging::after(last.to_string())),
            _ => None,
        };
        Ok(Page { results, paging })
    }

    /// Merge `properties` into a live object and stamp the modified dates
    pub fn update(&self, type_ref: &str, id: &str, properties: Properties) -> Result<CrmObject> {
        let type_id = resolve(self.conn, type_ref)?;
        let id = require_live(self.conn, &type_id, id)?;
        self.write(id, properties)?;
        load(self.conn, &type_id, id, None, &[])
    }

    fn write(&self, id: i64, mut properties: Properties) -> Result<()> {
        let now = now_timestamp();
        properties.insert("lastmodifieddate".to_string(), now.clone());
        properties.insert("hs_lastmodifieddate".to_string(), now.clone());
        values::write_properties(self.conn, id, &properties, &now, SOURCE_API)?;
        self.conn
            .execute("UPDATE objects SET updated_at = ?1 WHERE id = ?2", params![now, id])?;
        tracing::debug!(id, properties = properties.len(), "updated object");
        Ok(())
    }

    /// Soft-delete a live object and hard-delete every edge touching it
    pub fn archive(&self, type_ref: &str, id: &str) -> Result<()> {
        let type_id = resolve(self.conn, type_ref)?;
        let id = require_live(self.conn, &type_id, id)?;
        let now = now_timestamp();
        self.conn.execute(
            "UPDATE objects SET archived = 1, archived_at = ?1, updated_at = ?1 WHERE id = ?2",
            params![now, id],
        )?;
        let removed = associations::delete_for_object(self.conn, id)?;
        tracing::debug!(object_type = %type_id, id, associations = removed, "archived object");
        Ok(())
    }

    /// Fold `merge_id` into `primary_id`.
    ///
    /// Only properties missing on the primary are copied. The secondary is
    /// archived with `merged_into_id` set; no association is touched.
    pub fn merge(&self, type_ref: &str, primary_id: &str, merge_id: &str) -> Result<CrmObject> {
        let type_id = resolve(self.conn, type_ref)?;
        let primary = require_live(self.conn, &type_id, primary_id)?;
        let secondary = require_live(self.conn, &type_id, merge_id)?;
        if primary == secondary {
            return Err(Error::validation("cannot merge an object into itself"));
        }

        let existing = values::read_properties(self.conn, primary, None)?;
        let incoming = values::read_properties(self.conn, secondary, None)?;

        let mut copied: Properties = incoming
            .into_iter()
            .filter(|(name, _)| name != MERGED_IDS_PROPERTY && !existing.contains_key(name))
            .collect();

        let mut merged_ids: Vec<String> = existing
            .get(MERGED_IDS_PROPERTY)
            .map(|ids| ids.split(';').filter(|s| !s.is_empty()).map(String::from).collect())
            .unwrap_or_default();
        merged_ids.push(secondary.to_string());
        copied.insert(MERGED_IDS_PROPERTY.to_string(), merged_ids.join(";"));

        self.write(primary, copied)?;

        let now = now_timestamp();
        self.conn.execute(
            r#"
            UPDATE objects SET archived = 1, archived_at = ?1, updated_at = ?1, merged_into_id = ?2
            WHERE id = ?3
            "#,
            params![now, primary, secondary],
        )?;

        tracing::debug!(object_type = %type_id, primary, secondary, "merged objects");
        load(self.conn, &type_id, primary, None, &[])
    }

    // ========== Batch Operations ==========

    /// Create each input in order; the first failure aborts the batch
    pub fn batch_create(&self, type_ref: &str, inputs: Vec<ObjectInput>) -> Result<BatchResult<CrmObject>> {
        let started_at = now_timestamp();
        let mut results = Vec::with_capacity(inputs.len());
        for input in inputs {
            results.push(self.create_with(type_ref, input)?);
        }
        Ok(BatchResult::complete(started_at, results, Vec::new()))
    }

    /// Read each id; ids that don't resolve are reported, not fatal
    pub fn batch_read(&self, type_ref: &str, input: &BatchReadInput) -> Result<BatchResult<CrmObject>> {
        let started_at = now_timestamp();
        let type_id = resolve(self.conn, type_ref)?;
        let options = ReadOptions {
            properties: input.properties.clone(),
            properties_with_history: input.properties_with_history.clone(),
        };
        let id_property = input
            .id_property
            .as_deref()
            .filter(|p| *p != DEFAULT_ID_PROPERTY);

        let mut results = Vec::new();
        let mut errors = Vec::new();
        for item in &input.inputs {
            let read = match id_property {
                Some(property) => self.get_by_property(&type_id, property, &item.id, &options),
                None => self.get(&type_id, &item.id, &options),
            };
            match read {
                Ok(object) => results.push(object),
                Err(e) if e.is_not_found() => errors.push(BatchError::new(
                    "OBJECT_NOT_FOUND",
                    format!("Could not get some {} objects, they may be deleted or not exist", type_ref),
                    vec![item.id.clone()],
                )),
                Err(e) => return Err(e),
            }
        }
        Ok(BatchResult::complete(started_at, results, errors))
    }

    /// Update each input; every input needs an id
    pub fn batch_update(&self, type_ref: &str, inputs: Vec<BatchObjectInput>) -> Result<BatchResult<CrmObject>> {
        let started_at = now_timestamp();
        let type_id = resolve(self.conn, type_ref)?;
        let mut results = Vec::with_capacity(inputs.len());
        for input in inputs {
            let key = input
                .id
                .ok_or_else(|| Error::validation("batch update input is missing an id"))?;
            let id = match input.id_property.as_deref() {
                Some(property) if property != DEFAULT_ID_PROPERTY => {
                    values::find_by_value(self.conn, &type_id, property, &key)?
                        .ok_or_else(|| Error::not_found("object", format!("{}={}", property, key)))?
                        .to_string()
                }
                _ => key,
            };
            results.push(self.update(&type_id, &id, input.properties)?);
        }
        Ok(BatchResult::complete(started_at, results, Vec::new()))
    }

    /// Update on a key hit, create on a miss. The key is the input's id,
    /// falling back to its own value of the id property.
    pub fn batch_upsert(&self, type_ref: &str, inputs: Vec<BatchObjectInput>) -> Result<BatchResult<UpsertResult>> {
        let started_at = now_timestamp();
        let type_id = resolve(self.conn, type_ref)?;
        let mut results = Vec::with_capacity(inputs.len());

        for input in inputs {
            let id_property = input
                .id_property
                .clone()
                .unwrap_or_else(|| DEFAULT_ID_PROPERTY.to_string());
            let key = input
                .id
                .clone()
                .or_else(|| input.properties.get(&id_property).cloned())
                .filter(|k| !k.is_empty());

            let hit = match key.as_deref() {
                None => None,
                Some(key) if id_property == DEFAULT_ID_PROPERTY => match key.parse::<i64>() {
                    Ok(id) if is_live(self.conn, &type_id, id)? => Some(id),
                    _ => None,
                },
                Some(key) => values::find_by_value(self.conn, &type_id, &id_property, key)?,
            };

            let result = match hit {
                Some(id) => UpsertResult {
                    object: self.update(&type_id, &id.to_string(), input.properties)?,
                    new: false,
                },
                None => {
                    let mut properties = input.properties;
                    if id_property != DEFAULT_ID_PROPERTY {
                        if let Some(key) = key {
                            properties.insert(id_property, key);
                        }
                    }
                    UpsertResult {
                        object: self.create(&type_id, properties)?,
                        new: true,
                    }
                }
            };
            results.push(result);
        }
        Ok(BatchResult::complete(started_at, results, Vec::new()))
    }

    /// Archive each id; the first failure aborts the batch
    pub fn batch_archive(&self, type_ref: &str, ids: &[String]) -> Result<()> {
        let type_id = resolve(self.conn, type_ref)?;
        for id in ids {
            self.archive(&type_id, id)?;
        }
        Ok(())
    }
}

/// System values written on create. `hs_object_id` always equals the row id.
fn system_properties(id: i64, now: &str) -> Properties {
    [
        ("hs_object_id", id.to_string()),
        ("createdate", now.to_string()),
        ("hs_createdate", now.to_string()),
        ("lastmodifieddate", now.to_string()),
        ("hs_lastmodifieddate", now.to_string()),
        ("hs_object_source", SOURCE_API.to_string()),
        ("hs_object_source_label", "INTEGRATION".to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

pub(crate) fn parse_id(id: &str) -> Result<i64> {
    id.trim().parse::<i64>().map_err(|_| Error::not_found("object", id))
}

/// Id of an object of this type, archived or not
pub(crate) fn find(conn: &Connection, type_id: &str, id: &str) -> Result<i64> {
    let numeric = parse_id(id)?;
    conn.query_row(
        "SELECT id FROM objects WHERE id = ?1 AND object_type_id = ?2",
        params![numeric, type_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| Error::not_found("object", id))
}

/// Id of a live (non-archived) object of this type
pub(crate) fn require_live(conn: &Connection, type_id: &str, id: &str) -> Result<i64> {
    let numeric = parse_id(id)?;
    if is_live(conn, type_id, numeric)? {
        Ok(numeric)
    } else {
        Err(Error::not_found("object", id))
    }
}

pub(crate) fn is_live(conn: &Connection, type_id: &str, id: i64) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM objects WHERE id = ?1 AND object_type_id = ?2 AND archived = 0",
            params![id, type_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Load with the default properties plus those named in `options`
pub(crate) fn load_with(conn: &Connection, type_id: &str, id: i64, options: &ReadOptions) -> Result<CrmObject> {
    let mut names: Vec<String> = DEFAULT_PROPERTIES.iter().map(|n| n.to_string()).collect();
    for name in &options.properties {
        if !names.contains(name) {
            names.push(name.clone());
        }
    }
    load(conn, type_id, id, Some(names.as_slice()), &options.properties_with_history)
}

/// Load one object. `names` of `None` returns every property.
pub(crate) fn load(
    conn: &Connection,
    type_id: &str,
    id: i64,
    names: Option<&[String]>,
    history: &[String],
) -> Result<CrmObject> {
    let mut object = conn
        .query_row(
            r#"
            SELECT id, object_type_id, archived, archived_at, merged_into_id, created_at, updated_at
            FROM objects WHERE id = ?1 AND object_type_id = ?2
            "#,
            params![id, type_id],
            row_to_object,
        )
        .optional()?
        .ok_or_else(|| Error::not_found("object", id.to_string()))?;

    object.properties = values::read_properties(conn, id, names)?;
    if !history.is_empty() {
        object.properties_with_history = Some(values::read_history(conn, id, history)?);
    }
    Ok(object)
}

fn row_to_object(row: &rusqlite::Row) -> rusqlite::Result<CrmObject> {
    Ok(CrmObject {
        id: row.get::<_, i64>(0)?.to_string(),
        object_type_id: row.get(1)?,
        archived: row.get(2)?,
        archived_at: row.get(3)?,
        merged_into_id: row.get::<_, Option<i64>>(4)?.map(|id| id.to_string()),
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        properties: Properties::new(),
        properties_with_history: None,
    })
}
