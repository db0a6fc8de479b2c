//! Property cells and their append-only history.

use std::collections::BTreeMap;

use rusqlite::{Connection, params};

use crate::Result;
use crate::model::{Properties, PropertyHistoryEntry};

/// Source recorded on history rows written through the API
pub const SOURCE_API: &str = "API";

/// Upsert each value and append one history row per property.
pub fn write_properties(
    conn: &Connection,
    object_id: i64,
    properties: &Properties,
    timestamp: &str,
    source: &str,
) -> Result<()> {
    let mut upsert = conn.prepare_cached(
        r#"
        INSERT INTO property_values (object_id, property_name, value, updated_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(object_id, property_name) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at
        "#,
    )?;
    let mut history = conn.prepare_cached(
        r#"
        INSERT INTO property_value_history (object_id, property_name, value, timestamp, source_type)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )?;

    for (name, value) in properties {
        upsert.execute(params![object_id, name, value, timestamp])?;
        history.execute(params![object_id, name, value, timestamp, source])?;
    }
    Ok(())
}

/// Current values of an object. `names` restricts the result; names with
/// no stored value are left out.
pub fn read_properties(conn: &Connection, object_id: i64, names: Option<&[String]>) -> Result<Properties> {
    let mut stmt = conn.prepare_cached(
        "SELECT property_name, value FROM property_values WHERE object_id = ?1",
    )?;
    let rows = stmt.query_map([object_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut properties = Properties::new();
    for row in rows {
        let (name, value) = row?;
        if names.is_none_or(|wanted| wanted.iter().any(|n| *n == name)) {
            properties.insert(name, value);
        }
    }
    Ok(properties)
}

/// Single current value
pub fn read_value(conn: &Connection, object_id: i64, name: &str) -> Result<Option<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT value FROM property_values WHERE object_id = ?1 AND property_name = ?2",
    )?;
    let mut rows = stmt.query(params![object_id, name])?;
    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

/// History of the named properties, newest first. Properties never written
/// are absent from the map.
pub fn read_history(
    conn: &Connection,
    object_id: i64,
    names: &[String],
) -> Result<BTreeMap<String, Vec<PropertyHistoryEntry>>> {
    let mut stmt = conn.prepare_cached(
        r#"
        SELECT value, timestamp, source_type FROM property_value_history
        WHERE object_id = ?1 AND property_name = ?2
        ORDER BY timestamp DESC, id DESC
        "#,
    )?;

    let mut history = BTreeMap::new();
    for name in names {
        let entries = stmt
            .query_map(params![object_id, name], |row| {
                Ok(PropertyHistoryEntry {
                    value: row.get(0)?,
                    timestamp: row.get(1)?,
                    source_type: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        if !entries.is_empty() {
            history.insert(name.clone(), entries);
        }
    }
    Ok(history)
}

/// First live object of a type whose property equals `value`, lowest id first.
pub fn find_by_value(conn: &Connection, type_id: &str, name: &str, value: &str) -> Result<Option<i64>> {
    let mut stmt = conn.prepare_cached(
        r#"
        SELECT o.id FROM objects o
        JOIN property_values pv ON pv.object_id = o.id
        WHERE o.object_type_id = ?1 AND o.archived = 0
          AND pv.property_name = ?2 AND pv.value = ?3
        ORDER BY o.id ASC
        LIMIT 1
        "#,
    )?;
    let mut rows = stmt.query(params![type_id, name, value])?;
    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}
