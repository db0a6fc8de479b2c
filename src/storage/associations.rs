//! Association Store - typed edges between objects.
//!
//! Edges are directional. The default and labelled creation paths also try
//! to write the mirrored edge `(to, from, reverse default type)`; when the
//! reverse pair has no default type the mirror is skipped without error, so
//! an edge can exist in one direction only.

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::model::{
    AssociatedObject, AssociationCategory, AssociationSpec, AssociationType, AssociationTypeRef,
    BatchError, BatchResult, InlineAssociation, LabelsBetweenObjectPair, ObjectId, now_timestamp,
};
use crate::{Error, Result};
use super::objects::{self, parse_id};
use super::types::resolve;

const TYPE_COLUMNS: &str = "id, from_object_type_id, to_object_type_id, category, label, name";

/// The mirrored edge was not written because `(to type, from type)` has no
/// default association type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkippedNoDefaultType;

/// `{from: {id}, to: {id}}`
#[derive(Debug, Clone, Deserialize)]
pub struct AssociationPairInput {
    pub from: ObjectId,
    pub to: ObjectId,
}

/// `{from: {id}, to: {id}, types: [...]}`
#[derive(Debug, Clone, Deserialize)]
pub struct LabeledAssociationInput {
    pub from: ObjectId,
    pub to: ObjectId,
    #[serde(default)]
    pub types: Vec<AssociationSpec>,
}

/// `{from: {id}, to: [{id}, ...]}`
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveInput {
    pub from: ObjectId,
    pub to: Vec<ObjectId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultAssociation {
    pub from: ObjectId,
    pub to: ObjectId,
    pub association_spec: AssociationSpec,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssociationReadResult {
    pub from: ObjectId,
    pub to: Vec<AssociatedObject>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelInput {
    pub label: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub inverse_label: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelUpdate {
    pub association_type_id: i64,
    pub label: String,
}

pub struct AssociationStore<'a> {
    conn: &'a Connection,
}

impl<'a> AssociationStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Default association type id for a pair of type references
    pub fn default_type_id(&self, from_type: &str, to_type: &str) -> Result<Option<i64>> {
        let from = resolve(self.conn, from_type)?;
        let to = resolve(self.conn, to_type)?;
        default_type(self.conn, &from, &to)
    }

    // ========== Edge Operations ==========

    /// Link two live objects with the pair's default type. Repeating the
    /// call is a no-op.
    pub fn associate_default(
        &self,
        from_type: &str,
        from_id: &str,
        to_type: &str,
        to_id: &str,
    ) -> Result<AssociationSpec> {
        let from = resolve(self.conn, from_type)?;
        let to = resolve(self.conn, to_type)?;
        let from_key = objects::require_live(self.conn, &from, from_id)?;
        let to_key = objects::require_live(self.conn, &to, to_id)?;

        let type_id = default_type(self.conn, &from, &to)?
            .ok_or_else(|| Error::not_found("association type", format!("{}->{} default", from, to)))?;
        insert_edge(self.conn, from_key, to_key, type_id)?;
        mirror_or_log(self.conn, &from, from_key, &to, to_key)?;

        tracing::debug!(from = from_key, to = to_key, type_id, "associated objects");
        Ok(AssociationSpec {
            category: AssociationCategory::HubspotDefined,
            type_id,
        })
    }

    /// Link two live objects with each requested type. The default edge is
    /// written too when the pair has one.
    pub fn associate_with_labels(
        &self,
        from_type: &str,
        from_id: &str,
        to_type: &str,
        to_id: &str,
        types: &[AssociationSpec],
    ) -> Result<LabelsBetweenObjectPair> {
        let from = resolve(self.conn, from_type)?;
        let to = resolve(self.conn, to_type)?;
        let from_key = objects::require_live(self.conn, &from, from_id)?;
        let to_key = objects::require_live(self.conn, &to, to_id)?;

        if let Some(default) = default_type(self.conn, &from, &to)? {
            insert_edge(self.conn, from_key, to_key, default)?;
        }

        let mut labels = Vec::new();
        for spec in types {
            let association_type = get_type(self.conn, spec.type_id)?;
            if association_type.from_object_type_id != from || association_type.to_object_type_id != to {
                return Err(Error::validation(format!(
                    "association type {} does not link {} to {}",
                    spec.type_id, from, to
                )));
            }
            insert_edge(self.conn, from_key, to_key, spec.type_id)?;
            if let Some(label) = association_type.label {
                labels.push(label);
            }
        }

        mirror_or_log(self.conn, &from, from_key, &to, to_key)?;

        Ok(LabelsBetweenObjectPair {
            from_object_type_id: from,
            from_object_id: from_key.to_string(),
            to_object_type_id: to,
            to_object_id: to_key.to_string(),
            labels,
        })
    }

    /// Edges from one object to objects of `to_type`, grouped per target
    pub fn get_associations(&self, from_type: &str, from_id: &str, to_type: &str) -> Result<Vec<AssociatedObject>> {
        let from = resolve(self.conn, from_type)?;
        let to = resolve(self.conn, to_type)?;
        let from_key = parse_id(from_id)?;

        let mut stmt = self.conn.prepare_cached(
            r#"
            SELECT a.to_object_id, t.id, t.category, t.label
            FROM associations a
            JOIN association_types t ON t.id = a.association_type_id
            WHERE a.from_object_id = ?1
              AND t.from_object_type_id = ?2
              AND t.to_object_type_id = ?3
            ORDER BY a.to_object_id ASC, t.id ASC
            "#,
        )?;
        let rows = stmt.query_map(params![from_key, from, to], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;

        let mut grouped: Vec<AssociatedObject> = Vec::new();
        for row in rows {
            let (to_object_id, type_id, category, label) = row?;
            let to_object_id = to_object_id.to_string();
            let type_ref = AssociationTypeRef {
                type_id,
                category: category.parse()?,
                label,
            };
            match grouped.last_mut() {
                Some(last) if last.to_object_id == to_object_id => last.types.push(type_ref),
                _ => grouped.push(AssociatedObject {
                    to_object_id,
                    types: vec![type_ref],
                }),
            }
        }
        Ok(grouped)
    }

    /// Delete every edge `from -> to` whose type belongs to the pair. The
    /// reverse edge stays.
    pub fn remove_associations(&self, from_type: &str, from_id: &str, to_type: &str, to_id: &str) -> Result<usize> {
        let from = resolve(self.conn, from_type)?;
        let to = resolve(self.conn, to_type)?;
        let removed = self.conn.execute(
            r#"
            DELETE FROM associations
            WHERE from_object_id = ?1 AND to_object_id = ?2
              AND association_type_id IN (
                  SELECT id FROM association_types
                  WHERE from_object_type_id = ?3 AND to_object_type_id = ?4
              )
            "#,
            params![parse_id(from_id)?, parse_id(to_id)?, from, to],
        )?;
        tracing::debug!(from = %from_id, to = %to_id, removed, "removed associations");
        Ok(removed)
    }

    // ========== Label Operations ==========

    /// Every association type registered for the pair, labelled or not
    pub fn list_labels(&self, from_type: &str, to_type: &str) -> Result<Vec<AssociationType>> {
        let from = resolve(self.conn, from_type)?;
        let to = resolve(self.conn, to_type)?;
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {} FROM association_types WHERE from_object_type_id = ?1 AND to_object_type_id = ?2 ORDER BY id",
            TYPE_COLUMNS
        ))?;
        let types = stmt
            .query_map(params![from, to], row_to_type)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(types)
    }

    /// Create a USER_DEFINED label, plus its inverse on the reverse pair
    /// when `inverse_label` is given.
    pub fn create_label(&self, from_type: &str, to_type: &str, input: LabelInput) -> Result<Vec<AssociationType>> {
        let from = resolve(self.conn, from_type)?;
        let to = resolve(self.conn, to_type)?;
        if input.label.trim().is_empty() {
            return Err(Error::validation("label is required"));
        }

        let mut created = vec![insert_type(
            self.conn,
            &from,
            &to,
            AssociationCategory::UserDefined,
            Some(&input.label),
            input.name.as_deref(),
        )?];
        if let Some(inverse) = input.inverse_label.as_deref().filter(|l| !l.trim().is_empty()) {
            created.push(insert_type(
                self.conn,
                &to,
                &from,
                AssociationCategory::UserDefined,
                Some(inverse),
                input.name.as_deref(),
            )?);
        }

        created
            .into_iter()
            .map(|id| get_type(self.conn, id))
            .collect()
    }

    /// Rename a labelled association type of the pair
    pub fn update_label(&self, from_type: &str, to_type: &str, input: LabelUpdate) -> Result<AssociationType> {
        let current = self.pair_type(from_type, to_type, input.association_type_id)?;
        self.ensure_not_default(&current)?;
        if input.label.trim().is_empty() {
            return Err(Error::validation("label is required"));
        }
        self.conn.execute(
            "UPDATE association_types SET label = ?1 WHERE id = ?2",
            params![input.label, current.id],
        )?;
        get_type(self.conn, current.id)
    }

    /// Delete an association type of the pair and every edge that uses it
    pub fn delete_label(&self, from_type: &str, to_type: &str, type_id: i64) -> Result<()> {
        let current = self.pair_type(from_type, to_type, type_id)?;
        self.ensure_not_default(&current)?;
        let removed = self
            .conn
            .execute("DELETE FROM associations WHERE association_type_id = ?1", [type_id])?;
        self.conn
            .execute("DELETE FROM association_types WHERE id = ?1", [type_id])?;
        tracing::debug!(type_id, edges = removed, "deleted association label");
        Ok(())
    }

    /// The pair's unlabelled default type carries mirrored edges and stays fixed.
    fn ensure_not_default(&self, current: &AssociationType) -> Result<()> {
        let default = default_type(self.conn, &current.from_object_type_id, &current.to_object_type_id)?;
        if default == Some(current.id) {
            return Err(Error::validation(format!(
                "association type {} is the default type of {} -> {}",
                current.id, current.from_object_type_id, current.to_object_type_id
            )));
        }
        Ok(())
    }

    fn pair_type(&self, from_type: &str, to_type: &str, type_id: i64) -> Result<AssociationType> {
        let from = resolve(self.conn, from_type)?;
        let to = resolve(self.conn, to_type)?;
        let found = get_type(self.conn, type_id)?;
        if found.from_object_type_id != from || found.to_object_type_id != to {
            return Err(Error::not_found("association type", type_id.to_string()));
        }
        Ok(found)
    }

    // ========== Batch Operations ==========

    pub fn batch_associate_default(
        &self,
        from_type: &str,
        to_type: &str,
        inputs: &[AssociationPairInput],
    ) -> Result<BatchResult<DefaultAssociation>> {
        let started_at = now_timestamp();
        let mut results = Vec::with_capacity(inputs.len());
        for input in inputs {
            let spec = self.associate_default(from_type, &input.from.id, to_type, &input.to.id)?;
            results.push(DefaultAssociation {
                from: input.from.clone(),
                to: input.to.clone(),
                association_spec: spec,
            });
        }
        Ok(BatchResult::complete(started_at, results, Vec::new()))
    }

    pub fn batch_create(
        &self,
        from_type: &str,
        to_type: &str,
        inputs: &[LabeledAssociationInput],
    ) -> Result<BatchResult<LabelsBetweenObjectPair>> {
        let started_at = now_timestamp();
        let mut results = Vec::with_capacity(inputs.len());
        for input in inputs {
            results.push(self.associate_with_labels(
                from_type,
                &input.from.id,
                to_type,
                &input.to.id,
                &input.types,
            )?);
        }
        Ok(BatchResult::complete(started_at, results, Vec::new()))
    }

    /// Read associations of several objects. Objects with none are reported
    /// as `NO_ASSOCIATIONS_FOUND` errors.
    pub fn batch_read(
        &self,
        from_type: &str,
        to_type: &str,
        inputs: &[ObjectId],
    ) -> Result<BatchResult<AssociationReadResult>> {
        let started_at = now_timestamp();
        let mut results = Vec::new();
        let mut errors = Vec::new();
        for input in inputs {
            let to = match self.get_associations(from_type, &input.id, to_type) {
                Ok(to) => to,
                Err(e) if e.is_not_found() && !matches!(&e, Error::NotFound { kind: "object type", .. }) => {
                    Vec::new()
                }
                Err(e) => return Err(e),
            };
            if to.is_empty() {
                errors.push(BatchError::new(
                    "NO_ASSOCIATIONS_FOUND",
                    format!("No {} is associated with {} {}", to_type, from_type, input.id),
                    vec![input.id.clone()],
                ));
            } else {
                results.push(AssociationReadResult {
                    from: input.clone(),
                    to,
                });
            }
        }
        Ok(BatchResult::complete(started_at, results, errors))
    }

    /// Remove every edge between each `from` and its listed targets
    pub fn batch_archive(&self, from_type: &str, to_type: &str, inputs: &[ArchiveInput]) -> Result<usize> {
        let mut removed = 0;
        for input in inputs {
            for target in &input.to {
                removed += self.remove_associations(from_type, &input.from.id, to_type, &target.id)?;
            }
        }
        Ok(removed)
    }

    /// Remove only the listed types between each pair
    pub fn batch_archive_labels(
        &self,
        from_type: &str,
        to_type: &str,
        inputs: &[LabeledAssociationInput],
    ) -> Result<usize> {
        let from = resolve(self.conn, from_type)?;
        let to = resolve(self.conn, to_type)?;
        let mut removed = 0;
        for input in inputs {
            let from_key = parse_id(&input.from.id)?;
            let to_key = parse_id(&input.to.id)?;
            for spec in &input.types {
                let association_type = get_type(self.conn, spec.type_id)?;
                if association_type.from_object_type_id != from || association_type.to_object_type_id != to {
                    return Err(Error::not_found("association type", spec.type_id.to_string()));
                }
                removed += self.conn.execute(
                    "DELETE FROM associations WHERE from_object_id = ?1 AND to_object_id = ?2 AND association_type_id = ?3",
                    params![from_key, to_key, spec.type_id],
                )?;
            }
        }
        Ok(removed)
    }
}

// ========== Shared helpers ==========

/// Lowest-id HUBSPOT_DEFINED type without a label for the pair
pub(crate) fn default_type(conn: &Connection, from_type_id: &str, to_type_id: &str) -> Result<Option<i64>> {
    conn.query_row(
        r#"
        SELECT id FROM association_types
        WHERE from_object_type_id = ?1 AND to_object_type_id = ?2
          AND category = 'HUBSPOT_DEFINED'
          AND (label IS NULL OR label = '')
        ORDER BY id ASC
        LIMIT 1
        "#,
        params![from_type_id, to_type_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

pub(crate) fn get_type(conn: &Connection, type_id: i64) -> Result<AssociationType> {
    conn.query_row(
        &format!("SELECT {} FROM association_types WHERE id = ?1", TYPE_COLUMNS),
        [type_id],
        row_to_type,
    )
    .optional()?
    .ok_or_else(|| Error::not_found("association type", type_id.to_string()))
}

/// Association types whose source is `type_id`
pub(crate) fn types_from(conn: &Connection, type_id: &str) -> Result<Vec<AssociationType>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM association_types WHERE from_object_type_id = ?1 ORDER BY id",
        TYPE_COLUMNS
    ))?;
    let types = stmt
        .query_map([type_id], row_to_type)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(types)
}

/// Register an unlabelled HUBSPOT_DEFINED type `from -> to`, and `to -> from`
/// unless that direction already has a default. Returns the forward id.
pub(crate) fn register_default_pair(conn: &Connection, from: &str, to: &str, name: Option<&str>) -> Result<i64> {
    let forward = insert_type(conn, from, to, AssociationCategory::HubspotDefined, None, name)?;
    if default_type(conn, to, from)?.is_none() {
        insert_type(conn, to, from, AssociationCategory::HubspotDefined, None, name)?;
    }
    Ok(forward)
}

/// Drop every association type touching `type_id`, with their edges
pub(crate) fn purge_types_for(conn: &Connection, type_id: &str) -> Result<()> {
    conn.execute(
        r#"
        DELETE FROM associations WHERE association_type_id IN (
            SELECT id FROM association_types WHERE from_object_type_id = ?1 OR to_object_type_id = ?1
        )
        "#,
        [type_id],
    )?;
    conn.execute(
        "DELETE FROM association_types WHERE from_object_type_id = ?1 OR to_object_type_id = ?1",
        [type_id],
    )?;
    Ok(())
}

/// Hard-delete every edge with `object_id` at either end
pub(crate) fn delete_for_object(conn: &Connection, object_id: i64) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM associations WHERE from_object_id = ?1 OR to_object_id = ?1",
        [object_id],
    )?;
    Ok(removed)
}

/// Attach associations given inline on object creation. The target type of
/// each entry comes from its association types.
pub(crate) fn attach_inline(
    conn: &Connection,
    from_type_id: &str,
    from_key: i64,
    entries: &[InlineAssociation],
) -> Result<()> {
    for entry in entries {
        let mut target: Option<(String, i64)> = None;
        for spec in &entry.types {
            let association_type = get_type(conn, spec.type_id)?;
            if association_type.from_object_type_id != from_type_id {
                return Err(Error::validation(format!(
                    "association type {} does not start at {}",
                    spec.type_id, from_type_id
                )));
            }
            let to_type = association_type.to_object_type_id;
            let to_key = objects::require_live(conn, &to_type, &entry.to.id)?;
            insert_edge(conn, from_key, to_key, spec.type_id)?;
            target = Some((to_type, to_key));
        }
        if let Some((to_type, to_key)) = target {
            mirror_or_log(conn, from_type_id, from_key, &to_type, to_key)?;
        }
    }
    Ok(())
}

fn insert_type(
    conn: &Connection,
    from: &str,
    to: &str,
    category: AssociationCategory,
    label: Option<&str>,
    name: Option<&str>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO association_types (from_object_type_id, to_object_type_id, category, label, name) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![from, to, category.as_str(), label, name],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Idempotent edge insert. Returns whether a row was added.
fn insert_edge(conn: &Connection, from_key: i64, to_key: i64, type_id: i64) -> Result<bool> {
    let inserted = conn.execute(
        r#"
        INSERT OR IGNORE INTO associations (from_object_id, to_object_id, association_type_id, created_at)
        VALUES (?1, ?2, ?3, ?4)
        "#,
        params![from_key, to_key, type_id, now_timestamp()],
    )?;
    Ok(inserted > 0)
}

/// Write the reverse default edge if the reverse pair has a default type.
/// Database failures are real errors; a missing type is not.
pub(crate) fn mirror(
    conn: &Connection,
    from_type: &str,
    from_key: i64,
    to_type: &str,
    to_key: i64,
) -> Result<std::result::Result<(), SkippedNoDefaultType>> {
    match default_type(conn, to_type, from_type)? {
        Some(reverse) => {
            insert_edge(conn, to_key, from_key, reverse)?;
            Ok(Ok(()))
        }
        None => Ok(Err(SkippedNoDefaultType)),
    }
}

fn mirror_or_log(conn: &Connection, from_type: &str, from_key: i64, to_type: &str, to_key: i64) -> Result<()> {
    if let Err(SkippedNoDefaultType) = mirror(conn, from_type, from_key, to_type, to_key)? {
        tracing::debug!(
            from_type = %to_type,
            to_type = %from_type,
            "no reverse default association type, mirror skipped"
        );
    }
    Ok(())
}

fn row_to_type(row: &rusqlite::Row) -> rusqlite::Result<AssociationType> {
    let category: String = row.get(3)?;
    let category = category.parse::<AssociationCategory>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(AssociationType {
        id: row.get(0)?,
        from_object_type_id: row.get(1)?,
        to_object_type_id: row.get(2)?,
        category,
        label: row.get(4)?,
        name: row.get(5)?,
    })
}
