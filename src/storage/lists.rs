//! Manual lists of objects of one type.

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::model::{Page, Paging, now_timestamp};
use crate::{Error, Result};
use super::objects;
use super::types::resolve;

const DEFAULT_MEMBERSHIP_LIMIT: usize = 100;
const MAX_MEMBERSHIP_LIMIT: usize = 250;
const MANUAL: &str = "MANUAL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmList {
    pub list_id: String,
    pub name: String,
    pub object_type_id: String,
    pub processing_type: String,
    pub size: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListInput {
    pub name: String,
    pub object_type_id: String,
    #[serde(default)]
    pub processing_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub record_id: String,
    pub membership_timestamp: String,
}

/// Outcome of adding or removing members
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipChange {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub record_ids_added: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub record_ids_removed: Vec<String>,
    pub record_ids_missing: Vec<String>,
}

pub struct ListStore<'a> {
    conn: &'a Connection,
}

impl<'a> ListStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn create(&self, input: ListInput) -> Result<CrmList> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(Error::validation("list name is required"));
        }
        let processing_type = input.processing_type.as_deref().unwrap_or(MANUAL);
        if processing_type != MANUAL {
            return Err(Error::validation(format!(
                "unsupported processing type {}",
                processing_type
            )));
        }
        let type_id = resolve(self.conn, &input.object_type_id)?;
        let now = now_timestamp();
        self.conn
            .execute(
                r#"
                INSERT INTO lists (name, object_type_id, processing_type, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?4)
                "#,
                params![name, type_id, processing_type, now],
            )
            .map_err(|e| Error::conflict_on_unique(e, format!("list {} already exists", name)))?;
        let id = self.conn.last_insert_rowid();
        tracing::debug!(list = id, object_type = %type_id, "created list");
        self.get(&id.to_string())
    }

    pub fn get(&self, list_id: &str) -> Result<CrmList> {
        let numeric: i64 = list_id.parse().map_err(|_| Error::not_found("list", list_id))?;
        self.find("l.id = ?1", rusqlite::types::Value::Integer(numeric))?
            .ok_or_else(|| Error::not_found("list", list_id))
    }

    pub fn get_by_name(&self, name: &str) -> Result<CrmList> {
        self.find("l.name = ?1", rusqlite::types::Value::Text(name.to_string()))?
            .ok_or_else(|| Error::not_found("list", name))
    }

    fn find(&self, condition: &str, key: rusqlite::types::Value) -> Result<Option<CrmList>> {
        self.conn
            .query_row(
                &format!(
                    r#"
                    SELECT l.id, l.name, l.object_type_id, l.processing_type, l.created_at, l.updated_at,
                           (SELECT COUNT(*) FROM list_memberships m WHERE m.list_id = l.id)
                    FROM lists l WHERE {}
                    "#,
                    condition
                ),
                [key],
                row_to_list,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn update_name(&self, list_id: &str, name: &str) -> Result<CrmList> {
        let current = self.get(list_id)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("list name is required"));
        }
        self.conn
            .execute(
                "UPDATE lists SET name = ?1, updated_at = ?2 WHERE id = ?3",
                params![name, now_timestamp(), current.list_id],
            )
            .map_err(|e| Error::conflict_on_unique(e, format!("list {} already exists", name)))?;
        self.get(list_id)
    }

    /// Delete a list and its memberships
    pub fn delete(&self, list_id: &str) -> Result<()> {
        let current = self.get(list_id)?;
        self.conn
            .execute("DELETE FROM list_memberships WHERE list_id = ?1", [&current.list_id])?;
        self.conn.execute("DELETE FROM lists WHERE id = ?1", [&current.list_id])?;
        Ok(())
    }

    // ========== Membership Operations ==========

    /// Add live objects of the list's type. Other ids come back as missing.
    pub fn add_members(&self, list_id: &str, record_ids: &[String]) -> Result<MembershipChange> {
        let list = self.get(list_id)?;
        let now = now_timestamp();
        let mut change = MembershipChange::default();
        for record_id in record_ids {
            let object_id = match objects::require_live(self.conn, &list.object_type_id, record_id) {
                Ok(id) => id,
                Err(e) if e.is_not_found() => {
                    change.record_ids_missing.push(record_id.clone());
                    continue;
                }
                Err(e) => return Err(e),
            };
            let inserted = self.conn.execute(
                "INSERT OR IGNORE INTO list_memberships (list_id, object_id, added_at) VALUES (?1, ?2, ?3)",
                params![list.list_id, object_id, now],
            )?;
            if inserted > 0 {
                change.record_ids_added.push(object_id.to_string());
            }
        }
        self.touch(&list.list_id)?;
        Ok(change)
    }

    /// Remove members. Ids that are not members come back as missing.
    pub fn remove_members(&self, list_id: &str, record_ids: &[String]) -> Result<MembershipChange> {
        let list = self.get(list_id)?;
        let mut change = MembershipChange::default();
        for record_id in record_ids {
            let removed = match record_id.parse::<i64>() {
                Ok(object_id) => self.conn.execute(
                    "DELETE FROM list_memberships WHERE list_id = ?1 AND object_id = ?2",
                    params![list.list_id, object_id],
                )?,
                Err(_) => 0,
            };
            if removed > 0 {
                change.record_ids_removed.push(record_id.clone());
            } else {
                change.record_ids_missing.push(record_id.clone());
            }
        }
        self.touch(&list.list_id)?;
        Ok(change)
    }

    /// Members ordered by object id
    pub fn memberships(&self, list_id: &str, limit: usize, after: Option<&str>) -> Result<Page<Membership>> {
        let list = self.get(list_id)?;
        let limit = match limit {
            0 => DEFAULT_MEMBERSHIP_LIMIT,
            n => n.min(MAX_MEMBERSHIP_LIMIT),
        };
        let after: i64 = match after {
            None | Some("") => 0,
            Some(after) => after
                .parse()
                .map_err(|_| Error::validation(format!("after must be a record id, got {:?}", after)))?,
        };

        let mut stmt = self.conn.prepare_cached(
            r#"
            SELECT object_id, added_at FROM list_memberships
            WHERE list_id = ?1 AND object_id > ?2
            ORDER BY object_id
            LIMIT ?3
            "#,
        )?;
        let mut members = stmt
            .query_map(params![list.list_id, after, (limit + 1) as i64], |row| {
                Ok(Membership {
                    record_id: row.get::<_, i64>(0)?.to_string(),
                    membership_timestamp: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let has_more = members.len() > limit;
        members.truncate(limit);
        let paging = match members.last() {
            Some(last) if has_more => Some(Paging::after(last.record_id.clone())),
            _ => None,
        };
        Ok(Page {
            results: members,
            paging,
        })
    }

    fn touch(&self, list_id: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE lists SET updated_at = ?1 WHERE id = ?2",
            params![now_timestamp(), list_id],
        )?;
        Ok(())
    }
}

fn row_to_list(row: &rusqlite::Row) -> rusqlite::Result<CrmList> {
    Ok(CrmList {
        list_id: row.get::<_, i64>(0)?.to_string(),
        name: row.get(1)?,
        object_type_id: row.get(2)?,
        processing_type: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        size: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Properties;
    use crate::storage::Store;

    fn contacts_list(name: &str) -> ListInput {
        ListInput {
            name: name.to_string(),
            object_type_id: "contacts".to_string(),
            processing_type: None,
        }
    }

    #[test]
    fn test_create_and_lookup() {
        let store = Store::open_in_memory().unwrap();
        let session = store.session();
        let lists = session.lists();
        let created = lists.create(contacts_list("Newsletter")).unwrap();
        assert_eq!(created.object_type_id, "0-1");
        assert_eq!(created.processing_type, "MANUAL");
        assert_eq!(created.size, 0);

        assert_eq!(lists.get(&created.list_id).unwrap(), created);
        assert_eq!(lists.get_by_name("Newsletter").unwrap().list_id, created.list_id);
        assert!(matches!(lists.create(contacts_list("Newsletter")), Err(Error::Conflict(_))));
    }

    #[test]
    fn test_dynamic_lists_rejected() {
        let store = Store::open_in_memory().unwrap();
        let input = ListInput {
            processing_type: Some("DYNAMIC".to_string()),
            ..contacts_list("Active")
        };
        assert!(matches!(store.session().lists().create(input), Err(Error::Validation(_))));
    }

    #[test]
    fn test_membership_add_remove() {
        let store = Store::open_in_memory().unwrap();
        let session = store.session();
        let contact = session.objects().create("contacts", Properties::new()).unwrap();
        let company = session.objects().create("companies", Properties::new()).unwrap();
        let lists = session.lists();
        let list = lists.create(contacts_list("VIP")).unwrap();

        let added = lists
            .add_members(&list.list_id, &[contact.id.clone(), company.id.clone(), "999".to_string()])
            .unwrap();
        assert_eq!(added.record_ids_added, vec![contact.id.clone()]);
        assert_eq!(added.record_ids_missing, vec![company.id.clone(), "999".to_string()]);
        assert_eq!(lists.get(&list.list_id).unwrap().size, 1);

        let page = lists.memberships(&list.list_id, 0, None).unwrap();
        assert_eq!(page.results[0].record_id, contact.id);

        let removed = lists
            .remove_members(&list.list_id, &[contact.id.clone(), company.id.clone()])
            .unwrap();
        assert_eq!(removed.record_ids_removed, vec![contact.id]);
        assert_eq!(removed.record_ids_missing, vec![company.id]);
    }

    #[test]
    fn test_membership_paging() {
        let store = Store::open_in_memory().unwrap();
        let session = store.session();
        let ids: Vec<String> = (0..3)
            .map(|_| session.objects().create("contacts", Properties::new()).unwrap().id)
            .collect();
        let lists = session.lists();
        let list = lists.create(contacts_list("All")).unwrap();
        lists.add_members(&list.list_id, &ids).unwrap();

        let first = lists.memberships(&list.list_id, 2, None).unwrap();
        assert_eq!(first.results.len(), 2);
        let second = lists.memberships(&list.list_id, 2, first.next_after()).unwrap();
        assert_eq!(second.results.len(), 1);
        assert_eq!(second.results[0].record_id, ids[2]);
        assert!(second.paging.is_none());
    }

    #[test]
    fn test_rename_and_delete() {
        let store = Store::open_in_memory().unwrap();
        let session = store.session();
        let lists = session.lists();
        let a = lists.create(contacts_list("A")).unwrap();
        lists.create(contacts_list("B")).unwrap();

        assert!(matches!(lists.update_name(&a.list_id, "B"), Err(Error::Conflict(_))));
        assert_eq!(lists.update_name(&a.list_id, "C").unwrap().name, "C");

        lists.delete(&a.list_id).unwrap();
        assert!(lists.get(&a.list_id).unwrap_err().is_not_found());
    }
}
