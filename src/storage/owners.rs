//! Owners - users records can be assigned to. Created from configuration.

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::model::{Page, Paging, now_timestamp};
use crate::{Error, Result};

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub user_id: Option<i64>,
    pub archived: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// An owner as written in the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerInput {
    pub email: String,
    #[serde(default, alias = "first_name")]
    pub first_name: String,
    #[serde(default, alias = "last_name")]
    pub last_name: String,
    #[serde(default, alias = "user_id")]
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct OwnerListOptions {
    pub email: Option<String>,
    pub limit: usize,
    pub after: Option<String>,
    pub archived: bool,
}

pub struct OwnerStore<'a> {
    conn: &'a Connection,
}

impl<'a> OwnerStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn create(&self, input: &OwnerInput) -> Result<Owner> {
        if input.email.trim().is_empty() {
            return Err(Error::validation("owner email is required"));
        }
        let now = now_timestamp();
        self.conn.execute(
            r#"
            INSERT INTO owners (email, first_name, last_name, user_id, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
            params![input.email, input.first_name, input.last_name, input.user_id, now],
        )?;
        self.get(&self.conn.last_insert_rowid().to_string())
    }

    /// Create the owner unless one with the same email already exists
    pub fn ensure(&self, input: &OwnerInput) -> Result<Owner> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM owners WHERE email = ?1 AND archived = 0 ORDER BY id LIMIT 1",
                [&input.email],
                |row| row.get(0),
            )
            .optional()?;
        match existing {
            Some(id) => self.get(&id.to_string()),
            None => self.create(input),
        }
    }

    pub fn get(&self, id: &str) -> Result<Owner> {
        let numeric: i64 = id.parse().map_err(|_| Error::not_found("owner", id))?;
        self.conn
            .query_row(
                r#"
                SELECT id, email, first_name, last_name, user_id, archived, created_at, updated_at
                FROM owners WHERE id = ?1
                "#,
                [numeric],
                row_to_owner,
            )
            .optional()?
            .ok_or_else(|| Error::not_found("owner", id))
    }

    /// Owners ordered by id, optionally filtered by email
    pub fn list(&self, options: &OwnerListOptions) -> Result<Page<Owner>> {
        let limit = match options.limit {
            0 => DEFAULT_LIMIT,
            n => n.min(MAX_LIMIT),
        };
        let after: i64 = match options.after.as_deref() {
            None | Some("") => 0,
            Some(after) => after
                .parse()
                .map_err(|_| Error::validation(format!("after must be an owner id, got {:?}", after)))?,
        };

        let mut stmt = self.conn.prepare_cached(
            r#"
            SELECT id, email, first_name, last_name, user_id, archived, created_at, updated_at
            FROM owners
            WHERE archived = ?1 AND id > ?2 AND (?3 IS NULL OR email = ?3)
            ORDER BY id
            LIMIT ?4
            "#,
        )?;
        let mut owners = stmt
            .query_map(
                params![options.archived, after, options.email, (limit + 1) as i64],
                row_to_owner,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let has_more = owners.len() > limit;
        owners.truncate(limit);
        let paging = match owners.last() {
            Some(last) if has_more => Some(Paging::after(last.id.clone())),
            _ => None,
        };
        Ok(Page {
            results: owners,
            paging,
        })
    }
}

fn row_to_owner(row: &rusqlite::Row) -> rusqlite::Result<Owner> {
    Ok(Owner {
        id: row.get::<_, i64>(0)?.to_string(),
        email: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        user_id: row.get(4)?,
        archived: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;

    fn owner(email: &str) -> OwnerInput {
        OwnerInput {
            email: email.to_string(),
            first_name: "Sam".to_string(),
            last_name: "Sales".to_string(),
            user_id: Some(7),
        }
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let session = store.session();
        let first = session.owners().ensure(&owner("sam@example.com")).unwrap();
        let again = session.owners().ensure(&owner("sam@example.com")).unwrap();
        assert_eq!(first, again);
        assert_eq!(session.owners().get(&first.id).unwrap().user_id, Some(7));
    }

    #[test]
    fn test_list_filters_and_pages() {
        let store = Store::open_in_memory().unwrap();
        let session = store.session();
        let owners = session.owners();
        for email in ["a@x.com", "b@x.com", "c@x.com"] {
            owners.create(&owner(email)).unwrap();
        }

        let page = owners.list(&OwnerListOptions { limit: 2, ..Default::default() }).unwrap();
        assert_eq!(page.results.len(), 2);
        let rest = owners
            .list(&OwnerListOptions {
                limit: 2,
                after: page.next_after().map(String::from),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(rest.results.len(), 1);
        assert!(rest.paging.is_none());

        let by_email = owners
            .list(&OwnerListOptions { email: Some("b@x.com".to_string()), ..Default::default() })
            .unwrap();
        assert_eq!(by_email.results.len(), 1);
        assert_eq!(by_email.results[0].email, "b@x.com");
    }

    #[test]
    fn test_get_missing_owner() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.session().owners().get("42").unwrap_err().is_not_found());
        assert!(store.session().owners().get("x").unwrap_err().is_not_found());
    }
}
