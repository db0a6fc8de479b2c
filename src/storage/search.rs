//! Search Compiler - filter groups, full-text query, sort and paging to SQL.
//!
//! A request goes through three steps:
//!
//! 1. `validate` checks limits, operators and the cursor. It never touches
//!    the database.
//! 2. `compile` builds one shared FROM/WHERE clause. Every filter occurrence,
//!    the full-text query and the sort property each get their own
//!    `LEFT JOIN property_values` alias. The count query and the page query
//!    are both derived from that single clause.
//! 3. `SearchStore::search` runs both queries and loads the page.
//!
//! Groups are OR'd, filters inside a group are AND'd. Values compare as
//! text.

use std::fmt::Write;
use std::str::FromStr;

use rusqlite::Connection;
use serde::{Deserialize, Deserializer};

use crate::model::{Paging, SearchResults, value_to_text};
use crate::{Error, Result};
use super::objects::{self, ReadOptions};
use super::types::resolve;

pub const MAX_FILTER_GROUPS: usize = 5;
pub const MAX_FILTERS_PER_GROUP: usize = 6;
pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 200;
/// Hard ceiling on reported totals and reachable offsets
pub const MAX_TOTAL: usize = 10_000;

/// Properties the free-text `query` matches against
pub const DEFAULT_SEARCH_PROPERTIES: &[&str] = &[
    "hs_object_id",
    "firstname",
    "lastname",
    "email",
    "phone",
    "company",
    "name",
    "domain",
    "website",
    "dealname",
    "subject",
    "content",
];

// ========== Request types ==========

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub filter_groups: Vec<FilterGroup>,
    #[serde(default, deserialize_with = "optional_text")]
    pub query: Option<String>,
    #[serde(default)]
    pub sorts: Vec<Sort>,
    #[serde(default)]
    pub properties: Vec<String>,
    #[serde(default)]
    pub limit: usize,
    #[serde(default, deserialize_with = "optional_text")]
    pub after: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterGroup {
    #[serde(default)]
    pub filters: Vec<Filter>,
}

/// One predicate. The operator stays a string until validation so an
/// unknown operator is reported as a validation error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    #[serde(default)]
    pub property_name: String,
    #[serde(default)]
    pub operator: String,
    #[serde(default, deserialize_with = "optional_text")]
    pub value: Option<String>,
    #[serde(default, deserialize_with = "text_list")]
    pub values: Vec<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub high_value: Option<String>,
}

impl Filter {
    pub fn new(property_name: &str, operator: &str, value: &str) -> Self {
        Self {
            property_name: property_name.to_string(),
            operator: operator.to_string(),
            value: Some(value.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sort {
    #[serde(default)]
    pub property_name: String,
    #[serde(default)]
    pub direction: Option<String>,
}

fn optional_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|v| !v.is_null()).map(|v| value_to_text(&v)))
}

fn text_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(raw.unwrap_or_default().iter().map(value_to_text).collect())
}

// ========== Operators ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Between,
    In,
    NotIn,
    HasProperty,
    NotHasProperty,
    ContainsToken,
    NotContainsToken,
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "EQ" => Operator::Eq,
            "NEQ" => Operator::Neq,
            "LT" => Operator::Lt,
            "LTE" => Operator::Lte,
            "GT" => Operator::Gt,
            "GTE" => Operator::Gte,
            "BETWEEN" => Operator::Between,
            "IN" => Operator::In,
            "NOT_IN" => Operator::NotIn,
            "HAS_PROPERTY" => Operator::HasProperty,
            "NOT_HAS_PROPERTY" => Operator::NotHasProperty,
            "CONTAINS_TOKEN" => Operator::ContainsToken,
            "NOT_CONTAINS_TOKEN" => Operator::NotContainsToken,
            other => return Err(Error::validation(format!("Unknown operator: {}", other))),
        })
    }
}

// ========== Validation ==========

/// A predicate after validation, carrying exactly the operands it needs
#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Compare(Operator, String),
    Between(String, String),
    In(Vec<String>),
    NotIn(Vec<String>),
    HasProperty,
    NotHasProperty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Condition {
    property: String,
    predicate: Predicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone)]
struct Plan {
    groups: Vec<Vec<Condition>>,
    query: Option<String>,
    sort: Option<(String, Direction)>,
    limit: usize,
    offset: usize,
}

fn validate(request: &SearchRequest) -> Result<Plan> {
    if request.filter_groups.len() > MAX_FILTER_GROUPS {
        return Err(Error::validation(format!(
            "Too many filter groups: {} (max {})",
            request.filter_groups.len(),
            MAX_FILTER_GROUPS
        )));
    }

    let mut groups = Vec::with_capacity(request.filter_groups.len());
    for group in &request.filter_groups {
        if group.filters.len() > MAX_FILTERS_PER_GROUP {
            return Err(Error::validation(format!(
                "Too many filters in group: {} (max {})",
                group.filters.len(),
                MAX_FILTERS_PER_GROUP
            )));
        }
        let conditions = group
            .filters
            .iter()
            .map(validate_filter)
            .collect::<Result<Vec<_>>>()?;
        if !conditions.is_empty() {
            groups.push(conditions);
        }
    }

    let sort = match request.sorts.first() {
        None => None,
        Some(sort) => {
            if sort.property_name.trim().is_empty() {
                return Err(Error::validation("Sort propertyName is required"));
            }
            let direction = match sort.direction.as_deref() {
                None | Some("ASCENDING") | Some("ASC") => Direction::Asc,
                Some("DESCENDING") | Some("DESC") => Direction::Desc,
                Some(other) => {
                    return Err(Error::validation(format!("Unknown sort direction: {}", other)));
                }
            };
            Some((sort.property_name.clone(), direction))
        }
    };

    let offset = match request.after.as_deref().map(str::trim) {
        None | Some("") => 0,
        Some(after) => after
            .parse::<usize>()
            .map_err(|_| Error::validation(format!("after must be a numeric offset, got {:?}", after)))?,
    };

    let limit = match request.limit {
        0 => DEFAULT_LIMIT,
        n => n.min(MAX_LIMIT),
    };

    Ok(Plan {
        groups,
        query: request.query.clone().filter(|q| !q.trim().is_empty()),
        sort,
        limit,
        offset,
    })
}

fn validate_filter(filter: &Filter) -> Result<Condition> {
    let property = filter.property_name.trim();
    if property.is_empty() {
        return Err(Error::validation("Filter propertyName is required"));
    }
    let operator: Operator = filter.operator.parse()?;
    let value = || {
        filter
            .value
            .clone()
            .ok_or_else(|| Error::validation(format!("{} on {} requires a value", filter.operator, property)))
    };

    let predicate = match operator {
        Operator::HasProperty => Predicate::HasProperty,
        Operator::NotHasProperty => Predicate::NotHasProperty,
        Operator::In => Predicate::In(filter.values.clone()),
        Operator::NotIn => Predicate::NotIn(filter.values.clone()),
        Operator::Between => {
            let high = filter
                .high_value
                .clone()
                .ok_or_else(|| Error::validation(format!("BETWEEN on {} requires highValue", property)))?;
            Predicate::Between(value()?, high)
        }
        op => Predicate::Compare(op, value()?),
    };
    Ok(Condition {
        property: property.to_string(),
        predicate,
    })
}

// ========== Compilation ==========

/// SQL for one search, ready to run. Both statements share the same
/// FROM/WHERE text and the same bound parameters.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub count_sql: String,
    pub select_sql: String,
    pub params: Vec<String>,
    pub limit: usize,
    pub offset: usize,
}

/// Shared FROM/WHERE clause with its bound parameters
struct Clause {
    from: String,
    where_clause: String,
    order_by: String,
    sort_column: Option<String>,
    params: Vec<String>,
}

#[derive(Default)]
struct ClauseBuilder {
    joins: Vec<String>,
    params: Vec<String>,
}

impl ClauseBuilder {
    fn bind(&mut self, value: impl Into<String>) -> String {
        self.params.push(value.into());
        format!("?{}", self.params.len())
    }

    /// One LEFT JOIN per call; returns the alias
    fn join(&mut self, property: &str) -> String {
        let alias = format!("p{}", self.joins.len());
        let name = self.bind(property);
        self.joins.push(format!(
            "LEFT JOIN property_values {alias} ON {alias}.object_id = o.id AND {alias}.property_name = {name}"
        ));
        alias
    }

    fn condition(&mut self, condition: &Condition) -> String {
        let alias = self.join(&condition.property);
        let column = format!("{}.value", alias);
        match &condition.predicate {
            Predicate::Compare(op, value) => match op {
                Operator::Neq => format!("({column} IS NULL OR {column} != {})", self.bind(value.as_str())),
                Operator::Lt => format!("{column} < {}", self.bind(value.as_str())),
                Operator::Lte => format!("{column} <= {}", self.bind(value.as_str())),
                Operator::Gt => format!("{column} > {}", self.bind(value.as_str())),
                Operator::Gte => format!("{column} >= {}", self.bind(value.as_str())),
                Operator::ContainsToken => {
                    format!("{column} LIKE {} ESCAPE '\\'", self.bind(token_pattern(value)))
                }
                Operator::NotContainsToken => format!(
                    "({column} IS NULL OR {column} NOT LIKE {} ESCAPE '\\')",
                    self.bind(token_pattern(value))
                ),
                _ => format!("{column} = {}", self.bind(value.as_str())),
            },
            Predicate::Between(low, high) => {
                let low = self.bind(low.as_str());
                let high = self.bind(high.as_str());
                format!("({column} >= {low} AND {column} <= {high})")
            }
            Predicate::In(values) if values.is_empty() => "1=0".to_string(),
            Predicate::NotIn(values) if values.is_empty() => "1=1".to_string(),
            Predicate::In(values) => format!("{column} IN ({})", self.bind_list(values)),
            Predicate::NotIn(values) => {
                format!("({column} IS NULL OR {column} NOT IN ({}))", self.bind_list(values))
            }
            Predicate::HasProperty => format!("({column} IS NOT NULL AND {column} != '')"),
            Predicate::NotHasProperty => format!("({column} IS NULL OR {column} = '')"),
        }
    }

    fn bind_list(&mut self, values: &[String]) -> String {
        values
            .iter()
            .map(|v| self.bind(v.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// `*` is a wildcard; without one the token matches anywhere in the value.
fn token_pattern(value: &str) -> String {
    let escaped = escape_like(value, true);
    if value.contains('*') {
        escaped
    } else {
        format!("%{}%", escaped)
    }
}

/// Escape `LIKE` metacharacters for use with `ESCAPE '\'`.
fn escape_like(value: &str, star_wildcard: bool) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '%' | '_' | '\\' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '*' if star_wildcard => escaped.push('%'),
            c => escaped.push(c),
        }
    }
    escaped
}

fn build_clause(type_id: &str, plan: &Plan) -> Clause {
    let mut builder = ClauseBuilder::default();
    let type_param = builder.bind(type_id);
    let mut where_clause = format!("o.object_type_id = {} AND o.archived = 0", type_param);

    if !plan.groups.is_empty() {
        let groups: Vec<String> = plan
            .groups
            .iter()
            .map(|group| {
                let parts: Vec<String> = group.iter().map(|c| builder.condition(c)).collect();
                format!("({})", parts.join(" AND "))
            })
            .collect();
        let _ = write!(where_clause, " AND ({})", groups.join(" OR "));
    }

    if let Some(query) = &plan.query {
        let alias = format!("p{}", builder.joins.len());
        let names = DEFAULT_SEARCH_PROPERTIES
            .iter()
            .map(|n| builder.bind(*n))
            .collect::<Vec<_>>()
            .join(", ");
        builder.joins.push(format!(
            "LEFT JOIN property_values {alias} ON {alias}.object_id = o.id AND {alias}.property_name IN ({names})"
        ));
        let pattern = builder.bind(format!("%{}%", escape_like(query.trim(), false)));
        let _ = write!(where_clause, " AND {alias}.value LIKE {pattern} ESCAPE '\\'");
    }

    let (order_by, sort_column) = match &plan.sort {
        None => ("o.id ASC".to_string(), None),
        Some((property, direction)) if property == "hs_object_id" => {
            (format!("o.id {}", direction.sql()), None)
        }
        Some((property, direction)) => {
            let alias = builder.join(property);
            let column = format!("{}.value", alias);
            (format!("{} {}, o.id ASC", column, direction.sql()), Some(column))
        }
    };

    let mut from = String::from("FROM objects o");
    for join in &builder.joins {
        from.push(' ');
        from.push_str(join);
    }

    Clause {
        from,
        where_clause,
        order_by,
        sort_column,
        params: builder.params,
    }
}

/// Validate and compile a request against a resolved type id. Pure: no
/// database access.
pub fn compile(type_id: &str, request: &SearchRequest) -> Result<CompiledQuery> {
    let plan = validate(request)?;
    Ok(compile_plan(type_id, &plan))
}

fn compile_plan(type_id: &str, plan: &Plan) -> CompiledQuery {
    let clause = build_clause(type_id, plan);
    let count_sql = format!(
        "SELECT COUNT(DISTINCT o.id) {} WHERE {}",
        clause.from, clause.where_clause
    );

    let window = plan.limit.min(MAX_TOTAL.saturating_sub(plan.offset));
    let columns = match &clause.sort_column {
        Some(column) => format!("o.id, {}", column),
        None => "o.id".to_string(),
    };
    let select_sql = format!(
        "SELECT DISTINCT {} {} WHERE {} ORDER BY {} LIMIT {} OFFSET {}",
        columns, clause.from, clause.where_clause, clause.order_by, window, plan.offset
    );

    CompiledQuery {
        count_sql,
        select_sql,
        params: clause.params,
        limit: plan.limit,
        offset: plan.offset,
    }
}

// ========== Execution ==========

pub struct SearchStore<'a> {
    conn: &'a Connection,
}

impl<'a> SearchStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Run a search. The request is validated before anything is read.
    pub fn search(&self, type_ref: &str, request: &SearchRequest) -> Result<SearchResults> {
        let plan = validate(request)?;
        let type_id = resolve(self.conn, type_ref)?;
        let compiled = compile_plan(&type_id, &plan);

        let count: i64 = self.conn.query_row(
            &compiled.count_sql,
            rusqlite::params_from_iter(compiled.params.iter()),
            |row| row.get(0),
        )?;
        let total = (count.max(0) as usize).min(MAX_TOTAL);

        if compiled.offset >= MAX_TOTAL {
            return Ok(SearchResults {
                total,
                results: Vec::new(),
                paging: None,
            });
        }

        let mut stmt = self.conn.prepare(&compiled.select_sql)?;
        let ids = stmt
            .query_map(rusqlite::params_from_iter(compiled.params.iter()), |row| {
                row.get::<_, i64>(0)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let read = ReadOptions {
            properties: request.properties.clone(),
            properties_with_history: Vec::new(),
        };
        let results = ids
            .into_iter()
            .map(|id| objects::load_with(self.conn, &type_id, id, &read))
            .collect::<Result<Vec<_>>>()?;

        let next = compiled.offset + compiled.limit;
        let paging = if compiled.offset + results.len() < total && next < MAX_TOTAL {
            Some(Paging::after(next.to_string()))
        } else {
            None
        };

        tracing::debug!(
            object_type = %type_id,
            total,
            returned = results.len(),
            offset = compiled.offset,
            "search"
        );
        Ok(SearchResults {
            total,
            results,
            paging,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Properties;
    use crate::storage::Store;

    fn props(pairs: &[(&str, &str)]) -> Properties {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn group(filters: Vec<Filter>) -> FilterGroup {
        FilterGroup { filters }
    }

    fn filtered(groups: Vec<FilterGroup>) -> SearchRequest {
        SearchRequest {
            filter_groups: groups,
            ..Default::default()
        }
    }

    fn ids(results: &SearchResults) -> Vec<String> {
        results.results.iter().map(|o| o.id.clone()).collect()
    }

    fn people(store: &Store) -> (String, String) {
        let session = store.session();
        let alice = session
            .objects()
            .create("contacts", props(&[("firstname", "Alice"), ("lastname", "Smith"), ("email", "alice@acme.com")]))
            .unwrap();
        let bob = session
            .objects()
            .create("contacts", props(&[("firstname", "Bob"), ("lastname", "Jones"), ("email", "bob@initech.com")]))
            .unwrap();
        (alice.id, bob.id)
    }

    // ---------- compile step ----------

    #[test]
    fn test_too_many_groups_rejected_without_database() {
        let request = filtered((0..6).map(|_| group(vec![Filter::new("a", "EQ", "b")])).collect());
        let err = compile("0-1", &request).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // Validation runs before the type is resolved
        let store = Store::open_in_memory().unwrap();
        let err = store.session().search().search("no-such-type", &request).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_validation_errors() {
        let too_many_filters = filtered(vec![group((0..7).map(|_| Filter::new("a", "EQ", "b")).collect())]);
        let empty_name = filtered(vec![group(vec![Filter::new(" ", "EQ", "b")])]);
        let bad_operator = filtered(vec![group(vec![Filter::new("a", "LIKE", "b")])]);
        let missing_value = filtered(vec![group(vec![Filter {
            property_name: "a".to_string(),
            operator: "EQ".to_string(),
            ..Default::default()
        }])]);
        let missing_high = filtered(vec![group(vec![Filter::new("a", "BETWEEN", "1")])]);
        let bad_after = SearchRequest {
            after: Some("next".to_string()),
            ..Default::default()
        };

        for request in [too_many_filters, empty_name, bad_operator, missing_value, missing_high, bad_after] {
            assert!(matches!(compile("0-1", &request), Err(Error::Validation(_))));
        }
    }

    #[test]
    fn test_one_join_per_filter_occurrence() {
        let request = filtered(vec![group(vec![
            Filter::new("amount", "GT", "10"),
            Filter::new("amount", "LT", "99"),
        ])]);
        let compiled = compile("0-3", &request).unwrap();
        assert_eq!(compiled.count_sql.matches("LEFT JOIN property_values").count(), 2);
        assert!(compiled.count_sql.contains("p0.value > "));
        assert!(compiled.count_sql.contains("p1.value < "));
        assert_eq!(compiled.params, vec!["0-3", "amount", "10", "amount", "99"]);
    }

    #[test]
    fn test_count_and_select_share_clause() {
        let request = SearchRequest {
            filter_groups: vec![group(vec![Filter::new("email", "CONTAINS_TOKEN", "acme")])],
            query: Some("ali".to_string()),
            sorts: vec![Sort {
                property_name: "lastname".to_string(),
                direction: Some("DESCENDING".to_string()),
            }],
            ..Default::default()
        };
        let compiled = compile("0-1", &request).unwrap();
        let shared = compiled
            .count_sql
            .trim_start_matches("SELECT COUNT(DISTINCT o.id) ");
        assert!(compiled.select_sql.contains(shared));
        assert!(compiled.select_sql.contains("ORDER BY p2.value DESC, o.id ASC"));
    }

    #[test]
    fn test_empty_in_lists_short_circuit() {
        let in_empty = Filter {
            property_name: "email".to_string(),
            operator: "IN".to_string(),
            ..Default::default()
        };
        let not_in_empty = Filter {
            operator: "NOT_IN".to_string(),
            ..in_empty.clone()
        };
        assert!(compile("0-1", &filtered(vec![group(vec![in_empty])])).unwrap().count_sql.contains("1=0"));
        assert!(compile("0-1", &filtered(vec![group(vec![not_in_empty])])).unwrap().count_sql.contains("1=1"));
    }

    #[test]
    fn test_limit_and_offset_bounds() {
        let compiled = compile("0-1", &SearchRequest::default()).unwrap();
        assert_eq!(compiled.limit, DEFAULT_LIMIT);

        let compiled = compile("0-1", &SearchRequest { limit: 5000, ..Default::default() }).unwrap();
        assert_eq!(compiled.limit, MAX_LIMIT);

        let compiled = compile("0-1", &SearchRequest { after: Some("40".to_string()), ..Default::default() }).unwrap();
        assert_eq!(compiled.offset, 40);
    }

    #[test]
    fn test_token_pattern() {
        assert_eq!(token_pattern("acme"), "%acme%");
        assert_eq!(token_pattern("ac*"), "ac%");
        assert_eq!(token_pattern("50%"), "%50\\%%");
    }

    #[test]
    fn test_deserialize_lenient_values() {
        let request: SearchRequest = serde_json::from_str(
            r#"{
                "filterGroups": [{"filters": [
                    {"propertyName": "amount", "operator": "GTE", "value": 100},
                    {"propertyName": "dealstage", "operator": "IN", "values": ["a", 2]}
                ]}],
                "after": 20,
                "limit": 3
            }"#,
        )
        .unwrap();
        let filters = &request.filter_groups[0].filters;
        assert_eq!(filters[0].value.as_deref(), Some("100"));
        assert_eq!(filters[1].values, vec!["a".to_string(), "2".to_string()]);
        assert_eq!(request.after.as_deref(), Some("20"));
        assert_eq!(request.limit, 3);
    }

    // ---------- execution ----------

    #[test]
    fn test_pagination_partitions_results() {
        let store = Store::open_in_memory().unwrap();
        {
            let session = store.session();
            for i in 0..5 {
                session
                    .objects()
                    .create("contacts", props(&[("firstname", format!("c{i}").as_str())]))
                    .unwrap();
            }
        }

        let session = store.session();
        let search = session.search();
        let mut request = SearchRequest { limit: 2, ..Default::default() };

        let first = search.search("contacts", &request).unwrap();
        assert_eq!(first.total, 5);
        assert_eq!(first.next_after(), Some("2"));

        request.after = first.next_after().map(String::from);
        let second = search.search("contacts", &request).unwrap();
        assert_eq!(second.next_after(), Some("4"));

        request.after = second.next_after().map(String::from);
        let third = search.search("contacts", &request).unwrap();
        assert!(third.paging.is_none());
        assert_eq!(third.results.len(), 1);

        let mut all: Vec<String> = [ids(&first), ids(&second), ids(&third)].concat();
        let count = all.len();
        all.sort();
        all.dedup();
        assert_eq!(count, 5);
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn test_groups_or_filters_and() {
        let store = Store::open_in_memory().unwrap();
        let (alice, bob) = people(&store);
        let session = store.session();
        let search = session.search();

        let and = filtered(vec![group(vec![
            Filter::new("firstname", "EQ", "Alice"),
            Filter::new("lastname", "EQ", "Jones"),
        ])]);
        assert_eq!(search.search("contacts", &and).unwrap().total, 0);

        let and_match = filtered(vec![group(vec![
            Filter::new("firstname", "EQ", "Alice"),
            Filter::new("lastname", "EQ", "Smith"),
        ])]);
        assert_eq!(ids(&search.search("contacts", &and_match).unwrap()), vec![alice.clone()]);

        let or = filtered(vec![
            group(vec![Filter::new("firstname", "EQ", "Alice")]),
            group(vec![Filter::new("firstname", "EQ", "Bob")]),
        ]);
        assert_eq!(ids(&search.search("contacts", &or).unwrap()), vec![alice, bob]);
    }

    #[test]
    fn test_negative_operators_include_missing_property() {
        let store = Store::open_in_memory().unwrap();
        let (alice, bob) = people(&store);
        let session = store.session();
        let bare = session.objects().create("contacts", Properties::new()).unwrap().id;
        let search = session.search();

        let neq = filtered(vec![group(vec![Filter::new("firstname", "NEQ", "Alice")])]);
        assert_eq!(ids(&search.search("contacts", &neq).unwrap()), vec![bob.clone(), bare.clone()]);

        let not_in = filtered(vec![group(vec![Filter {
            property_name: "firstname".to_string(),
            operator: "NOT_IN".to_string(),
            values: vec!["Bob".to_string()],
            ..Default::default()
        }])]);
        assert_eq!(ids(&search.search("contacts", &not_in).unwrap()), vec![alice.clone(), bare.clone()]);

        let not_contains = filtered(vec![group(vec![Filter::new("email", "NOT_CONTAINS_TOKEN", "acme")])]);
        assert_eq!(ids(&search.search("contacts", &not_contains).unwrap()), vec![bob, bare]);
    }

    #[test]
    fn test_has_property_ignores_empty_values() {
        let store = Store::open_in_memory().unwrap();
        let session = store.session();
        let filled = session.objects().create("contacts", props(&[("phone", "555")])).unwrap().id;
        let blank = session.objects().create("contacts", props(&[("phone", "")])).unwrap().id;
        let missing = session.objects().create("contacts", Properties::new()).unwrap().id;
        let search = session.search();

        let has = filtered(vec![group(vec![Filter {
            property_name: "phone".to_string(),
            operator: "HAS_PROPERTY".to_string(),
            ..Default::default()
        }])]);
        assert_eq!(ids(&search.search("contacts", &has).unwrap()), vec![filled]);

        let has_not = filtered(vec![group(vec![Filter {
            property_name: "phone".to_string(),
            operator: "NOT_HAS_PROPERTY".to_string(),
            ..Default::default()
        }])]);
        assert_eq!(ids(&search.search("contacts", &has_not).unwrap()), vec![blank, missing]);
    }

    #[test]
    fn test_range_and_in_operators() {
        let store = Store::open_in_memory().unwrap();
        let session = store.session();
        let objects = session.objects();
        let low = objects.create("deals", props(&[("amount", "100"), ("dealstage", "qualifiedtobuy")])).unwrap().id;
        let mid = objects.create("deals", props(&[("amount", "300"), ("dealstage", "closedwon")])).unwrap().id;
        let high = objects.create("deals", props(&[("amount", "500"), ("dealstage", "closedlost")])).unwrap().id;
        let search = session.search();

        let between = filtered(vec![group(vec![Filter {
            high_value: Some("400".to_string()),
            ..Filter::new("amount", "BETWEEN", "200")
        }])]);
        assert_eq!(ids(&search.search("deals", &between).unwrap()), vec![mid.clone()]);

        let gte = filtered(vec![group(vec![Filter::new("amount", "GTE", "300")])]);
        assert_eq!(ids(&search.search("deals", &gte).unwrap()), vec![mid.clone(), high.clone()]);

        let lt = filtered(vec![group(vec![Filter::new("amount", "LT", "300")])]);
        assert_eq!(ids(&search.search("deals", &lt).unwrap()), vec![low.clone()]);

        let within = filtered(vec![group(vec![Filter {
            property_name: "dealstage".to_string(),
            operator: "IN".to_string(),
            values: vec!["closedwon".to_string(), "closedlost".to_string()],
            ..Default::default()
        }])]);
        assert_eq!(ids(&search.search("deals", &within).unwrap()), vec![mid, high]);
    }

    #[test]
    fn test_contains_token_wildcard() {
        let store = Store::open_in_memory().unwrap();
        let (alice, bob) = people(&store);
        let session = store.session();
        let search = session.search();

        let prefix = filtered(vec![group(vec![Filter::new("email", "CONTAINS_TOKEN", "bob*")])]);
        assert_eq!(ids(&search.search("contacts", &prefix).unwrap()), vec![bob]);

        let domain = filtered(vec![group(vec![Filter::new("email", "CONTAINS_TOKEN", "acme")])]);
        assert_eq!(ids(&search.search("contacts", &domain).unwrap()), vec![alice]);
    }

    #[test]
    fn test_query_matches_default_properties() {
        let store = Store::open_in_memory().unwrap();
        let (alice, _) = people(&store);
        let session = store.session();
        session
            .objects()
            .create("contacts", props(&[("notes_field", "Smithsonian")]))
            .unwrap();

        let request = SearchRequest {
            query: Some("smith".to_string()),
            ..Default::default()
        };
        let results = session.search().search("contacts", &request).unwrap();
        assert_eq!(results.total, 1);
        assert_eq!(ids(&results), vec![alice]);
    }

    #[test]
    fn test_query_wildcards_are_literal() {
        let store = Store::open_in_memory().unwrap();
        let (alice, _) = people(&store);
        let session = store.session();
        session
            .objects()
            .create("contacts", props(&[("firstname", "Carol")]))
            .unwrap();

        let query = |text: &str| SearchRequest {
            query: Some(text.to_string()),
            ..Default::default()
        };
        let search = session.search();
        assert_eq!(search.search("contacts", &query("%")).unwrap().total, 0);
        assert_eq!(search.search("contacts", &query("_")).unwrap().total, 0);
        assert_eq!(search.search("contacts", &query("a%e")).unwrap().total, 0);
        assert_eq!(ids(&search.search("contacts", &query("lic")).unwrap()), vec![alice]);

        let percent = session
            .objects()
            .create("contacts", props(&[("lastname", "100%_sure")]))
            .unwrap();
        assert_eq!(ids(&search.search("contacts", &query("0%_")).unwrap()), vec![percent.id]);
    }

    #[test]
    fn test_sorting() {
        let store = Store::open_in_memory().unwrap();
        let (alice, bob) = people(&store);
        let session = store.session();
        let search = session.search();

        let by_name_desc = SearchRequest {
            sorts: vec![Sort {
                property_name: "firstname".to_string(),
                direction: Some("DESCENDING".to_string()),
            }],
            ..Default::default()
        };
        assert_eq!(ids(&search.search("contacts", &by_name_desc).unwrap()), vec![bob.clone(), alice.clone()]);

        let by_id_desc = SearchRequest {
            sorts: vec![Sort {
                property_name: "hs_object_id".to_string(),
                direction: Some("DESCENDING".to_string()),
            }],
            ..Default::default()
        };
        assert_eq!(ids(&search.search("contacts", &by_id_desc).unwrap()), vec![bob, alice]);
    }

    #[test]
    fn test_archived_objects_excluded() {
        let store = Store::open_in_memory().unwrap();
        let (alice, bob) = people(&store);
        let session = store.session();
        session.objects().archive("contacts", &alice).unwrap();

        let results = session.search().search("contacts", &SearchRequest::default()).unwrap();
        assert_eq!(results.total, 1);
        assert_eq!(ids(&results), vec![bob]);
    }

    #[test]
    fn test_offset_beyond_ceiling_is_empty() {
        let store = Store::open_in_memory().unwrap();
        people(&store);
        let request = SearchRequest {
            after: Some(MAX_TOTAL.to_string()),
            ..Default::default()
        };
        let results = store.session().search().search("contacts", &request).unwrap();
        assert_eq!(results.total, 2);
        assert!(results.results.is_empty());
        assert!(results.paging.is_none());
    }

    #[test]
    fn test_requested_properties_returned() {
        let store = Store::open_in_memory().unwrap();
        people(&store);
        let request = SearchRequest {
            properties: vec!["email".to_string()],
            limit: 1,
            ..Default::default()
        };
        let results = store.session().search().search("contacts", &request).unwrap();
        let first = &results.results[0];
        assert_eq!(first.property("email"), Some("alice@acme.com"));
        assert!(first.property("firstname").is_none());
        assert!(first.property("hs_object_id").is_some());
    }
}
