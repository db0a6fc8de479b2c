//! Record and wire types shared by the stores and the HTTP layer.
//!
//! Property values are strings everywhere. Inputs accept JSON scalars and
//! turn them into their text form on the way in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Property name -> value, ordered for stable output.
pub type Properties = BTreeMap<String, String>;

/// Current time in the API's timestamp format.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Format as `YYYY-MM-DDTHH:mm:ss.sssZ`.
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Text form of a JSON scalar. Null becomes the empty string.
pub fn value_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Deserialize a property map whose values may be strings, numbers or booleans.
pub fn deserialize_properties<'de, D>(deserializer: D) -> std::result::Result<Properties, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, value_to_text(&v)))
        .collect())
}

// ========== Object types ==========

/// A registered object type, built-in (`0-N`) or custom (`2-N`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectType {
    pub id: String,
    pub name: String,
    pub label_singular: String,
    pub label_plural: String,
    pub primary_display_property: Option<String>,
    pub is_custom: bool,
    pub created_at: String,
    pub updated_at: String,
}

// ========== Objects ==========

/// One entry of a property's change history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyHistoryEntry {
    pub value: String,
    pub timestamp: String,
    pub source_type: String,
}

/// An object as returned to callers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmObject {
    pub id: String,
    pub properties: Properties,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties_with_history: Option<BTreeMap<String, Vec<PropertyHistoryEntry>>>,
    pub created_at: String,
    pub updated_at: String,
    pub archived: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<String>,
    #[serde(skip)]
    pub object_type_id: String,
    #[serde(skip)]
    pub merged_into_id: Option<String>,
}

impl CrmObject {
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }
}

/// `{"id": "..."}` as used throughout batch and association payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectId {
    pub id: String,
}

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Body of a create request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectInput {
    #[serde(default, deserialize_with = "deserialize_properties")]
    pub properties: Properties,
    #[serde(default)]
    pub associations: Vec<InlineAssociation>,
}

/// Association attached while creating an object. The target type is taken
/// from the association type ids.
#[derive(Debug, Clone, Deserialize)]
pub struct InlineAssociation {
    pub to: ObjectId,
    pub types: Vec<AssociationSpec>,
}

/// One input of a batch update or upsert.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchObjectInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub id_property: Option<String>,
    #[serde(default, deserialize_with = "deserialize_properties")]
    pub properties: Properties,
}

/// Body of a batch read request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReadInput {
    pub inputs: Vec<ObjectId>,
    #[serde(default)]
    pub properties: Vec<String>,
    #[serde(default)]
    pub properties_with_history: Vec<String>,
    #[serde(default)]
    pub id_property: Option<String>,
}

/// Result entry of a batch upsert.
#[derive(Debug, Clone, Serialize)]
pub struct UpsertResult {
    #[serde(flatten)]
    pub object: CrmObject,
    pub new: bool,
}

// ========== Associations ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssociationCategory {
    HubspotDefined,
    UserDefined,
}

impl AssociationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssociationCategory::HubspotDefined => "HUBSPOT_DEFINED",
            AssociationCategory::UserDefined => "USER_DEFINED",
        }
    }
}

impl FromStr for AssociationCategory {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HUBSPOT_DEFINED" => Ok(AssociationCategory::HubspotDefined),
            "USER_DEFINED" => Ok(AssociationCategory::UserDefined),
            _ => Err(crate::Error::validation(format!("Unknown association category: {}", s))),
        }
    }
}

impl std::fmt::Display for AssociationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A row of `association_types`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationType {
    pub id: i64,
    pub from_object_type_id: String,
    pub to_object_type_id: String,
    pub category: AssociationCategory,
    pub label: Option<String>,
    pub name: Option<String>,
}

/// `{category, typeId}` - the request/response form of an association type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationSpec {
    #[serde(alias = "associationCategory")]
    pub category: AssociationCategory,
    #[serde(alias = "associationTypeId")]
    pub type_id: i64,
}

/// `{typeId, category, label}` as listed on an association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationTypeRef {
    pub type_id: i64,
    pub category: AssociationCategory,
    pub label: Option<String>,
}

/// Every association type linking one object to `to_object_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociatedObject {
    pub to_object_id: String,
    pub types: Vec<AssociationTypeRef>,
}

/// Result of a labelled association request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelsBetweenObjectPair {
    pub from_object_type_id: String,
    pub from_object_id: String,
    pub to_object_type_id: String,
    pub to_object_id: String,
    pub labels: Vec<String>,
}

// ========== Batches and pages ==========

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchError {
    pub status: String,
    pub category: String,
    pub message: String,
    pub context: BTreeMap<String, Vec<String>>,
}

impl BatchError {
    pub fn new(category: &str, message: impl Into<String>, ids: Vec<String>) -> Self {
        let mut context = BTreeMap::new();
        context.insert("ids".to_string(), ids);
        Self {
            status: "error".to_string(),
            category: category.to_string(),
            message: message.into(),
            context,
        }
    }
}

/// `{status, startedAt, completedAt, results, numErrors}`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult<T> {
    pub status: String,
    pub started_at: String,
    pub completed_at: String,
    pub results: Vec<T>,
    pub num_errors: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<BatchError>,
}

impl<T> BatchResult<T> {
    /// Close a batch that started at `started_at`.
    pub fn complete(started_at: String, results: Vec<T>, errors: Vec<BatchError>) -> Self {
        Self {
            status: "COMPLETE".to_string(),
            started_at,
            completed_at: now_timestamp(),
            results,
            num_errors: errors.len(),
            errors,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextPage {
    pub after: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Paging {
    pub next: NextPage,
}

impl Paging {
    pub fn after(after: impl Into<String>) -> Self {
        Self {
            next: NextPage { after: after.into() },
        }
    }
}

/// One page of a keyset-paginated listing.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paging: Option<Paging>,
}

impl<T> Page<T> {
    pub fn next_after(&self) -> Option<&str> {
        self.paging.as_ref().map(|p| p.next.after.as_str())
    }
}

/// `{total, results, paging?}`
#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub total: usize,
    pub results: Vec<CrmObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paging: Option<Paging>,
}

impl SearchResults {
    pub fn next_after(&self) -> Option<&str> {
        self.paging.as_ref().map(|p| p.next.after.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_format() {
        let t = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        assert_eq!(format_timestamp(t), "2024-03-05T07:08:09.000Z");
    }

    #[test]
    fn test_lenient_properties() {
        let input: ObjectInput = serde_json::from_str(
            r#"{"properties": {"amount": 1500, "name": "Acme", "active": true, "gone": null}}"#,
        )
        .unwrap();
        assert_eq!(input.properties["amount"], "1500");
        assert_eq!(input.properties["name"], "Acme");
        assert_eq!(input.properties["active"], "true");
        assert_eq!(input.properties["gone"], "");
        assert!(input.associations.is_empty());
    }

    #[test]
    fn test_association_spec_accepts_upstream_names() {
        let spec: AssociationSpec = serde_json::from_str(
            r#"{"associationCategory": "USER_DEFINED", "associationTypeId": 42}"#,
        )
        .unwrap();
        assert_eq!(spec.category, AssociationCategory::UserDefined);
        assert_eq!(spec.type_id, 42);

        let json = serde_json::to_value(spec).unwrap();
        assert_eq!(json["category"], "USER_DEFINED");
        assert_eq!(json["typeId"], 42);
    }

    #[test]
    fn test_category_roundtrip() {
        for category in [AssociationCategory::HubspotDefined, AssociationCategory::UserDefined] {
            let parsed: AssociationCategory = category.as_str().parse().unwrap();
            assert_eq!(parsed, category);
        }
        assert!("SOMETHING".parse::<AssociationCategory>().is_err());
    }

    #[test]
    fn test_object_serialization_skips_internal_fields() {
        let object = CrmObject {
            id: "7".to_string(),
            properties: Properties::new(),
            properties_with_history: None,
            created_at: "2024-01-01T00:00:00.000Z".to_string(),
            updated_at: "2024-01-01T00:00:00.000Z".to_string(),
            archived: false,
            archived_at: None,
            object_type_id: "0-1".to_string(),
            merged_into_id: None,
        };
        let json = serde_json::to_value(&object).unwrap();
        assert_eq!(json["id"], "7");
        assert_eq!(json["createdAt"], "2024-01-01T00:00:00.000Z");
        assert!(json.get("archivedAt").is_none());
        assert!(json.get("objectTypeId").is_none());
        assert!(json.get("propertiesWithHistory").is_none());
    }
}
