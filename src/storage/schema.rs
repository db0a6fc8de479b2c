//! Database schema definitions

/// SQL to create the object_types table
pub const CREATE_OBJECT_TYPES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS object_types (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    label_singular TEXT NOT NULL,
    label_plural TEXT NOT NULL,
    primary_display_property TEXT,
    required_properties TEXT NOT NULL DEFAULT '[]',
    is_custom INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// SQL to create the objects table
pub const CREATE_OBJECTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS objects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    object_type_id TEXT NOT NULL REFERENCES object_types(id),
    archived INTEGER NOT NULL DEFAULT 0,
    archived_at TEXT,
    merged_into_id INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// SQL to create the property_values table
/// Last-write-wins cell per (object, property)
pub const CREATE_PROPERTY_VALUES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS property_values (
    object_id INTEGER NOT NULL REFERENCES objects(id),
    property_name TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (object_id, property_name)
)
"#;

/// SQL to create the property_value_history table (append-only)
pub const CREATE_PROPERTY_HISTORY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS property_value_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    object_id INTEGER NOT NULL,
    property_name TEXT NOT NULL,
    value TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    source_type TEXT NOT NULL DEFAULT 'API'
)
"#;

/// SQL to create the association_types table
pub const CREATE_ASSOCIATION_TYPES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS association_types (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    from_object_type_id TEXT NOT NULL,
    to_object_type_id TEXT NOT NULL,
    category TEXT NOT NULL,
    label TEXT,
    name TEXT
)
"#;

/// SQL to create the associations table
pub const CREATE_ASSOCIATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS associations (
    from_object_id INTEGER NOT NULL,
    to_object_id INTEGER NOT NULL,
    association_type_id INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(from_object_id, to_object_id, association_type_id)
)
"#;

/// SQL to create the property_groups table
pub const CREATE_PROPERTY_GROUPS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS property_groups (
    object_type_id TEXT NOT NULL,
    name TEXT NOT NULL,
    label TEXT NOT NULL,
    display_order INTEGER NOT NULL DEFAULT -1,
    archived INTEGER NOT NULL DEFAULT 0,
    UNIQUE(object_type_id, name)
)
"#;

/// SQL to create the property_definitions table
pub const CREATE_PROPERTY_DEFINITIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS property_definitions (
    object_type_id TEXT NOT NULL,
    name TEXT NOT NULL,
    label TEXT NOT NULL,
    type TEXT NOT NULL,
    field_type TEXT NOT NULL,
    group_name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    options TEXT NOT NULL DEFAULT '[]',
    display_order INTEGER NOT NULL DEFAULT -1,
    hidden INTEGER NOT NULL DEFAULT 0,
    has_unique_value INTEGER NOT NULL DEFAULT 0,
    hubspot_defined INTEGER NOT NULL DEFAULT 0,
    archived INTEGER NOT NULL DEFAULT 0,
    archived_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(object_type_id, name)
)
"#;

/// SQL to create the pipelines table
pub const CREATE_PIPELINES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS pipelines (
    id TEXT PRIMARY KEY,
    object_type_id TEXT NOT NULL,
    label TEXT NOT NULL,
    display_order INTEGER NOT NULL DEFAULT 0,
    archived INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// SQL to create the pipeline_stages table
pub const CREATE_PIPELINE_STAGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS pipeline_stages (
    id TEXT PRIMARY KEY,
    pipeline_id TEXT NOT NULL REFERENCES pipelines(id),
    label TEXT NOT NULL,
    display_order INTEGER NOT NULL DEFAULT 0,
    metadata TEXT NOT NULL DEFAULT '{}',
    archived INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// SQL to create the owners table
pub const CREATE_OWNERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS owners (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL,
    first_name TEXT NOT NULL DEFAULT '',
    last_name TEXT NOT NULL DEFAULT '',
    user_id INTEGER,
    archived INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// SQL to create the lists table
pub const CREATE_LISTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS lists (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    object_type_id TEXT NOT NULL,
    processing_type TEXT NOT NULL DEFAULT 'MANUAL',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// SQL to create the list_memberships table
pub const CREATE_LIST_MEMBERSHIPS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS list_memberships (
    list_id INTEGER NOT NULL REFERENCES lists(id),
    object_id INTEGER NOT NULL,
    added_at TEXT NOT NULL,
    PRIMARY KEY (list_id, object_id)
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_objects_type ON objects(object_type_id, archived, id)",
    "CREATE INDEX IF NOT EXISTS idx_property_values_name ON property_values(property_name, value)",
    "CREATE INDEX IF NOT EXISTS idx_history_object ON property_value_history(object_id, property_name)",
    "CREATE INDEX IF NOT EXISTS idx_association_types_pair ON association_types(from_object_type_id, to_object_type_id)",
    "CREATE INDEX IF NOT EXISTS idx_associations_from ON associations(from_object_id)",
    "CREATE INDEX IF NOT EXISTS idx_associations_to ON associations(to_object_id)",
    "CREATE INDEX IF NOT EXISTS idx_stages_pipeline ON pipeline_stages(pipeline_id)",
    "CREATE INDEX IF NOT EXISTS idx_owners_email ON owners(email)",
];

/// Tables in dependency order, children first. Used when wiping data.
pub const ALL_TABLES: &[&str] = &[
    "list_memberships",
    "lists",
    "owners",
    "pipeline_stages",
    "pipelines",
    "property_definitions",
    "property_groups",
    "associations",
    "association_types",
    "property_value_history",
    "property_values",
    "objects",
    "object_types",
];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_OBJECT_TYPES_TABLE,
        CREATE_OBJECTS_TABLE,
        CREATE_PROPERTY_VALUES_TABLE,
        CREATE_PROPERTY_HISTORY_TABLE,
        CREATE_ASSOCIATION_TYPES_TABLE,
        CREATE_ASSOCIATIONS_TABLE,
        CREATE_PROPERTY_GROUPS_TABLE,
        CREATE_PROPERTY_DEFINITIONS_TABLE,
        CREATE_PIPELINES_TABLE,
        CREATE_PIPELINE_STAGES_TABLE,
        CREATE_OWNERS_TABLE,
        CREATE_LISTS_TABLE,
        CREATE_LIST_MEMBERSHIPS_TABLE,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
