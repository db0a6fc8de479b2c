//! Built-in seed data: standard object types, their association types,
//! core property definitions and the default pipelines.

use rusqlite::{Connection, params};

use crate::Result;
use crate::model::now_timestamp;

/// (id, name, singular, plural, primary display property)
const BUILTIN_TYPES: &[(&str, &str, &str, &str, &str)] = &[
    ("0-1", "contacts", "Contact", "Contacts", "email"),
    ("0-2", "companies", "Company", "Companies", "name"),
    ("0-3", "deals", "Deal", "Deals", "dealname"),
    ("0-5", "tickets", "Ticket", "Tickets", "subject"),
    ("0-7", "products", "Product", "Products", "name"),
    ("0-8", "line_items", "Line item", "Line items", "name"),
    ("0-14", "quotes", "Quote", "Quotes", "hs_title"),
    ("0-27", "tasks", "Task", "Tasks", "hs_task_subject"),
    ("0-46", "notes", "Note", "Notes", "hs_note_body"),
    ("0-47", "meetings", "Meeting", "Meetings", "hs_meeting_title"),
    ("0-48", "calls", "Call", "Calls", "hs_call_title"),
    ("0-49", "emails", "Email", "Emails", "hs_email_subject"),
];

/// (type id, from type, to type, label). Unlabelled rows are the pair defaults.
const BUILTIN_ASSOCIATION_TYPES: &[(i64, &str, &str, Option<&str>)] = &[
    (1, "0-1", "0-2", Some("Primary")),
    (2, "0-2", "0-1", Some("Primary")),
    (3, "0-3", "0-1", None),
    (4, "0-1", "0-3", None),
    (5, "0-3", "0-2", Some("Primary")),
    (6, "0-2", "0-3", Some("Primary")),
    (15, "0-1", "0-5", None),
    (16, "0-5", "0-1", None),
    (19, "0-3", "0-8", None),
    (20, "0-8", "0-3", None),
    (25, "0-2", "0-5", Some("Primary")),
    (26, "0-5", "0-2", Some("Primary")),
    (27, "0-3", "0-5", None),
    (28, "0-5", "0-3", None),
    (63, "0-3", "0-14", None),
    (64, "0-14", "0-3", None),
    (181, "0-2", "0-48", None),
    (182, "0-48", "0-2", None),
    (185, "0-2", "0-49", None),
    (186, "0-49", "0-2", None),
    (187, "0-2", "0-47", None),
    (188, "0-47", "0-2", None),
    (189, "0-2", "0-46", None),
    (190, "0-46", "0-2", None),
    (191, "0-2", "0-27", None),
    (192, "0-27", "0-2", None),
    (193, "0-1", "0-48", None),
    (194, "0-48", "0-1", None),
    (197, "0-1", "0-49", None),
    (198, "0-49", "0-1", None),
    (199, "0-1", "0-47", None),
    (200, "0-47", "0-1", None),
    (201, "0-1", "0-46", None),
    (202, "0-46", "0-1", None),
    (203, "0-1", "0-27", None),
    (204, "0-27", "0-1", None),
    (205, "0-3", "0-48", None),
    (206, "0-48", "0-3", None),
    (209, "0-3", "0-49", None),
    (210, "0-49", "0-3", None),
    (211, "0-3", "0-47", None),
    (212, "0-47", "0-3", None),
    (213, "0-3", "0-46", None),
    (214, "0-46", "0-3", None),
    (215, "0-3", "0-27", None),
    (216, "0-27", "0-3", None),
    (279, "0-1", "0-2", None),
    (280, "0-2", "0-1", None),
    (339, "0-5", "0-2", None),
    (340, "0-2", "0-5", None),
    (341, "0-3", "0-2", None),
    (342, "0-2", "0-3", None),
];

/// (type id, name, label, type, field type, group)
const BUILTIN_PROPERTIES: &[(&str, &str, &str, &str, &str, &str)] = &[
    ("0-1", "firstname", "First Name", "string", "text", "contactinformation"),
    ("0-1", "lastname", "Last Name", "string", "text", "contactinformation"),
    ("0-1", "email", "Email", "string", "text", "contactinformation"),
    ("0-1", "phone", "Phone Number", "string", "phonenumber", "contactinformation"),
    ("0-1", "company", "Company Name", "string", "text", "contactinformation"),
    ("0-1", "lifecyclestage", "Lifecycle Stage", "enumeration", "radio", "contactinformation"),
    ("0-2", "name", "Company name", "string", "text", "companyinformation"),
    ("0-2", "domain", "Company Domain Name", "string", "text", "companyinformation"),
    ("0-2", "industry", "Industry", "string", "text", "companyinformation"),
    ("0-2", "city", "City", "string", "text", "companyinformation"),
    ("0-3", "dealname", "Deal Name", "string", "text", "dealinformation"),
    ("0-3", "amount", "Amount", "number", "number", "dealinformation"),
    ("0-3", "dealstage", "Deal Stage", "enumeration", "radio", "dealinformation"),
    ("0-3", "pipeline", "Pipeline", "enumeration", "select", "dealinformation"),
    ("0-3", "closedate", "Close Date", "datetime", "date", "dealinformation"),
    ("0-5", "subject", "Ticket name", "string", "text", "ticketinformation"),
    ("0-5", "content", "Ticket description", "string", "textarea", "ticketinformation"),
    ("0-5", "hs_pipeline", "Pipeline", "enumeration", "select", "ticketinformation"),
    ("0-5", "hs_pipeline_stage", "Ticket status", "enumeration", "radio", "ticketinformation"),
    ("0-7", "name", "Name", "string", "text", "productinformation"),
    ("0-7", "price", "Unit price", "number", "number", "productinformation"),
    ("0-8", "name", "Name", "string", "text", "lineiteminformation"),
    ("0-8", "quantity", "Quantity", "number", "number", "lineiteminformation"),
    ("0-8", "price", "Unit price", "number", "number", "lineiteminformation"),
];

/// Properties every type carries, written by the object store itself.
const SYSTEM_PROPERTIES: &[(&str, &str, &str, &str)] = &[
    ("hs_object_id", "Record ID", "number", "number"),
    ("createdate", "Create Date", "datetime", "date"),
    ("lastmodifieddate", "Last Modified Date", "datetime", "date"),
    ("hs_createdate", "Object create date/time", "datetime", "date"),
    ("hs_lastmodifieddate", "Object last modified date/time", "datetime", "date"),
    ("hs_object_source", "Record source", "string", "text"),
    ("hs_merged_object_ids", "Merged Record IDs", "enumeration", "checkbox"),
];

/// (pipeline id, type id, label, stages as (stage id, label, metadata json))
const BUILTIN_PIPELINES: &[(&str, &str, &str, &[(&str, &str, &str)])] = &[
    (
        "default",
        "0-3",
        "Sales Pipeline",
        &[
            ("appointmentscheduled", "Appointment Scheduled", r#"{"probability":"0.2"}"#),
            ("qualifiedtobuy", "Qualified To Buy", r#"{"probability":"0.4"}"#),
            ("presentationscheduled", "Presentation Scheduled", r#"{"probability":"0.6"}"#),
            ("decisionmakerboughtin", "Decision Maker Bought-In", r#"{"probability":"0.8"}"#),
            ("contractsent", "Contract Sent", r#"{"probability":"0.9"}"#),
            ("closedwon", "Closed Won", r#"{"isClosed":"true","probability":"1.0"}"#),
            ("closedlost", "Closed Lost", r#"{"isClosed":"true","probability":"0.0"}"#),
        ],
    ),
    (
        "0",
        "0-5",
        "Support Pipeline",
        &[
            ("1", "New", r#"{"ticketState":"OPEN"}"#),
            ("2", "Waiting on contact", r#"{"ticketState":"OPEN"}"#),
            ("3", "Waiting on us", r#"{"ticketState":"OPEN"}"#),
            ("4", "Closed", r#"{"ticketState":"CLOSED"}"#),
        ],
    ),
];

/// True when no object types exist yet
pub fn is_empty(conn: &Connection) -> Result<bool> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM object_types", [], |row| row.get(0))?;
    Ok(count == 0)
}

/// Insert all built-in data
pub fn seed_builtin(conn: &Connection) -> Result<()> {
    let now = now_timestamp();

    for (id, name, singular, plural, display) in BUILTIN_TYPES {
        conn.execute(
            r#"
            INSERT OR IGNORE INTO object_types
                (id, name, label_singular, label_plural, primary_display_property, is_custom, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)
            "#,
            params![id, name, singular, plural, display, now],
        )?;
    }

    for (id, from, to, label) in BUILTIN_ASSOCIATION_TYPES {
        conn.execute(
            r#"
            INSERT OR IGNORE INTO association_types (id, from_object_type_id, to_object_type_id, category, label)
            VALUES (?1, ?2, ?3, 'HUBSPOT_DEFINED', ?4)
            "#,
            params![id, from, to, label],
        )?;
    }

    for (type_id, ..) in BUILTIN_TYPES {
        seed_system_properties(conn, type_id, &now)?;
    }

    for (type_id, name, label, kind, field_type, group) in BUILTIN_PROPERTIES {
        insert_group_if_missing(conn, type_id, group)?;
        conn.execute(
            r#"
            INSERT OR IGNORE INTO property_definitions
                (object_type_id, name, label, type, field_type, group_name, hubspot_defined, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)
            "#,
            params![type_id, name, label, kind, field_type, group, now],
        )?;
    }

    for (pipeline_id, type_id, label, stages) in BUILTIN_PIPELINES {
        conn.execute(
            r#"
            INSERT OR IGNORE INTO pipelines (id, object_type_id, label, display_order, created_at, updated_at)
            VALUES (?1, ?2, ?3, 0, ?4, ?4)
            "#,
            params![pipeline_id, type_id, label, now],
        )?;
        for (order, (stage_id, stage_label, metadata)) in stages.iter().enumerate() {
            conn.execute(
                r#"
                INSERT OR IGNORE INTO pipeline_stages (id, pipeline_id, label, display_order, metadata, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                "#,
                params![stage_id, pipeline_id, stage_label, order as i64, metadata, now],
            )?;
        }
    }

    tracing::debug!(
        types = BUILTIN_TYPES.len(),
        association_types = BUILTIN_ASSOCIATION_TYPES.len(),
        "seeded built-in data"
    );
    Ok(())
}

/// Register the store-managed properties for a type (also used for custom types)
pub fn seed_system_properties(conn: &Connection, type_id: &str, now: &str) -> Result<()> {
    insert_group_if_missing(conn, type_id, "systeminformation")?;
    for (name, label, kind, field_type) in SYSTEM_PROPERTIES {
        conn.execute(
            r#"
            INSERT OR IGNORE INTO property_definitions
                (object_type_id, name, label, type, field_type, group_name, hubspot_defined, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 'systeminformation', 1, ?6, ?6)
            "#,
            params![type_id, name, label, kind, field_type, now],
        )?;
    }
    Ok(())
}

fn insert_group_if_missing(conn: &Connection, type_id: &str, group: &str) -> Result<()> {
    let label = group_label(group);
    conn.execute(
        "INSERT OR IGNORE INTO property_groups (object_type_id, name, label) VALUES (?1, ?2, ?3)",
        params![type_id, group, label],
    )?;
    Ok(())
}

fn group_label(group: &str) -> String {
    match group {
        "contactinformation" => "Contact information".to_string(),
        "companyinformation" => "Company information".to_string(),
        "dealinformation" => "Deal information".to_string(),
        "ticketinformation" => "Ticket information".to_string(),
        "productinformation" => "Product information".to_string(),
        "lineiteminformation" => "Line item information".to_string(),
        "systeminformation" => "System information".to_string(),
        other => other.to_string(),
    }
}
