//! Configuration emission.
//!
//! Turns table facts and resolved relationships into an ordered sequence of
//! metadata operations (incremental style) or one merged metadata document
//! (declarative style). Both styles share the relationship naming rule, so
//! either can be replayed against the same target consistently.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::resolve::RelationshipRecord;
use crate::schema::TableFact;

/// Positions step by 10 to leave room for manual insertion between
/// generated operations.
pub const POSITION_STEP: u32 = 10;

// ---------- wire commands ----------

/// A metadata API command, serialized to the exact Hasura wire shape
/// `{"type": ..., "args": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "args", rename_all = "snake_case")]
pub enum MetadataCommand {
    PgTrackTable(TrackTableArgs),
    PgCreateObjectRelationship(CreateRelationshipArgs),
    PgCreateArrayRelationship(CreateRelationshipArgs),
    PgCreateSelectPermission(CreateSelectPermissionArgs),
    /// Carries the full metadata object of a declarative replace.
    ReplaceMetadata(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackTableArgs {
    pub source: String,
    pub table: String,
    pub configuration: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRelationshipArgs {
    pub table: String,
    pub name: String,
    pub source: String,
    pub using: RelationshipUsing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipUsing {
    pub foreign_key_constraint_on: ForeignKeyOn,
}

/// Forward relationships name the foreign key column on the table itself;
/// backward relationships name the remote table and column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ForeignKeyOn {
    Column(String),
    Remote { table: String, columns: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSelectPermissionArgs {
    pub table: String,
    pub role: String,
    pub source: String,
    pub permission: SelectPermission,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectPermission {
    pub columns: Value,
    pub filter: Value,
    pub allow_aggregations: bool,
}

impl SelectPermission {
    /// The uniform default read policy: all columns, no filter,
    /// aggregations allowed.
    pub fn default_read() -> Self {
        Self {
            columns: json!("*"),
            filter: json!({}),
            allow_aggregations: true,
        }
    }
}

// ---------- operations ----------

/// An atomic, ordered configuration action. Positions are strictly
/// increasing and define total replay order; each operation is replayable
/// in isolation.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub position: u32,
    pub label: String,
    pub command: MetadataCommand,
}

#[derive(Debug)]
pub enum EmitError {
    /// The externally supplied base document is missing required structure.
    ConfigPreconditionFailed(String),
}

impl fmt::Display for EmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmitError::ConfigPreconditionFailed(msg) => {
                write!(f, "config precondition failed: {msg}")
            }
        }
    }
}

impl std::error::Error for EmitError {}

// ---------- naming ----------

/// Relationship entry as it appears in declarative table configuration.
#[derive(Debug, Clone, Serialize)]
pub struct RelationshipDef {
    pub name: String,
    pub using: RelationshipUsing,
}

/// The forward relationship: an object relationship on `from`, named after
/// `to`, over the foreign key column.
fn forward_def(rel: &RelationshipRecord) -> RelationshipDef {
    RelationshipDef {
        name: rel.to.clone(),
        using: RelationshipUsing {
            foreign_key_constraint_on: ForeignKeyOn::Column(rel.field.clone()),
        },
    }
}

/// The backward relationship on `to`: an object relationship named `from`
/// when one-to-one, else an array relationship named `from` pluralized.
fn backward_def(rel: &RelationshipRecord) -> RelationshipDef {
    let name = if rel.one_to_one {
        rel.from.clone()
    } else {
        format!("{}s", rel.from)
    };
    RelationshipDef {
        name,
        using: RelationshipUsing {
            foreign_key_constraint_on: ForeignKeyOn::Remote {
                table: rel.from.clone(),
                columns: rel.field.clone(),
            },
        },
    }
}

// ---------- incremental style ----------

pub fn emit_operations(
    cfg: &AppConfig,
    tables: &[TableFact],
    relationships: &[RelationshipRecord],
    with_permissions: bool,
) -> Vec<Operation> {
    let mut ops = Vec::new();
    let mut position = POSITION_STEP;
    let mut push = |ops: &mut Vec<Operation>, label: String, command: MetadataCommand| {
        ops.push(Operation {
            position,
            label,
            command,
        });
        position += POSITION_STEP;
    };

    for table in tables {
        push(
            &mut ops,
            table.name.clone(),
            MetadataCommand::PgTrackTable(TrackTableArgs {
                source: cfg.source.clone(),
                table: table.name.clone(),
                configuration: json!({}),
            }),
        );
    }

    for rel in relationships {
        let label = format!("{}-{}-{}", rel.from, rel.field, rel.to);

        let forward = forward_def(rel);
        push(
            &mut ops,
            format!("{label}-fwd"),
            MetadataCommand::PgCreateObjectRelationship(CreateRelationshipArgs {
                table: rel.from.clone(),
                name: forward.name,
                source: cfg.source.clone(),
                using: forward.using,
            }),
        );

        let backward = backward_def(rel);
        let args = CreateRelationshipArgs {
            table: rel.to.clone(),
            name: backward.name,
            source: cfg.source.clone(),
            using: backward.using,
        };
        let command = if rel.one_to_one {
            MetadataCommand::PgCreateObjectRelationship(args)
        } else {
            MetadataCommand::PgCreateArrayRelationship(args)
        };
        push(&mut ops, format!("{label}-bwd"), command);
    }

    if with_permissions {
        for table in tables {
            push(
                &mut ops,
                format!("{}-select-permission", table.name),
                MetadataCommand::PgCreateSelectPermission(CreateSelectPermissionArgs {
                    table: table.name.clone(),
                    role: cfg.unauthorized_role.clone(),
                    source: cfg.source.clone(),
                    permission: SelectPermission::default_read(),
                }),
            );
        }
    }

    ops
}

// ---------- declarative style ----------

#[derive(Debug, Serialize)]
struct QualifiedTable {
    schema: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct TableEntry {
    table: QualifiedTable,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    object_relationships: Vec<RelationshipDef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    array_relationships: Vec<RelationshipDef>,
    select_permissions: Vec<SelectPermissionEntry>,
}

#[derive(Debug, Serialize)]
struct SelectPermissionEntry {
    role: String,
    permission: SelectPermission,
}

#[derive(Default)]
struct TableRels {
    object: Vec<RelationshipDef>,
    array: Vec<RelationshipDef>,
}

/// Build the declarative metadata document: the generated table
/// configuration replaces the `tables` list of the configured source inside
/// the supplied base document. The base must already declare that source.
pub fn emit_metadata_document(
    cfg: &AppConfig,
    tables: &[TableFact],
    relationships: &[RelationshipRecord],
    base: &Value,
) -> Result<Value, EmitError> {
    let sources = base
        .get("metadata")
        .and_then(|m| m.get("sources"))
        .and_then(Value::as_array)
        .ok_or_else(|| {
            EmitError::ConfigPreconditionFailed(
                "base document has no metadata.sources list".to_string(),
            )
        })?;
    let source_idx = sources
        .iter()
        .position(|s| s.get("name").and_then(Value::as_str) == Some(cfg.source.as_str()))
        .ok_or_else(|| {
            EmitError::ConfigPreconditionFailed(format!(
                "base document declares no metadata source named {:?}",
                cfg.source
            ))
        })?;

    let known: HashSet<&str> = tables.iter().map(|t| t.name.as_str()).collect();
    let mut rels: HashMap<&str, TableRels> = HashMap::new();
    for rel in relationships {
        if known.contains(rel.from.as_str()) {
            rels.entry(rel.from.as_str())
                .or_default()
                .object
                .push(forward_def(rel));
        } else {
            tracing::warn!(table = %rel.from, "relationship references an untracked table, skipping forward side");
        }

        if known.contains(rel.to.as_str()) {
            let entry = rels.entry(rel.to.as_str()).or_default();
            let backward = backward_def(rel);
            if rel.one_to_one {
                entry.object.push(backward);
            } else {
                entry.array.push(backward);
            }
        } else {
            tracing::warn!(table = %rel.to, "relationship references an untracked table, skipping backward side");
        }
    }

    // Iterate tables in discovery order so output is reproducible.
    let entries: Vec<TableEntry> = tables
        .iter()
        .map(|table| {
            let table_rels = rels.remove(table.name.as_str()).unwrap_or_default();
            TableEntry {
                table: QualifiedTable {
                    schema: table.schema.clone(),
                    name: table.name.clone(),
                },
                object_relationships: table_rels.object,
                array_relationships: table_rels.array,
                select_permissions: vec![SelectPermissionEntry {
                    role: cfg.unauthorized_role.clone(),
                    permission: SelectPermission::default_read(),
                }],
            }
        })
        .collect();

    let entries_json = serde_json::to_value(entries)
        .map_err(|e| EmitError::ConfigPreconditionFailed(format!("serialization failed: {e}")))?;

    let mut doc = base.clone();
    doc["metadata"]["sources"][source_idx]["tables"] = entries_json;
    Ok(doc)
}
