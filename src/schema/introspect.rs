//! Schema facts introspected from the live database through Hasura.
//!
//! Table listing goes through the `pg_get_source_tables` metadata command;
//! constraints come from one read-only `run_sql` over `information_schema`.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::client::GatewayClient;
use super::{
    ConstraintFact, ConstraintKind, ConstraintRow, SchemaError, SchemaSource, TableFact,
    MIGRATIONS_TABLE,
};

pub struct LiveIntrospectionSource {
    client: GatewayClient,
    source: String,
    db_schema: String,
}

impl LiveIntrospectionSource {
    pub fn new(client: GatewayClient, source: &str, db_schema: &str) -> Self {
        Self {
            client,
            source: source.to_string(),
            db_schema: db_schema.to_string(),
        }
    }

    fn constraint_sql(&self) -> String {
        format!(
            "SELECT tc.constraint_name, tc.table_name, tc.constraint_type, \
             kcu.column_name, ccu.table_name, ccu.column_name \
             FROM information_schema.table_constraints AS tc \
             JOIN information_schema.key_column_usage AS kcu \
             ON tc.constraint_name = kcu.constraint_name \
             AND tc.table_schema = kcu.table_schema \
             JOIN information_schema.constraint_column_usage AS ccu \
             ON ccu.constraint_name = tc.constraint_name \
             AND ccu.table_schema = tc.table_schema \
             WHERE tc.constraint_type IN ('FOREIGN KEY', 'UNIQUE') \
             AND tc.table_schema = '{}' \
             ORDER BY tc.table_name, kcu.column_name",
            self.db_schema.replace('\'', "''")
        )
    }
}

#[async_trait]
impl SchemaSource for LiveIntrospectionSource {
    async fn list_tables(&self) -> Result<Vec<TableFact>, SchemaError> {
        let command = json!({
            "type": "pg_get_source_tables",
            "args": { "source": self.source }
        });
        let resp = self
            .client
            .metadata(&command)
            .await
            .map_err(|e| SchemaError::SourceUnavailable(e.to_string()))?;

        let entries = resp.as_array().ok_or_else(|| {
            SchemaError::SourceUnavailable(format!(
                "unexpected pg_get_source_tables response: {resp}"
            ))
        })?;

        let mut tables = Vec::new();
        for entry in entries {
            let name = entry.get("name").and_then(Value::as_str);
            let schema = entry.get("schema").and_then(Value::as_str);
            let (Some(name), Some(schema)) = (name, schema) else {
                return Err(SchemaError::SourceUnavailable(format!(
                    "malformed table entry: {entry}"
                )));
            };
            if schema == self.db_schema && name != MIGRATIONS_TABLE {
                tables.push(TableFact {
                    name: name.to_string(),
                    schema: schema.to_string(),
                });
            }
        }
        Ok(tables)
    }

    async fn list_constraints(&self) -> Result<Vec<ConstraintFact>, SchemaError> {
        let rows = self
            .client
            .run_sql(&self.source, &self.constraint_sql())
            .await
            .map_err(|e| SchemaError::SourceUnavailable(e.to_string()))?;
        parse_constraint_rows(&rows)
    }
}

/// Map positional `run_sql` tuples to constraint facts. Column order matches
/// the SELECT list of [`LiveIntrospectionSource::constraint_sql`].
fn parse_constraint_rows(rows: &[Vec<String>]) -> Result<Vec<ConstraintFact>, SchemaError> {
    let mut facts = Vec::new();
    for row in rows {
        let [constraint_name, table, constraint_type, column, ref_table, ref_column] =
            row.as_slice()
        else {
            return Err(SchemaError::AssumptionViolated(format!(
                "constraint row has {} columns, expected 6: {row:?}",
                row.len()
            )));
        };

        let kind = match constraint_type.as_str() {
            "FOREIGN KEY" => ConstraintKind::ForeignKey,
            "UNIQUE" => ConstraintKind::Unique,
            other => {
                tracing::warn!(constraint = %constraint_name, kind = %other, "skipping constraint of unrequested kind");
                continue;
            }
        };

        // For unique constraints constraint_column_usage reports the
        // constrained column itself, not a reference.
        let (ref_table, ref_column) = match kind {
            ConstraintKind::ForeignKey => {
                (Some(ref_table.clone()), Some(ref_column.clone()))
            }
            ConstraintKind::Unique => (None, None),
        };

        facts.push(ConstraintFact::Constraint(ConstraintRow {
            constraint_name: constraint_name.clone(),
            table: table.clone(),
            kind,
            column: column.clone(),
            ref_table,
            ref_column,
        }));
    }
    Ok(facts)
}
