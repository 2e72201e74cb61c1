//! Schema fact extraction.
//!
//! A [`SchemaSource`] produces the raw facts the rest of the pipeline works
//! from: trackable tables and constraint records. Two implementations exist,
//! one reading the declarative model manifest and one introspecting the live
//! database through Hasura's query API.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;

use crate::client::GatewayClient;
use crate::config::AppConfig;

pub mod introspect;
pub mod static_model;

/// Bookkeeping table maintained by the migration runner; never tracked.
pub const MIGRATIONS_TABLE: &str = "migrations";

// ---------- facts ----------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFact {
    pub name: String,
    pub schema: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    ForeignKey,
    Unique,
}

/// A constraint row as reported by the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintRow {
    pub constraint_name: String,
    pub table: String,
    pub kind: ConstraintKind,
    pub column: String,
    pub ref_table: Option<String>,
    pub ref_column: Option<String>,
}

/// Raw relationship signal from a schema source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintFact {
    /// Association declared in the static model metadata. `column` is the
    /// foreign key column on `from`.
    Declared {
        from: String,
        column: String,
        to: String,
        one_to_one: bool,
    },
    /// Constraint row read from the live database.
    Constraint(ConstraintRow),
}

// ---------- errors ----------

#[derive(Debug)]
pub enum SchemaError {
    /// The backing model or database cannot be reached.
    SourceUnavailable(String),
    /// A structural assumption is broken; reported with the offending record.
    AssumptionViolated(String),
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::SourceUnavailable(msg) => {
                write!(f, "schema source unavailable: {msg}")
            }
            SchemaError::AssumptionViolated(msg) => {
                write!(f, "schema assumption violated: {msg}")
            }
        }
    }
}

impl std::error::Error for SchemaError {}

// ---------- trait ----------

#[async_trait]
pub trait SchemaSource {
    async fn list_tables(&self) -> Result<Vec<TableFact>, SchemaError>;

    async fn list_constraints(&self) -> Result<Vec<ConstraintFact>, SchemaError>;
}

// ---------- factory ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Static,
    Live,
}

pub fn create_source(
    kind: SourceKind,
    cfg: &AppConfig,
    model_path: &Path,
) -> Result<Box<dyn SchemaSource>, SchemaError> {
    match kind {
        SourceKind::Static => Ok(Box::new(static_model::StaticMetadataSource::load(
            model_path,
            &cfg.db_schema,
        )?)),
        SourceKind::Live => {
            let client = GatewayClient::new(cfg)
                .map_err(|e| SchemaError::SourceUnavailable(e.to_string()))?;
            Ok(Box::new(introspect::LiveIntrospectionSource::new(
                client,
                &cfg.source,
                &cfg.db_schema,
            )))
        }
    }
}
