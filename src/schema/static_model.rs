//! Schema facts derived from the declarative model manifest.

use std::path::Path;

use async_trait::async_trait;
use inflector::Inflector;

use crate::model::{self, Model, RelationKind};
use super::{ConstraintFact, SchemaError, SchemaSource, TableFact, MIGRATIONS_TABLE};

pub struct StaticMetadataSource {
    model: Model,
    db_schema: String,
}

impl StaticMetadataSource {
    pub fn new(model: Model, db_schema: impl Into<String>) -> Self {
        Self {
            model,
            db_schema: db_schema.into(),
        }
    }

    pub fn load(path: &Path, db_schema: &str) -> Result<Self, SchemaError> {
        let model =
            model::load_model(path).map_err(|e| SchemaError::SourceUnavailable(e.to_string()))?;
        Ok(Self::new(model, db_schema))
    }
}

/// Canonical table name for an entity type name, e.g. `BlockHeader` to
/// `block_header`.
fn table_name(entity: &str) -> String {
    entity.to_snake_case()
}

/// Foreign key column backing a declared relation property.
fn fk_column(property: &str) -> String {
    format!("{}_id", property.to_snake_case())
}

#[async_trait]
impl SchemaSource for StaticMetadataSource {
    async fn list_tables(&self) -> Result<Vec<TableFact>, SchemaError> {
        Ok(self
            .model
            .entities
            .iter()
            .map(|e| TableFact {
                name: table_name(&e.name),
                schema: self.db_schema.clone(),
            })
            .filter(|t| t.name != MIGRATIONS_TABLE)
            .collect())
    }

    async fn list_constraints(&self) -> Result<Vec<ConstraintFact>, SchemaError> {
        let mut out = Vec::new();
        for entity in &self.model.entities {
            for rel in &entity.relations {
                match rel.kind {
                    RelationKind::ManyToOne => out.push(ConstraintFact::Declared {
                        from: table_name(&entity.name),
                        column: fk_column(&rel.name),
                        to: table_name(&rel.target),
                        one_to_one: false,
                    }),
                    // A one-to-one relation holds the foreign key on the side
                    // that declares no inverse property; the inverse side is
                    // derived and must not emit the same physical relation twice.
                    RelationKind::OneToOne if rel.inverse.is_none() => {
                        out.push(ConstraintFact::Declared {
                            from: table_name(&entity.name),
                            column: fk_column(&rel.name),
                            to: table_name(&rel.target),
                            one_to_one: true,
                        })
                    }
                    // One-to-many relations are derived from the many-to-one side.
                    RelationKind::OneToOne | RelationKind::OneToMany => {}
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityDef, RelationDef};

    fn manifest() -> Model {
        Model {
            entities: vec![
                EntityDef {
                    name: "Account".to_string(),
                    relations: vec![RelationDef {
                        name: "transfers".to_string(),
                        target: "Transfer".to_string(),
                        kind: RelationKind::OneToMany,
                        inverse: Some("from".to_string()),
                    }],
                },
                EntityDef {
                    name: "Transfer".to_string(),
                    relations: vec![RelationDef {
                        name: "from".to_string(),
                        target: "Account".to_string(),
                        kind: RelationKind::ManyToOne,
                        inverse: None,
                    }],
                },
                EntityDef {
                    name: "AccountProfile".to_string(),
                    relations: vec![RelationDef {
                        name: "account".to_string(),
                        target: "Account".to_string(),
                        kind: RelationKind::OneToOne,
                        inverse: None,
                    }],
                },
                EntityDef {
                    name: "Migrations".to_string(),
                    relations: vec![],
                },
            ],
        }
    }

    #[tokio::test]
    async fn tables_are_snake_cased_and_migrations_excluded() {
        let source = StaticMetadataSource::new(manifest(), "public");
        let tables = source.list_tables().await.unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["account", "transfer", "account_profile"]);
        assert!(tables.iter().all(|t| t.schema == "public"));
    }

    #[tokio::test]
    async fn derived_relation_sides_are_skipped() {
        let source = StaticMetadataSource::new(manifest(), "public");
        let facts = source.list_constraints().await.unwrap();
        // The one-to-many on Account is derived; only the many-to-one on
        // Transfer and the one-to-one on AccountProfile survive.
        assert_eq!(
            facts,
            vec![
                ConstraintFact::Declared {
                    from: "transfer".to_string(),
                    column: "from_id".to_string(),
                    to: "account".to_string(),
                    one_to_one: false,
                },
                ConstraintFact::Declared {
                    from: "account_profile".to_string(),
                    column: "account_id".to_string(),
                    to: "account".to_string(),
                    one_to_one: true,
                },
            ]
        );
    }

    #[tokio::test]
    async fn one_to_one_with_inverse_is_not_emitted() {
        let model = Model {
            entities: vec![EntityDef {
                name: "Account".to_string(),
                relations: vec![RelationDef {
                    name: "profile".to_string(),
                    target: "AccountProfile".to_string(),
                    kind: RelationKind::OneToOne,
                    inverse: Some("account".to_string()),
                }],
            }],
        };
        let source = StaticMetadataSource::new(model, "public");
        assert!(source.list_constraints().await.unwrap().is_empty());
    }
}
