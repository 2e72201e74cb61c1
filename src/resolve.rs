//! Relationship resolution.
//!
//! Folds raw constraint facts into canonical relationship records with
//! direction and cardinality decided: a foreign key is one-to-many unless an
//! independent unique constraint covers the same column (or the static model
//! declared it one-to-one).

use std::collections::HashMap;

use crate::schema::{ConstraintFact, ConstraintKind, SchemaError};

/// The identity column every foreign key is assumed to reference.
pub const IDENTITY_COLUMN: &str = "id";

/// A resolved foreign key relationship. `field` on `from` references the
/// identity column of `to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipRecord {
    pub from: String,
    pub field: String,
    pub to: String,
    pub one_to_one: bool,
}

/// Resolve constraint facts into relationship records, in first-seen order
/// of the underlying foreign keys.
pub fn resolve(facts: &[ConstraintFact]) -> Result<Vec<RelationshipRecord>, SchemaError> {
    let mut records: Vec<RelationshipRecord> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for fact in facts {
        let record = match fact {
            ConstraintFact::Declared {
                from,
                column,
                to,
                one_to_one,
            } => RelationshipRecord {
                from: from.clone(),
                field: column.clone(),
                to: to.clone(),
                one_to_one: *one_to_one,
            },
            ConstraintFact::Constraint(row) if row.kind == ConstraintKind::ForeignKey => {
                let ref_table = row.ref_table.clone().ok_or_else(|| {
                    SchemaError::AssumptionViolated(format!(
                        "foreign key {} on {}.{} has no referenced table",
                        row.constraint_name, row.table, row.column
                    ))
                })?;
                if row.ref_column.as_deref() != Some(IDENTITY_COLUMN) {
                    return Err(SchemaError::AssumptionViolated(format!(
                        "foreign key {} on {}.{} references {}.{} instead of the identity column",
                        row.constraint_name,
                        row.table,
                        row.column,
                        ref_table,
                        row.ref_column.as_deref().unwrap_or("?"),
                    )));
                }
                RelationshipRecord {
                    from: row.table.clone(),
                    field: row.column.clone(),
                    to: ref_table,
                    one_to_one: false,
                }
            }
            // Unique facts are handled in the second pass.
            ConstraintFact::Constraint(_) => continue,
        };

        let key = (record.from.clone(), record.field.clone());
        if index.contains_key(&key) {
            return Err(SchemaError::AssumptionViolated(format!(
                "duplicate foreign key fact for {}.{}",
                key.0, key.1
            )));
        }
        index.insert(key, records.len());
        records.push(record);
    }

    // A unique constraint covering a foreign key column makes the
    // relationship one-to-one. Unique facts without a matching foreign key
    // describe non-relational uniqueness and are ignored.
    for fact in facts {
        if let ConstraintFact::Constraint(row) = fact {
            if row.kind == ConstraintKind::Unique {
                if let Some(&i) = index.get(&(row.table.clone(), row.column.clone())) {
                    records[i].one_to_one = true;
                }
            }
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ConstraintRow;

    fn fk(table: &str, column: &str, ref_table: &str) -> ConstraintFact {
        ConstraintFact::Constraint(ConstraintRow {
            constraint_name: format!("{table}_{column}_fkey"),
            table: table.to_string(),
            kind: ConstraintKind::ForeignKey,
            column: column.to_string(),
            ref_table: Some(ref_table.to_string()),
            ref_column: Some("id".to_string()),
        })
    }

    fn unique(table: &str, column: &str) -> ConstraintFact {
        ConstraintFact::Constraint(ConstraintRow {
            constraint_name: format!("{table}_{column}_key"),
            table: table.to_string(),
            kind: ConstraintKind::Unique,
            column: column.to_string(),
            ref_table: None,
            ref_column: None,
        })
    }

    #[test]
    fn foreign_key_alone_is_many_to_one() {
        let records = resolve(&[fk("post", "author_id", "user")]).unwrap();
        assert_eq!(
            records,
            vec![RelationshipRecord {
                from: "post".to_string(),
                field: "author_id".to_string(),
                to: "user".to_string(),
                one_to_one: false,
            }]
        );
    }

    #[test]
    fn unique_constraint_flips_one_to_one() {
        let records =
            resolve(&[fk("post", "author_id", "user"), unique("post", "author_id")]).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].one_to_one);
    }

    #[test]
    fn unique_before_foreign_key_still_flips() {
        let records =
            resolve(&[unique("post", "author_id"), fk("post", "author_id", "user")]).unwrap();
        assert!(records[0].one_to_one);
    }

    #[test]
    fn lone_unique_constraint_is_ignored() {
        let records = resolve(&[unique("user", "email")]).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn declared_one_to_one_is_kept() {
        let facts = [ConstraintFact::Declared {
            from: "account_profile".to_string(),
            column: "account_id".to_string(),
            to: "account".to_string(),
            one_to_one: true,
        }];
        let records = resolve(&facts).unwrap();
        assert!(records[0].one_to_one);
    }

    #[test]
    fn duplicate_foreign_key_is_rejected() {
        let err = resolve(&[fk("post", "author_id", "user"), fk("post", "author_id", "user")])
            .unwrap_err();
        assert!(matches!(err, SchemaError::AssumptionViolated(_)));
        assert!(err.to_string().contains("post.author_id"));
    }

    #[test]
    fn non_identity_target_is_rejected() {
        let fact = ConstraintFact::Constraint(ConstraintRow {
            constraint_name: "post_author_email_fkey".to_string(),
            table: "post".to_string(),
            kind: ConstraintKind::ForeignKey,
            column: "author_email".to_string(),
            ref_table: Some("user".to_string()),
            ref_column: Some("email".to_string()),
        });
        let err = resolve(&[fact]).unwrap_err();
        assert!(matches!(err, SchemaError::AssumptionViolated(_)));
        assert!(err.to_string().contains("user.email"));
    }

    #[test]
    fn output_preserves_first_seen_order() {
        let records = resolve(&[
            fk("post", "author_id", "user"),
            fk("comment", "post_id", "post"),
            fk("comment", "author_id", "user"),
        ])
        .unwrap();
        let keys: Vec<(&str, &str)> = records
            .iter()
            .map(|r| (r.from.as_str(), r.field.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("post", "author_id"),
                ("comment", "post_id"),
                ("comment", "author_id"),
            ]
        );
    }
}
