//! Constraint validation.
//!
//! Row predicates and key uniqueness are checked against candidate
//! relation values before any mutation is recorded. Reporting follows
//! the original discipline: the first offending row (in deterministic
//! row order), then the first failing constraint on it (in name order).

use crate::algebra::{Relation, Row};
use crate::error::{Error, Result};
use crate::expr::{eval_predicate, Compiled, Scope};
use crate::namespace::Namespace;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Checks every row of `relation` against every predicate in
/// `constraints`.
///
/// An evaluation failure counts as the predicate not holding, and the
/// underlying cause is carried in the violation error.
pub(crate) fn check_rows(
    name: &str,
    relation: &Relation,
    constraints: &BTreeMap<String, Compiled>,
    ns: &Namespace,
    relations: Option<&dyn Fn(&str) -> Option<Relation>>,
) -> Result<()> {
    if constraints.is_empty() {
        return Ok(());
    }
    for row in relation.rows() {
        let scope = Scope {
            row: Some(row),
            relations,
            ns,
        };
        for (cname, compiled) in constraints {
            let (holds, cause) = match eval_predicate(compiled.expr(), &scope) {
                Ok(holds) => (holds, None),
                Err(err) => (false, Some(err.to_string())),
            };
            if !holds {
                return Err(Error::RowConstraintViolated {
                    relation: name.to_string(),
                    constraint: cname.clone(),
                    predicate: compiled.source().to_string(),
                    row: row.clone(),
                    cause,
                });
            }
        }
    }
    Ok(())
}

/// Checks that the projection of `relation` onto `key` is injective.
pub(crate) fn check_key(name: &str, relation: &Relation, key: &BTreeSet<String>) -> Result<()> {
    if key.is_empty() {
        return Ok(());
    }
    let names: Vec<&str> = key.iter().map(String::as_str).collect();
    let mut seen: HashSet<Row> = HashSet::with_capacity(relation.len());
    for row in relation.rows() {
        let projection = row.project(names.iter().copied());
        if !seen.insert(projection) {
            return Err(Error::KeyViolated {
                relation: name.to_string(),
                attrs: key.iter().cloned().collect(),
                row: row.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::AttrType;
    use crate::{header, row};

    fn marks() -> Relation {
        Relation::from_rows(
            header! { mark: AttrType::Int, student: AttrType::Text },
            [
                row! { mark: 85, student: "S1" },
                row! { mark: 49, student: "S2" },
            ],
        )
        .unwrap()
    }

    fn constraints(pairs: &[(&str, &str)]) -> BTreeMap<String, Compiled> {
        pairs
            .iter()
            .map(|(n, src)| (n.to_string(), Compiled::compile(*src).unwrap()))
            .collect()
    }

    #[test]
    fn satisfied_constraints_pass() {
        let ns = Namespace::new();
        let cs = constraints(&[("valid_mark", "0 <= mark <= 100")]);
        assert!(check_rows("exam_marks", &marks(), &cs, &ns, None).is_ok());
    }

    #[test]
    fn violation_names_first_offending_row_and_constraint() {
        let ns = Namespace::new();
        let cs = constraints(&[("valid_mark", "50 <= mark <= 100")]);
        let err = check_rows("exam_marks", &marks(), &cs, &ns, None).unwrap_err();
        match err {
            Error::RowConstraintViolated {
                relation,
                constraint,
                predicate,
                row,
                cause,
            } => {
                assert_eq!(relation, "exam_marks");
                assert_eq!(constraint, "valid_mark");
                assert_eq!(predicate, "50 <= mark <= 100");
                assert_eq!(row, row! { mark: 49, student: "S2" });
                assert!(cause.is_none());
            }
            other => panic!("expected RowConstraintViolated, got {other:?}"),
        }
    }

    #[test]
    fn constraints_check_in_name_order() {
        let ns = Namespace::new();
        let cs = constraints(&[("b_late", "mark < 0"), ("a_early", "mark > 1000")]);
        let err = check_rows("exam_marks", &marks(), &cs, &ns, None).unwrap_err();
        match err {
            Error::RowConstraintViolated { constraint, .. } => assert_eq!(constraint, "a_early"),
            other => panic!("expected RowConstraintViolated, got {other:?}"),
        }
    }

    #[test]
    fn evaluation_failure_counts_as_violation_with_cause() {
        let ns = Namespace::new();
        let cs = constraints(&[("broken", "missing_name == 1")]);
        let err = check_rows("exam_marks", &marks(), &cs, &ns, None).unwrap_err();
        match err {
            Error::RowConstraintViolated { cause, .. } => {
                assert!(cause.unwrap().contains("unknown name 'missing_name'"));
            }
            other => panic!("expected RowConstraintViolated, got {other:?}"),
        }
    }

    #[test]
    fn empty_key_always_passes() {
        assert!(check_key("r", &marks(), &BTreeSet::new()).is_ok());
    }

    #[test]
    fn unique_key_passes() {
        let key: BTreeSet<String> = ["student".to_string()].into();
        assert!(check_key("exam_marks", &marks(), &key).is_ok());
    }

    #[test]
    fn duplicate_projection_fails() {
        let rel = Relation::from_rows(
            header! { mark: AttrType::Int, student: AttrType::Text },
            [
                row! { mark: 85, student: "S1" },
                row! { mark: 49, student: "S1" },
            ],
        )
        .unwrap();
        let key: BTreeSet<String> = ["student".to_string()].into();
        let err = check_key("exam_marks", &rel, &key).unwrap_err();
        match err {
            Error::KeyViolated { relation, attrs, row } => {
                assert_eq!(relation, "exam_marks");
                assert_eq!(attrs, vec!["student".to_string()]);
                // The second row in deterministic order collides.
                assert_eq!(row, row! { mark: 85, student: "S1" });
            }
            other => panic!("expected KeyViolated, got {other:?}"),
        }
    }

    #[test]
    fn compound_key_checks_full_projection() {
        let rel = Relation::from_rows(
            header! { course: AttrType::Text, mark: AttrType::Int, student: AttrType::Text },
            [
                row! { course: "C1", mark: 85, student: "S1" },
                row! { course: "C2", mark: 49, student: "S1" },
            ],
        )
        .unwrap();
        let key: BTreeSet<String> = ["course".to_string(), "student".to_string()].into();
        assert!(check_key("exam_marks", &rel, &key).is_ok());
    }
}
