//! End-to-end scenarios over the public API, built on a small course
//! database: students (`is_called`), enrolments (`is_enrolled_on`) and
//! `exam_marks`, with `CID`/`SID` domain types.

use reldb_core::{
    default_registry, header, AttrType, AttrValue, Database, Error, Header, Relation, Row,
};
use tempfile::tempdir;

fn register_types() {
    let mut registry = default_registry().write();
    registry.register_domain("CID", AttrType::Text).unwrap();
    registry.register_domain("SID", AttrType::Text).unwrap();
}

fn sid(s: &str) -> AttrValue {
    AttrValue::domain("SID", AttrValue::from(s))
}

fn cid(c: &str) -> AttrValue {
    AttrValue::domain("CID", AttrValue::from(c))
}

fn called_header() -> Header {
    header! { student: AttrType::Domain("SID".into()), name: AttrType::Text }
}

fn enrolled_header() -> Header {
    header! { student: AttrType::Domain("SID".into()), course: AttrType::Domain("CID".into()) }
}

fn marks_header() -> Header {
    header! {
        student: AttrType::Domain("SID".into()),
        course: AttrType::Domain("CID".into()),
        mark: AttrType::Int,
    }
}

fn called(s: &str, name: &str) -> Row {
    Row::new([("student", sid(s)), ("name", AttrValue::from(name))])
}

fn enrolled(s: &str, c: &str) -> Row {
    Row::new([("student", sid(s)), ("course", cid(c))])
}

fn mark(s: &str, c: &str, m: i64) -> Row {
    Row::new([
        ("student", sid(s)),
        ("course", cid(c)),
        ("mark", AttrValue::from(m)),
    ])
}

fn is_called() -> Relation {
    Relation::from_rows(
        called_header(),
        [
            called("S1", "Anne"),
            called("S2", "Boris"),
            called("S3", "Cindy"),
            called("S4", "Devinder"),
            called("S5", "Boris"),
        ],
    )
    .unwrap()
}

fn is_enrolled_on() -> Relation {
    Relation::from_rows(
        enrolled_header(),
        [
            enrolled("S1", "C1"),
            enrolled("S1", "C2"),
            enrolled("S2", "C1"),
            enrolled("S3", "C3"),
            enrolled("S4", "C1"),
            enrolled("S5", "C1"),
        ],
    )
    .unwrap()
}

fn exam_marks() -> Relation {
    Relation::from_rows(
        marks_header(),
        [
            mark("S1", "C1", 85),
            mark("S1", "C2", 49),
            mark("S1", "C3", 85),
            mark("S2", "C1", 49),
            mark("S3", "C3", 66),
            mark("S4", "C1", 93),
        ],
    )
    .unwrap()
}

/// The course database, fully loaded and constrained.
fn course_db() -> Database {
    register_types();
    let db = Database::open_in_memory().unwrap();
    db.set("is_called", is_called()).unwrap();
    db.set("is_enrolled_on", is_enrolled_on()).unwrap();
    db.set("exam_marks", exam_marks()).unwrap();
    db.constrain_rows("exam_marks", [("valid_mark", "0 <= mark <= 100")])
        .unwrap();
    db
}

// S1: create, persist, reopen.
#[test]
fn s1_create_and_persist() {
    register_types();
    let temp = tempdir().unwrap();
    let path = temp.path().join("course");

    {
        let db = Database::open(&path).unwrap();
        db.set("is_called", is_called()).unwrap();
        db.close().unwrap();
    }

    {
        let db = Database::open(&path).unwrap();
        let loaded = db.get("is_called").unwrap().value().unwrap();
        assert_eq!(loaded.len(), 5);
        assert_eq!(loaded, is_called());
        db.close().unwrap();
    }
}

// S2: a row constraint rejects an out-of-range assignment.
#[test]
fn s2_row_constraint_rejects_out_of_range() {
    let db = course_db();

    let mut bad_rows: Vec<Row> = exam_marks()
        .rows()
        .filter(|r| *r != &mark("S1", "C1", 85))
        .cloned()
        .collect();
    bad_rows.push(mark("S1", "C1", 102));
    let bad = Relation::from_rows(marks_header(), bad_rows).unwrap();

    let err = db.set("exam_marks", bad).unwrap_err();
    match err {
        Error::RowConstraintViolated {
            relation,
            constraint,
            predicate,
            row,
            ..
        } => {
            assert_eq!(relation, "exam_marks");
            assert_eq!(constraint, "valid_mark");
            assert_eq!(predicate, "0 <= mark <= 100");
            assert_eq!(row, mark("S1", "C1", 102));
        }
        other => panic!("expected RowConstraintViolated, got {other:?}"),
    }

    // Nothing changed.
    assert_eq!(db.get("exam_marks").unwrap().value().unwrap(), exam_marks());
}

// S3: tightening a constraint that current rows violate is rejected.
#[test]
fn s3_tightening_constraint_rejected() {
    let db = course_db();

    let err = db
        .constrain_rows("exam_marks", [("valid_mark", "50 <= mark <= 100")])
        .unwrap_err();
    match err {
        Error::RowConstraintViolated {
            constraint, row, ..
        } => {
            assert_eq!(constraint, "valid_mark");
            assert_eq!(row, mark("S2", "C1", 49));
        }
        other => panic!("expected RowConstraintViolated, got {other:?}"),
    }

    let constraints = db.row_constraints("exam_marks").unwrap();
    assert_eq!(constraints.len(), 1);
    assert_eq!(constraints["valid_mark"], "0 <= mark <= 100");
}

// S4: a committed transaction is visible and survives reopen.
#[test]
fn s4_transaction_commit_persists() {
    register_types();
    let temp = tempdir().unwrap();
    let path = temp.path().join("course");

    {
        let db = Database::open(&path).unwrap();
        db.set("is_called", is_called()).unwrap();
        db.set("is_enrolled_on", is_enrolled_on()).unwrap();
        db.set("exam_marks", exam_marks()).unwrap();
        db.constrain_rows("exam_marks", [("valid_mark", "0 <= mark <= 100")])
            .unwrap();

        db.transaction(|tx| {
            tx.get("exam_marks")?.insert(mark("S9", "C3", 87))?;
            tx.get("is_called")?.insert(called("S9", "Foo"))?;
            tx.get("is_enrolled_on")?.insert(enrolled("S9", "C3"))?;
            Ok(())
        })
        .unwrap();

        assert!(db
            .get("exam_marks")
            .unwrap()
            .value()
            .unwrap()
            .contains(&mark("S9", "C3", 87)));
        db.close().unwrap();
    }

    {
        let db = Database::open(&path).unwrap();
        assert!(db
            .get("exam_marks")
            .unwrap()
            .value()
            .unwrap()
            .contains(&mark("S9", "C3", 87)));
        assert!(db
            .get("is_called")
            .unwrap()
            .value()
            .unwrap()
            .contains(&called("S9", "Foo")));
        assert!(db
            .get("is_enrolled_on")
            .unwrap()
            .value()
            .unwrap()
            .contains(&enrolled("S9", "C3")));
        db.close().unwrap();
    }
}

// S5: an error inside a transaction rolls everything back and surfaces.
#[test]
fn s5_transaction_rolls_back_on_error() {
    let db = course_db();

    let result = db.transaction(|tx| {
        tx.get("is_called")?.insert(called("S8", "Foo"))?;
        // A failing statement: the relation does not exist.
        tx.get("no_such_relation")?;
        Ok(())
    });

    assert!(matches!(result, Err(Error::UnknownRelation { .. })));
    assert_eq!(db.get("is_called").unwrap().value().unwrap(), is_called());
}

// S6: nested transactions; the outer frame sees and commits inner changes.
#[test]
fn s6_nested_commit() {
    let db = course_db();

    db.transaction(|outer| {
        outer.get("is_called")?.insert(called("S6", "Ann"))?;
        outer.transaction(|inner| {
            inner.get("is_enrolled_on")?.insert(enrolled("S6", "C1"))?;
            Ok(())
        })?;
        // The outer frame sees the inner commit.
        assert!(outer
            .get("is_enrolled_on")?
            .value()?
            .contains(&enrolled("S6", "C1")));
        outer.get("exam_marks")?.insert(mark("S6", "C1", 71))?;
        Ok(())
    })
    .unwrap();

    assert!(db.get("is_called").unwrap().value().unwrap().contains(&called("S6", "Ann")));
    assert!(db
        .get("is_enrolled_on")
        .unwrap()
        .value()
        .unwrap()
        .contains(&enrolled("S6", "C1")));
    assert!(db
        .get("exam_marks")
        .unwrap()
        .value()
        .unwrap()
        .contains(&mark("S6", "C1", 71)));
}

// S7: an inner-frame constraint violation unwinds the whole nesting.
#[test]
fn s7_inner_error_rolls_entire_nesting_back() {
    let db = course_db();

    let result = db.transaction(|outer| {
        outer.get("is_called")?.insert(called("S6", "Ann"))?;
        outer.transaction(|inner| {
            inner.get("exam_marks")?.insert(mark("S6", "C1", 187))?;
            Ok(())
        })?;
        outer.get("is_enrolled_on")?.insert(enrolled("S6", "C1"))?;
        Ok(())
    });

    assert!(matches!(result, Err(Error::RowConstraintViolated { .. })));
    assert_eq!(db.get("is_called").unwrap().value().unwrap(), is_called());
    assert_eq!(
        db.get("is_enrolled_on").unwrap().value().unwrap(),
        is_enrolled_on()
    );
    assert_eq!(db.get("exam_marks").unwrap().value().unwrap(), exam_marks());
}

// S8: an explicit inner rollback leaves the outer frame intact.
#[test]
fn s8_inner_rollback_is_local() {
    let db = course_db();

    db.transaction(|outer| {
        outer.get("is_called")?.insert(called("S7", "Foo"))?;
        outer.transaction(|inner| {
            inner.get("exam_marks")?.insert(mark("S7", "C3", 87))?;
            Err(Error::Rollback)
        })?;
        outer.get("is_enrolled_on")?.insert(enrolled("S7", "C3"))?;
        Ok(())
    })
    .unwrap();

    assert!(db
        .get("is_called")
        .unwrap()
        .value()
        .unwrap()
        .contains(&called("S7", "Foo")));
    assert!(db
        .get("is_enrolled_on")
        .unwrap()
        .value()
        .unwrap()
        .contains(&enrolled("S7", "C3")));
    assert!(!db
        .get("exam_marks")
        .unwrap()
        .value()
        .unwrap()
        .contains(&mark("S7", "C3", 87)));
}

// Update right-hand sides may call domain constructors.
#[test]
fn update_with_constructor_coercion() {
    let db = course_db();
    let marks = db.get("exam_marks").unwrap();

    marks
        .update("student == SID('S2') and course == CID('C1')", &[("mark", "mark + 1")])
        .unwrap();
    assert!(marks.value().unwrap().contains(&mark("S2", "C1", 50)));

    // A text result coerces into the declared CID domain.
    marks
        .update("student == SID('S2')", &[("course", "'C9'")])
        .unwrap();
    assert!(marks.value().unwrap().contains(&mark("S2", "C9", 50)));
}

// Algebra over handle values: who is enrolled but has no mark yet?
#[test]
fn algebra_over_handle_values() {
    let db = course_db();
    let enrolled_rel = db.get("is_enrolled_on").unwrap().value().unwrap();
    let marks_rel = db.get("exam_marks").unwrap().value().unwrap();

    let unmarked = enrolled_rel.not_matching(&marks_rel).unwrap();
    assert_eq!(unmarked.len(), 1);
    assert!(unmarked.contains(&enrolled("S5", "C1")));

    let joined = enrolled_rel.matching(&marks_rel).unwrap();
    assert_eq!(joined.union(&unmarked).unwrap(), enrolled_rel);
}
