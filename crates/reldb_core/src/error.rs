//! Error types for the engine.

use crate::algebra::{AttrType, Header, Row};
use crate::expr::ExprError;
use reldb_codec::CodecError;
use reldb_storage::StoreError;
use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Operation on a closed database, or through a handle that outlived
    /// its session.
    #[error("database is disconnected")]
    Disconnected,

    /// A relation name is not acceptable to the catalog.
    #[error("invalid relation name {name:?}: {reason}")]
    NameInvalid {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An operation named a relation absent from the catalog.
    #[error("unknown relation {name:?}")]
    UnknownRelation {
        /// The missing relation name.
        name: String,
    },

    /// A removal named a constraint absent from the relation.
    #[error("relation {relation:?} has no row constraint named {name:?}")]
    UnknownConstraint {
        /// The relation searched.
        relation: String,
        /// The missing constraint name.
        name: String,
    },

    /// An operation named an attribute absent from the relation's header.
    #[error("relation {relation:?} has no attribute {attr:?}")]
    UnknownAttribute {
        /// The relation searched.
        relation: String,
        /// The missing attribute name.
        attr: String,
    },

    /// An assigned value's header differs from the target's header.
    #[error("header mismatch on {relation:?}: expected {expected}, got {actual}")]
    HeaderMismatch {
        /// The target relation.
        relation: String,
        /// The declared header.
        expected: Header,
        /// The header of the rejected value.
        actual: Header,
    },

    /// An assigned value is not a relation value at all.
    #[error("cannot assign {actual} to relation {relation:?}")]
    TypeMismatch {
        /// The target relation.
        relation: String,
        /// Description of what was actually supplied.
        actual: String,
    },

    /// An expression produced a value outside an attribute's declared type.
    #[error("attribute {attr:?} of {relation:?} expects {expected}, got {actual}")]
    AttrTypeMismatch {
        /// The relation being mutated.
        relation: String,
        /// The attribute name.
        attr: String,
        /// The declared attribute type.
        expected: AttrType,
        /// The type of the produced value.
        actual: AttrType,
    },

    /// A row predicate would be violated.
    #[error(
        "{relation} constraint {constraint} violated: {predicate:?} is not satisfied by {row}{}",
        cause_suffix(.cause)
    )]
    RowConstraintViolated {
        /// The constrained relation.
        relation: String,
        /// Name of the violated constraint.
        constraint: String,
        /// The predicate source text.
        predicate: String,
        /// The offending row.
        row: Row,
        /// Underlying evaluation failure, when the predicate did not
        /// evaluate cleanly to false.
        cause: Option<String>,
    },

    /// A key declaration would be violated.
    #[error(
        "key {{{}}} of {relation} violated: duplicate projection for {row}",
        .attrs.join(", ")
    )]
    KeyViolated {
        /// The keyed relation.
        relation: String,
        /// The key attributes.
        attrs: Vec<String>,
        /// A row whose key projection collides with another row's.
        row: Row,
    },

    /// A supplied predicate cannot be represented as stored source text.
    #[error("predicate for constraint {name:?} cannot be stored as source text")]
    PredicateNotSerializable {
        /// The constraint the predicate was supplied for.
        name: String,
    },

    /// The store rejected a transaction flush.
    #[error("commit failed: {source}")]
    CommitFailed {
        /// The store-level failure.
        #[source]
        source: StoreError,
    },

    /// Control signal discarding the innermost transaction frame.
    ///
    /// Returned from a `transaction` block to roll that frame back;
    /// absorbed by the frame, never seen outside it.
    #[error("transaction rolled back")]
    Rollback,

    /// Storage backend error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Expression parse or evaluation error.
    #[error("expression error: {0}")]
    Expr(#[from] ExprError),
}

fn cause_suffix(cause: &Option<String>) -> String {
    match cause {
        Some(cause) => format!(" ({cause})"),
        None => String::new(),
    }
}

impl Error {
    /// Creates a name-invalid error.
    pub fn name_invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NameInvalid {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates an unknown-relation error.
    pub fn unknown_relation(name: impl Into<String>) -> Self {
        Self::UnknownRelation { name: name.into() }
    }

    /// Creates an unknown-constraint error.
    pub fn unknown_constraint(relation: impl Into<String>, name: impl Into<String>) -> Self {
        Self::UnknownConstraint {
            relation: relation.into(),
            name: name.into(),
        }
    }

    /// Creates an unknown-attribute error.
    pub fn unknown_attribute(relation: impl Into<String>, attr: impl Into<String>) -> Self {
        Self::UnknownAttribute {
            relation: relation.into(),
            attr: attr.into(),
        }
    }

    /// True for errors that leave the target untouched and carry no
    /// transaction consequences beyond the failed operation.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NameInvalid { .. }
                | Self::UnknownRelation { .. }
                | Self::UnknownConstraint { .. }
                | Self::UnknownAttribute { .. }
                | Self::HeaderMismatch { .. }
                | Self::TypeMismatch { .. }
                | Self::AttrTypeMismatch { .. }
                | Self::RowConstraintViolated { .. }
                | Self::KeyViolated { .. }
                | Self::PredicateNotSerializable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::AttrValue;

    #[test]
    fn row_violation_message_matches_original_shape() {
        let row = Row::new([
            ("course", AttrValue::from("C1")),
            ("mark", AttrValue::from(102)),
        ]);
        let err = Error::RowConstraintViolated {
            relation: "exam_marks".into(),
            constraint: "valid_mark".into(),
            predicate: "0 <= mark <= 100".into(),
            row,
            cause: None,
        };
        assert_eq!(
            err.to_string(),
            "exam_marks constraint valid_mark violated: \
             \"0 <= mark <= 100\" is not satisfied by (course=C1, mark=102)"
        );
    }

    #[test]
    fn row_violation_message_carries_cause() {
        let err = Error::RowConstraintViolated {
            relation: "r".into(),
            constraint: "c".into(),
            predicate: "boom()".into(),
            row: Row::new([("a", AttrValue::from(1))]),
            cause: Some("unknown name 'boom'".into()),
        };
        assert!(err.to_string().ends_with("(unknown name 'boom')"));
    }

    #[test]
    fn predicate_not_serializable_wording() {
        let err = Error::PredicateNotSerializable {
            name: "valid_mark".into(),
        };
        assert_eq!(
            err.to_string(),
            "predicate for constraint \"valid_mark\" cannot be stored as source text"
        );
    }

    #[test]
    fn validation_classification() {
        assert!(Error::unknown_relation("r").is_validation());
        assert!(!Error::Rollback.is_validation());
        assert!(!Error::Disconnected.is_validation());
    }
}
