//! Predicate evaluation.

use crate::algebra::{AttrValue, Relation, Row};
use crate::expr::ast::{BinOp, CmpOp, Expr, UnOp};
use crate::expr::ExprError;
use crate::namespace::Namespace;
use std::cmp::Ordering;

/// A value produced during evaluation: a scalar, or a relation resolved
/// from the transaction scope.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum EvalValue {
    Scalar(AttrValue),
    Relation(Relation),
}

impl EvalValue {
    /// Boolean coercion: booleans are themselves, numbers are non-zero,
    /// text is non-empty, relations are non-empty; domain values defer to
    /// their base.
    pub(crate) fn truthy(&self) -> bool {
        match self {
            EvalValue::Scalar(value) => match value.base() {
                AttrValue::Bool(b) => *b,
                AttrValue::Int(n) => *n != 0,
                AttrValue::Text(s) => !s.is_empty(),
                AttrValue::Domain { .. } => unreachable!("base() strips domain wrappers"),
            },
            EvalValue::Relation(rel) => !rel.is_empty(),
        }
    }

    fn into_scalar(self) -> Result<AttrValue, ExprError> {
        match self {
            EvalValue::Scalar(value) => Ok(value),
            EvalValue::Relation(_) => {
                Err(ExprError::eval("relation value in scalar position"))
            }
        }
    }
}

/// Name-resolution scope for one evaluation.
///
/// Resolution order: the row under test, then the transaction's relation
/// view (inside a transaction only), then the namespace.
pub(crate) struct Scope<'a> {
    pub(crate) row: Option<&'a Row>,
    pub(crate) relations: Option<&'a dyn Fn(&str) -> Option<Relation>>,
    pub(crate) ns: &'a Namespace,
}

impl Scope<'_> {
    fn lookup(&self, name: &str) -> Result<EvalValue, ExprError> {
        if let Some(row) = self.row {
            if let Some(value) = row.get(name) {
                return Ok(EvalValue::Scalar(value.clone()));
            }
        }
        if let Some(relations) = self.relations {
            if let Some(rel) = relations(name) {
                return Ok(EvalValue::Relation(rel));
            }
        }
        if let Some(value) = self.ns.value(name) {
            return Ok(EvalValue::Scalar(value.clone()));
        }
        Err(ExprError::eval(format!("unknown name '{name}'")))
    }
}

/// Evaluates an expression in the given scope.
pub(crate) fn eval(expr: &Expr, scope: &Scope<'_>) -> Result<EvalValue, ExprError> {
    match expr {
        Expr::Literal(value) => Ok(EvalValue::Scalar(value.clone())),
        Expr::Name(name) => scope.lookup(name),
        Expr::Unary { op, expr } => {
            let value = eval(expr, scope)?;
            match op {
                UnOp::Not => Ok(EvalValue::Scalar(AttrValue::Bool(!value.truthy()))),
                UnOp::Neg => {
                    let value = value.into_scalar()?;
                    match value.base() {
                        AttrValue::Int(n) => Ok(EvalValue::Scalar(AttrValue::Int(
                            n.checked_neg()
                                .ok_or_else(|| ExprError::eval("integer overflow"))?,
                        ))),
                        _ => Err(ExprError::eval(format!(
                            "cannot negate {}",
                            value.attr_type()
                        ))),
                    }
                }
            }
        }
        Expr::Binary { op, left, right } => eval_binary(*op, left, right, scope),
        Expr::Compare { first, rest } => {
            let mut left = eval(first, scope)?;
            for (op, right_expr) in rest {
                let right = eval(right_expr, scope)?;
                if !compare(*op, &left, &right)? {
                    return Ok(EvalValue::Scalar(AttrValue::Bool(false)));
                }
                left = right;
            }
            Ok(EvalValue::Scalar(AttrValue::Bool(true)))
        }
        Expr::Call { name, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, scope)?.into_scalar()?);
            }
            Ok(EvalValue::Scalar(scope.ns.call(name, &values)?))
        }
    }
}

/// Evaluates an expression and coerces the result to a boolean.
pub(crate) fn eval_predicate(expr: &Expr, scope: &Scope<'_>) -> Result<bool, ExprError> {
    Ok(eval(expr, scope)?.truthy())
}

/// Evaluates an expression to a scalar attribute value.
pub(crate) fn eval_scalar(expr: &Expr, scope: &Scope<'_>) -> Result<AttrValue, ExprError> {
    eval(expr, scope)?.into_scalar()
}

fn eval_binary(
    op: BinOp,
    left: &Expr,
    right: &Expr,
    scope: &Scope<'_>,
) -> Result<EvalValue, ExprError> {
    // Boolean connectives short-circuit.
    match op {
        BinOp::And => {
            let left = eval(left, scope)?;
            if !left.truthy() {
                return Ok(left);
            }
            return eval(right, scope);
        }
        BinOp::Or => {
            let left = eval(left, scope)?;
            if left.truthy() {
                return Ok(left);
            }
            return eval(right, scope);
        }
        _ => {}
    }

    let left = eval(left, scope)?.into_scalar()?;
    let right = eval(right, scope)?.into_scalar()?;

    match (left.base(), right.base()) {
        (AttrValue::Int(a), AttrValue::Int(b)) => {
            let result = match op {
                BinOp::Add => a.checked_add(*b),
                BinOp::Sub => a.checked_sub(*b),
                BinOp::Mul => a.checked_mul(*b),
                BinOp::Div => {
                    if *b == 0 {
                        return Err(ExprError::eval("division by zero"));
                    }
                    a.checked_div(*b)
                }
                BinOp::Mod => {
                    if *b == 0 {
                        return Err(ExprError::eval("division by zero"));
                    }
                    a.checked_rem(*b)
                }
                BinOp::And | BinOp::Or => unreachable!("handled above"),
            };
            let n = result.ok_or_else(|| ExprError::eval("integer overflow"))?;
            Ok(EvalValue::Scalar(AttrValue::Int(n)))
        }
        (AttrValue::Text(a), AttrValue::Text(b)) if op == BinOp::Add => {
            Ok(EvalValue::Scalar(AttrValue::Text(format!("{a}{b}"))))
        }
        _ => Err(ExprError::eval(format!(
            "unsupported operand types for arithmetic: {} and {}",
            left.attr_type(),
            right.attr_type()
        ))),
    }
}

fn compare(op: CmpOp, left: &EvalValue, right: &EvalValue) -> Result<bool, ExprError> {
    // Equality works across any two values; distinct shapes or types are
    // simply unequal.
    match op {
        CmpOp::Eq => return Ok(values_equal(left, right)),
        CmpOp::Ne => return Ok(!values_equal(left, right)),
        _ => {}
    }

    let (EvalValue::Scalar(a), EvalValue::Scalar(b)) = (left, right) else {
        return Err(ExprError::eval("relations are not ordered"));
    };

    let ordering = order(a, b).ok_or_else(|| {
        ExprError::eval(format!(
            "'{}' not supported between {} and {}",
            op.symbol(),
            a.attr_type(),
            b.attr_type()
        ))
    })?;

    Ok(match op {
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::Le => ordering != Ordering::Greater,
        CmpOp::Gt => ordering == Ordering::Greater,
        CmpOp::Ge => ordering != Ordering::Less,
        CmpOp::Eq | CmpOp::Ne => unreachable!("handled above"),
    })
}

fn values_equal(left: &EvalValue, right: &EvalValue) -> bool {
    match (left, right) {
        (EvalValue::Scalar(a), EvalValue::Scalar(b)) => a == b,
        (EvalValue::Relation(a), EvalValue::Relation(b)) => a == b,
        _ => false,
    }
}

/// Ordering between two scalar values of the same type. Domain values
/// order within their own domain only.
fn order(a: &AttrValue, b: &AttrValue) -> Option<Ordering> {
    if a.attr_type() != b.attr_type() {
        return None;
    }
    match (a.base(), b.base()) {
        (AttrValue::Int(x), AttrValue::Int(y)) => Some(x.cmp(y)),
        (AttrValue::Text(x), AttrValue::Text(y)) => Some(x.cmp(y)),
        (AttrValue::Bool(x), AttrValue::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
