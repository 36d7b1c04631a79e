//! The predicate compiler.
//!
//! Row constraints, `where` clauses and update right-hand sides arrive as
//! source text, are compiled once into an AST bound to that source, and
//! evaluate against a scope that resolves bare names to the row under
//! test first and the expression namespace second. Source text is the
//! persisted form; the AST is never stored.

mod ast;
mod eval;
mod parser;
mod token;

pub(crate) use eval::{eval_predicate, eval_scalar, Scope};

use ast::Expr;

use thiserror::Error;

/// Errors from compiling or evaluating an expression.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExprError {
    /// The source text does not parse.
    #[error("parse error at offset {offset}: {message}")]
    Parse {
        /// What went wrong.
        message: String,
        /// Byte offset into the source.
        offset: usize,
    },

    /// The expression failed to evaluate.
    #[error("{message}")]
    Eval {
        /// What went wrong.
        message: String,
    },
}

impl ExprError {
    pub(crate) fn parse(message: impl Into<String>, offset: usize) -> Self {
        Self::Parse {
            message: message.into(),
            offset,
        }
    }

    pub(crate) fn eval(message: impl Into<String>) -> Self {
        Self::Eval {
            message: message.into(),
        }
    }
}

/// A predicate compiled from source text.
///
/// Keeps the verbatim source alongside the AST: the source is what gets
/// persisted and what error messages quote.
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
    source: String,
    expr: Expr,
}

impl Compiled {
    /// Compiles source text.
    pub fn compile(source: impl Into<String>) -> Result<Self, ExprError> {
        let source = source.into();
        let expr = parser::parse(&source)?;
        Ok(Self { source, expr })
    }

    /// The verbatim source text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn expr(&self) -> &Expr {
        &self.expr
    }
}
