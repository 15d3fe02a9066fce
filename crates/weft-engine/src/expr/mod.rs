//! Sandboxed condition expressions.
//!
//! A small JavaScript-flavoured grammar (literals, context identifiers,
//! member/index access, a fixed set of string methods, comparison and
//! boolean operators) parsed into an AST and evaluated against the
//! execution context. Nothing here can call out of the evaluator.

mod eval;
mod lexer;
mod parser;

use tracing::warn;

use weft_core::types::ExecutionContext;

pub use eval::truthy;
pub use parser::{parse, BinaryOp, Expr, LogicalOp, UnaryOp};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprError {
    #[error("syntax error at offset {pos}: {message}")]
    Syntax { pos: usize, message: String },

    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("unknown method '{0}'")]
    UnknownMethod(String),

    #[error("type error: {0}")]
    Type(String),
}

impl ExprError {
    pub(crate) fn syntax(pos: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            pos,
            message: message.into(),
        }
    }
}

/// Evaluate `expression` against the context and coerce the result to a boolean.
pub fn try_evaluate(expression: &str, context: &ExecutionContext) -> Result<bool, ExprError> {
    let ast = parse(expression)?;
    let value = eval::eval(&ast, context.values())?;
    Ok(truthy(&value))
}

/// Fail-closed evaluation: any error yields `false`.
pub fn evaluate(expression: &str, context: &ExecutionContext) -> bool {
    match try_evaluate(expression, context) {
        Ok(b) => b,
        Err(e) => {
            warn!(expression, error = %e, "Condition evaluation failed, treating as false");
            false
        }
    }
}
