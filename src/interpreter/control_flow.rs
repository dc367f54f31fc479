// File: src/interpreter/control_flow.rs
//
// Control flow signals for the Klang evaluator.
//
// Evaluation threads these through return values instead of using
// exceptions, so failure (Diagnostic) and normal control transfer
// (return/break/continue) stay distinct and the state machine is auditable.

use super::value::Value;
use crate::errors::{Diagnostic, SourceLocation};

/// Outcome of executing a statement.
#[derive(Debug, Clone)]
pub(crate) enum Flow {
    /// Normal execution, continue to the next statement.
    Normal,
    /// `return` terminates the innermost function activation.
    Return(Value),
    /// `break` exits the innermost enclosing loop.
    Break,
    /// `continue` restarts the innermost enclosing loop.
    Continue,
}

/// Non-local exits that propagate through expression evaluation.
///
/// A user-level `throw` unwinds until a `try`/`catch` handles it; without a
/// handler it reaches the front end as a Runtime diagnostic. Diagnostics
/// unwind the same way but are produced by the evaluator itself.
#[derive(Debug, Clone)]
pub(crate) enum Unwind {
    Error(Diagnostic),
    Throw { value: Value, location: SourceLocation },
}

impl From<Diagnostic> for Unwind {
    fn from(diag: Diagnostic) -> Self {
        Unwind::Error(diag)
    }
}
