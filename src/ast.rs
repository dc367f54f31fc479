// File: src/ast.rs
//
// Abstract Syntax Tree (AST) definitions for the Klang programming language.
// Defines the structure of parsed Klang programs.
//
// The AST is a strict tree: every node owns its children, rooted at the
// Vec<Stmt> of a compilation unit. Expressions (Expr) represent values and
// computations, while Statements (Stmt) represent actions and control flow.
// Every node carries the source location of the token that introduced it.

use crate::errors::SourceLocation;

/// Identity of an identifier reference inside one compilation unit.
///
/// The parser assigns ids in parse order; the resolver keys its binding
/// side table on them, so a resolved reference stays stable during
/// evaluation without re-resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// Literal values as they appear in source.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Nil,
}

/// Represents an expression in Klang - something that evaluates to a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal {
        value: Literal,
        location: SourceLocation,
    },
    Variable {
        name: String,
        id: NodeId,
        location: SourceLocation,
    },
    /// Assignment to a variable: name = value. Right-associative.
    Assign {
        name: String,
        id: NodeId,
        value: Box<Expr>,
        location: SourceLocation,
    },
    /// Assignment through an index: object[index] = value
    SetIndex {
        object: Box<Expr>,
        index: Box<Expr>,
        value: Box<Expr>,
        location: SourceLocation,
    },
    /// Assignment to a record field: object.field = value
    SetField {
        object: Box<Expr>,
        field: String,
        value: Box<Expr>,
        location: SourceLocation,
    },
    Unary {
        op: String,
        operand: Box<Expr>,
        location: SourceLocation,
    },
    Binary {
        left: Box<Expr>,
        op: String,
        right: Box<Expr>,
        location: SourceLocation,
    },
    /// Short-circuit && and ||, kept separate from Binary because the
    /// right operand may never be evaluated.
    Logical {
        left: Box<Expr>,
        op: String,
        right: Box<Expr>,
        location: SourceLocation,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        location: SourceLocation,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        location: SourceLocation,
    },
    GetField {
        object: Box<Expr>,
        field: String,
        location: SourceLocation,
    },
    Array {
        elements: Vec<Expr>,
        location: SourceLocation,
    },
    Record {
        fields: Vec<(String, Expr)>,
        location: SourceLocation,
    },
    /// Anonymous function literal: fun (params) { body }
    Lambda {
        params: Vec<String>,
        body: Vec<Stmt>,
        location: SourceLocation,
    },
}

impl Expr {
    pub fn location(&self) -> &SourceLocation {
        match self {
            Expr::Literal { location, .. }
            | Expr::Variable { location, .. }
            | Expr::Assign { location, .. }
            | Expr::SetIndex { location, .. }
            | Expr::SetField { location, .. }
            | Expr::Unary { location, .. }
            | Expr::Binary { location, .. }
            | Expr::Logical { location, .. }
            | Expr::Call { location, .. }
            | Expr::Index { location, .. }
            | Expr::GetField { location, .. }
            | Expr::Array { location, .. }
            | Expr::Record { location, .. }
            | Expr::Lambda { location, .. } => location,
        }
    }
}

/// Represents a statement in Klang - an action or declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let {
        name: String,
        value: Expr,
        location: SourceLocation,
    },
    Fun {
        name: String,
        params: Vec<String>,
        body: Vec<Stmt>,
        location: SourceLocation,
    },
    ExprStmt(Expr),
    Block(Vec<Stmt>),
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
    },
    For {
        var: String,
        iterable: Expr,
        body: Vec<Stmt>,
        location: SourceLocation,
    },
    Return {
        value: Option<Expr>,
        location: SourceLocation,
    },
    Break {
        location: SourceLocation,
    },
    Continue {
        location: SourceLocation,
    },
    TryCatch {
        try_block: Vec<Stmt>,
        catch_var: String,
        catch_block: Vec<Stmt>,
    },
    Throw {
        value: Expr,
        location: SourceLocation,
    },
}
