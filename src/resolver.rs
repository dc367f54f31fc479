// File: src/resolver.rs
//
// Static name resolution for the Klang programming language.
// Walks the AST in a single pre-evaluation pass, binding every identifier
// reference to the lexical scope that declares it.
//
// The pass is pure: it performs no I/O and no evaluation, and produces a
// side table (Bindings) from reference identity to scope distance that the
// evaluator consumes without ever re-resolving a name.
//
// Policy (see DESIGN.md):
// - `fun` declarations are hoisted within their scope; `let` is not.
// - Shadowing an outer scope is allowed; redeclaring in the same local
//   scope is a Binding error. The global scope permits redeclaration so the
//   REPL can rebind names.
// - Reading a variable inside its own initializer is a Binding error.

use crate::ast::{Expr, NodeId, Stmt};
use crate::errors::{find_closest_match, Diagnostic, DiagnosticCode, SourceLocation};
use ahash::{AHashMap, AHashSet};

/// Side table produced by resolution: reference identity -> scope distance.
///
/// A reference with no entry resolved to the global environment.
#[derive(Debug, Default, Clone)]
pub struct Bindings {
    hops: AHashMap<NodeId, usize>,
}

impl Bindings {
    /// Number of frames between the use and the declaring scope, or None
    /// for a global.
    pub fn hops(&self, id: NodeId) -> Option<usize> {
        self.hops.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }
}

/// Declaration state of a local, used to reject `let x = x;`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarState {
    Declared,
    Defined,
}

pub struct Resolver<'a> {
    /// Innermost scope last. The global scope is not on this stack.
    scopes: Vec<AHashMap<String, VarState>>,
    /// Names known to exist globally before this unit runs (natives and
    /// previously evaluated REPL lines).
    globals: &'a AHashSet<String>,
    /// Top-level names declared by this unit.
    unit_globals: AHashSet<String>,
    bindings: Bindings,
    errors: Vec<Diagnostic>,
    function_depth: usize,
    loop_depth: usize,
}

impl<'a> Resolver<'a> {
    pub fn new(globals: &'a AHashSet<String>) -> Self {
        Resolver {
            scopes: Vec::new(),
            globals,
            unit_globals: AHashSet::new(),
            bindings: Bindings::default(),
            errors: Vec::new(),
            function_depth: 0,
            loop_depth: 0,
        }
    }

    /// Resolve one compilation unit. Either every reference binds, or the
    /// full list of Binding diagnostics is returned and evaluation must not
    /// start.
    pub fn resolve(mut self, stmts: &[Stmt]) -> Result<Bindings, Vec<Diagnostic>> {
        // Top-level names are late-bound: a function body may reference a
        // global declared further down the unit. Using one before its
        // declaration has run is then a Runtime error, not a Binding error.
        for stmt in stmts {
            if let Stmt::Let { name, .. } | Stmt::Fun { name, .. } = stmt {
                self.unit_globals.insert(name.clone());
            }
        }
        self.hoist_functions(stmts);
        for stmt in stmts {
            self.resolve_stmt(stmt);
        }

        if self.errors.is_empty() {
            Ok(self.bindings)
        } else {
            Err(self.errors)
        }
    }

    /// Declare every `fun` name of a statement list before resolving any of
    /// it, so functions can reference each other regardless of order.
    fn hoist_functions(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            if let Stmt::Fun { name, location, .. } = stmt {
                self.declare(name, location, VarState::Defined);
            }
        }
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Let { name, value, location } => {
                // The initializer resolves before the name exists, so a
                // reference to `name` inside it binds outward or fails.
                self.mark_declared(name);
                self.resolve_expr(value);
                self.clear_declared(name);
                self.declare(name, location, VarState::Defined);
            }
            Stmt::Fun { params, body, location, .. } => {
                // Name was hoisted. Only the body remains.
                self.resolve_function(params, body, location);
            }
            Stmt::ExprStmt(expr) => self.resolve_expr(expr),
            Stmt::Block(stmts) => {
                self.begin_scope();
                self.hoist_functions(stmts);
                for s in stmts {
                    self.resolve_stmt(s);
                }
                self.end_scope();
            }
            Stmt::If { condition, then_branch, else_branch } => {
                self.resolve_expr(condition);
                self.resolve_scoped(then_branch);
                if let Some(else_branch) = else_branch {
                    self.resolve_scoped(else_branch);
                }
            }
            Stmt::While { condition, body } => {
                self.resolve_expr(condition);
                self.loop_depth += 1;
                self.resolve_scoped(body);
                self.loop_depth -= 1;
            }
            Stmt::For { var, iterable, body, location } => {
                self.resolve_expr(iterable);
                self.begin_scope();
                self.declare(var, location, VarState::Defined);
                self.hoist_functions(body);
                self.loop_depth += 1;
                for s in body {
                    self.resolve_stmt(s);
                }
                self.loop_depth -= 1;
                self.end_scope();
            }
            Stmt::Return { value, location } => {
                if self.function_depth == 0 {
                    self.errors.push(Diagnostic::new(
                        DiagnosticCode::E203,
                        "'return' outside a function".into(),
                        location.clone(),
                    ));
                }
                if let Some(value) = value {
                    self.resolve_expr(value);
                }
            }
            Stmt::Break { location } => {
                if self.loop_depth == 0 {
                    self.errors.push(Diagnostic::new(
                        DiagnosticCode::E204,
                        "'break' outside a loop".into(),
                        location.clone(),
                    ));
                }
            }
            Stmt::Continue { location } => {
                if self.loop_depth == 0 {
                    self.errors.push(Diagnostic::new(
                        DiagnosticCode::E204,
                        "'continue' outside a loop".into(),
                        location.clone(),
                    ));
                }
            }
            Stmt::TryCatch { try_block, catch_var, catch_block } => {
                self.resolve_scoped(try_block);
                self.begin_scope();
                self.scopes
                    .last_mut()
                    .expect("scope just pushed")
                    .insert(catch_var.clone(), VarState::Defined);
                self.hoist_functions(catch_block);
                for s in catch_block {
                    self.resolve_stmt(s);
                }
                self.end_scope();
            }
            Stmt::Throw { value, .. } => self.resolve_expr(value),
        }
    }

    fn resolve_scoped(&mut self, stmts: &[Stmt]) {
        self.begin_scope();
        self.hoist_functions(stmts);
        for s in stmts {
            self.resolve_stmt(s);
        }
        self.end_scope();
    }

    fn resolve_function(&mut self, params: &[String], body: &[Stmt], location: &SourceLocation) {
        self.begin_scope();
        let mut seen = AHashSet::new();
        for param in params {
            if !seen.insert(param.clone()) {
                self.errors.push(Diagnostic::new(
                    DiagnosticCode::E202,
                    format!("Duplicate parameter '{}'", param),
                    location.clone(),
                ));
            }
            self.scopes
                .last_mut()
                .expect("scope just pushed")
                .insert(param.clone(), VarState::Defined);
        }

        self.function_depth += 1;
        // break/continue cannot jump out of a function body into an
        // enclosing loop.
        let saved_loop_depth = std::mem::replace(&mut self.loop_depth, 0);
        self.hoist_functions(body);
        for s in body {
            self.resolve_stmt(s);
        }
        self.loop_depth = saved_loop_depth;
        self.function_depth -= 1;
        self.end_scope();
    }

    fn resolve_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal { .. } => {}
            Expr::Variable { name, id, location } => {
                self.resolve_name(name, *id, location, true);
            }
            Expr::Assign { name, id, value, location } => {
                self.resolve_expr(value);
                self.resolve_name(name, *id, location, false);
            }
            Expr::SetIndex { object, index, value, .. } => {
                self.resolve_expr(object);
                self.resolve_expr(index);
                self.resolve_expr(value);
            }
            Expr::SetField { object, value, .. } => {
                self.resolve_expr(object);
                self.resolve_expr(value);
            }
            Expr::Unary { operand, .. } => self.resolve_expr(operand),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            Expr::Call { callee, args, .. } => {
                self.resolve_expr(callee);
                for arg in args {
                    self.resolve_expr(arg);
                }
            }
            Expr::Index { object, index, .. } => {
                self.resolve_expr(object);
                self.resolve_expr(index);
            }
            Expr::GetField { object, .. } => self.resolve_expr(object),
            Expr::Array { elements, .. } => {
                for e in elements {
                    self.resolve_expr(e);
                }
            }
            Expr::Record { fields, .. } => {
                for (_, v) in fields {
                    self.resolve_expr(v);
                }
            }
            Expr::Lambda { params, body, location } => {
                self.resolve_function(params, body, location);
            }
        }
    }

    /// Bind one identifier reference, innermost scope first, falling back
    /// to the globals known before this unit runs.
    fn resolve_name(&mut self, name: &str, id: NodeId, location: &SourceLocation, is_read: bool) {
        for (depth, scope) in self.scopes.iter().enumerate().rev() {
            if let Some(state) = scope.get(name) {
                if is_read && *state == VarState::Declared {
                    self.errors.push(Diagnostic::new(
                        DiagnosticCode::E205,
                        format!("Variable '{}' is read in its own initializer", name),
                        location.clone(),
                    ));
                    return;
                }
                let hops = self.scopes.len() - 1 - depth;
                self.bindings.hops.insert(id, hops);
                return;
            }
        }

        if self.unit_globals.contains(name) || self.globals.contains(name) {
            // Global: no side-table entry; the evaluator looks the name up
            // in the persistent global environment.
            return;
        }

        let mut diag = Diagnostic::new(
            DiagnosticCode::E201,
            format!("Undefined reference to '{}'", name),
            location.clone(),
        );
        if let Some(closest) = self.closest_known_name(name) {
            diag = diag.with_suggestion(closest);
        }
        self.errors.push(diag);
    }

    fn closest_known_name(&self, target: &str) -> Option<String> {
        let candidates: Vec<&str> = self
            .scopes
            .iter()
            .flat_map(|s| s.keys())
            .chain(self.unit_globals.iter())
            .chain(self.globals.iter())
            .map(|s| s.as_str())
            .collect();
        find_closest_match(target, candidates).map(|s| s.to_string())
    }

    fn begin_scope(&mut self) {
        self.scopes.push(AHashMap::new());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    /// Introduce a binding in the current scope. Same-scope duplicates are
    /// a Binding error, except globally where rebinding is allowed.
    fn declare(&mut self, name: &str, location: &SourceLocation, state: VarState) {
        match self.scopes.last_mut() {
            Some(scope) => {
                if scope.contains_key(name) {
                    self.errors.push(Diagnostic::new(
                        DiagnosticCode::E202,
                        format!("'{}' is already declared in this scope", name),
                        location.clone(),
                    )
                    .with_help("Use assignment to change its value, or pick another name".into()));
                } else {
                    scope.insert(name.to_string(), state);
                }
            }
            None => {
                self.unit_globals.insert(name.to_string());
            }
        }
    }

    /// Track the not-yet-initialized window of a local `let`.
    fn mark_declared(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            if !scope.contains_key(name) {
                scope.insert(name.to_string(), VarState::Declared);
            }
        }
    }

    fn clear_declared(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            if scope.get(name) == Some(&VarState::Declared) {
                scope.remove(name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn resolve_source(source: &str) -> Result<Bindings, Vec<Diagnostic>> {
        let tokens = Lexer::tokenize_source(source).expect("lexing should succeed");
        let stmts = Parser::new(tokens).parse().expect("parsing should succeed");
        let globals = AHashSet::new();
        Resolver::new(&globals).resolve(&stmts)
    }

    #[test]
    fn undefined_reference_is_a_binding_error() {
        let errs = resolve_source("foo()").unwrap_err();
        assert_eq!(errs[0].code, DiagnosticCode::E201);
        assert!(errs[0].message.contains("foo"));
    }

    #[test]
    fn undefined_reference_gets_a_suggestion() {
        let errs = resolve_source("let counter = 0; { countr = 1; }").unwrap_err();
        assert_eq!(errs[0].suggestion.as_deref(), Some("counter"));
    }

    #[test]
    fn locals_bind_with_scope_distance() {
        let bindings = resolve_source("{ let a = 1; { let b = a; b; } }").unwrap();
        assert!(!bindings.is_empty());
    }

    #[test]
    fn top_level_names_are_globals() {
        // Globals get no side-table entry.
        let bindings = resolve_source("let a = 1; a;").unwrap();
        assert!(bindings.is_empty());
    }

    #[test]
    fn same_scope_redeclaration_is_rejected_locally() {
        let errs = resolve_source("{ let a = 1; let a = 2; }").unwrap_err();
        assert_eq!(errs[0].code, DiagnosticCode::E202);
    }

    #[test]
    fn global_scope_allows_rebinding() {
        assert!(resolve_source("let a = 1; let a = 2;").is_ok());
    }

    #[test]
    fn shadowing_in_nested_scope_is_allowed() {
        assert!(resolve_source("let x = 1; { let x = 2; } x;").is_ok());
    }

    #[test]
    fn functions_are_hoisted_within_their_scope() {
        assert!(resolve_source("fun a() { return b(); } fun b() { return 1; }").is_ok());
        assert!(resolve_source("{ fun a() { return b(); } fun b() { return 1; } }").is_ok());
    }

    #[test]
    fn let_is_not_hoisted() {
        let errs = resolve_source("{ let a = b; let b = 1; }").unwrap_err();
        assert_eq!(errs[0].code, DiagnosticCode::E201);
    }

    #[test]
    fn self_referential_initializer_is_rejected() {
        let errs = resolve_source("{ let a = a; }").unwrap_err();
        assert_eq!(errs[0].code, DiagnosticCode::E205);
    }

    #[test]
    fn return_outside_function() {
        let errs = resolve_source("return 1;").unwrap_err();
        assert_eq!(errs[0].code, DiagnosticCode::E203);
    }

    #[test]
    fn break_outside_loop_even_across_function_boundary() {
        let errs = resolve_source("break;").unwrap_err();
        assert_eq!(errs[0].code, DiagnosticCode::E204);

        let errs =
            resolve_source("while (true) { fun f() { break; } f(); }").unwrap_err();
        assert_eq!(errs[0].code, DiagnosticCode::E204);
    }

    #[test]
    fn duplicate_parameters_are_rejected() {
        let errs = resolve_source("fun f(a, a) { return a; }").unwrap_err();
        assert_eq!(errs[0].code, DiagnosticCode::E202);
    }

    #[test]
    fn catch_variable_is_scoped_to_the_catch_block() {
        let errs = resolve_source("try { } catch (e) { } e;").unwrap_err();
        assert_eq!(errs[0].code, DiagnosticCode::E201);
    }

    #[test]
    fn known_globals_resolve_without_entries() {
        let tokens = Lexer::tokenize_source("println(1)").unwrap();
        let stmts = Parser::new(tokens).parse().unwrap();
        let mut globals = AHashSet::new();
        globals.insert("println".to_string());
        let bindings = Resolver::new(&globals).resolve(&stmts).unwrap();
        assert!(bindings.is_empty());
    }
}
