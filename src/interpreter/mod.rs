// File: src/interpreter/mod.rs
//
// Tree-walking evaluator for the Klang programming language.
//
// The interpreter consumes a resolved compilation unit: the AST from the
// parser plus the binding side table from the resolver. Statements execute
// for effect and yield a Flow signal; expressions evaluate to a Value or
// unwind with a Diagnostic or a user-level throw. The global environment
// persists across `run` calls, which is what makes the REPL stateful.

mod control_flow;
mod environment;
mod value;

pub use environment::Environment;
pub use value::{FunctionValue, Value};

use crate::ast::{Expr, Literal, Stmt};
use crate::errors::{Diagnostic, DiagnosticCode, SourceLocation};
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::resolver::{Bindings, Resolver};
use crate::stdlib::{NativeCtx, NativeRegistry, OutputSink};
use ahash::{AHashMap, AHashSet};
use control_flow::{Flow, Unwind};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Recursion guard. Deep enough for real programs, shallow enough to fail
/// with a diagnostic before the host stack overflows. Each klang call costs
/// several kilobytes of host stack in unoptimized builds, so the limit must
/// stay within a default 2 MiB thread stack.
pub const MAX_CALL_DEPTH: usize = 64;

pub struct Interpreter {
    globals: Rc<RefCell<Environment>>,
    /// Side table of the unit currently executing. Swapped while a function
    /// from another unit is on the stack.
    bindings: Rc<Bindings>,
    output: OutputSink,
    cancel: Arc<AtomicBool>,
    call_depth: usize,
}

impl Interpreter {
    pub fn new(natives: NativeRegistry) -> Self {
        Self::with_output(natives, OutputSink::Stdout)
    }

    pub fn with_output(natives: NativeRegistry, output: OutputSink) -> Self {
        let globals = Environment::new();
        for (name, native) in natives.iter() {
            globals.borrow_mut().define(name.clone(), Value::Native(Rc::clone(native)));
        }
        Interpreter {
            globals,
            bindings: Rc::new(Bindings::default()),
            output,
            cancel: Arc::new(AtomicBool::new(false)),
            call_depth: 0,
        }
    }

    /// Flag the host sets to interrupt evaluation. Checked at loop
    /// back-edges and call entries; trips as an uncatchable Runtime error.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Names currently defined in the global environment. Seeds the
    /// resolver so references to natives and earlier units bind.
    pub fn global_names(&self) -> AHashSet<String> {
        self.globals.borrow().local_names().into_iter().collect()
    }

    /// Sorted snapshot of the global environment, for REPL inspection.
    pub fn global_entries(&self) -> Vec<(String, Value)> {
        let globals = self.globals.borrow();
        globals
            .local_names()
            .into_iter()
            .map(|name| {
                let value = globals.get(&name).expect("name just listed");
                (name, value)
            })
            .collect()
    }

    /// Full pipeline on one source unit: lex, parse, resolve against the
    /// current globals, evaluate. Diagnostics come back annotated with the
    /// offending source line.
    pub fn eval_source(&mut self, source: &str) -> Result<Value, Vec<Diagnostic>> {
        let tokens =
            Lexer::tokenize_source(source).map_err(|d| vec![d.annotate_source(source)])?;
        let stmts = Parser::new(tokens)
            .parse()
            .map_err(|ds| ds.into_iter().map(|d| d.annotate_source(source)).collect::<Vec<_>>())?;
        let globals = self.global_names();
        let bindings = Resolver::new(&globals)
            .resolve(&stmts)
            .map_err(|ds| ds.into_iter().map(|d| d.annotate_source(source)).collect::<Vec<_>>())?;
        self.run(&stmts, bindings).map_err(|d| vec![d.annotate_source(source)])
    }

    /// Evaluate one resolved unit in the persistent global environment.
    /// Returns the value of the final statement when it is an expression
    /// statement and Nil otherwise, so the REPL echoes `1 + 1` but stays
    /// quiet after `let x = 1;`.
    pub fn run(&mut self, stmts: &[Stmt], bindings: Bindings) -> Result<Value, Diagnostic> {
        self.bindings = Rc::new(bindings);
        self.call_depth = 0;

        let env = Rc::clone(&self.globals);
        self.hoist_functions(stmts, &env);

        let mut last = Value::Nil;
        for stmt in stmts {
            if let Stmt::ExprStmt(expr) = stmt {
                match self.eval_expr(expr, &env) {
                    Ok(value) => last = value,
                    Err(unwind) => return Err(self.surface(unwind)),
                }
            } else {
                match self.exec_stmt(stmt, &env) {
                    // The resolver rejects top-level return/break/continue.
                    Ok(Flow::Normal) => last = Value::Nil,
                    Ok(_) => unreachable!("resolver admits only Normal flow at top level"),
                    Err(unwind) => return Err(self.surface(unwind)),
                }
            }
        }
        Ok(last)
    }

    /// Convert an unwind that escaped the whole unit into a diagnostic.
    fn surface(&self, unwind: Unwind) -> Diagnostic {
        match unwind {
            Unwind::Error(diag) => diag,
            Unwind::Throw { value, location } => Diagnostic::new(
                DiagnosticCode::E307,
                format!("Uncaught throw: {}", value.repr()),
                location,
            )
            .with_help("Wrap the throwing code in try { ... } catch (e) { ... }".into()),
        }
    }

    /// Define every `fun` of a statement list in `env` before execution,
    /// mirroring the resolver's hoisting pass.
    fn hoist_functions(&mut self, stmts: &[Stmt], env: &Rc<RefCell<Environment>>) {
        for stmt in stmts {
            if let Stmt::Fun { name, params, body, .. } = stmt {
                let func = FunctionValue {
                    name: Some(name.clone()),
                    params: params.clone(),
                    body: body.clone(),
                    closure: Rc::clone(env),
                    bindings: Rc::clone(&self.bindings),
                };
                env.borrow_mut().define(name.clone(), Value::Function(Rc::new(func)));
            }
        }
    }

    fn exec_block(
        &mut self,
        stmts: &[Stmt],
        env: &Rc<RefCell<Environment>>,
    ) -> Result<Flow, Unwind> {
        self.hoist_functions(stmts, env);
        for stmt in stmts {
            match self.exec_stmt(stmt, env)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, env: &Rc<RefCell<Environment>>) -> Result<Flow, Unwind> {
        match stmt {
            Stmt::Let { name, value, .. } => {
                let value = self.eval_expr(value, env)?;
                env.borrow_mut().define(name.clone(), value);
                Ok(Flow::Normal)
            }
            // Defined by the hoisting pass of the enclosing block.
            Stmt::Fun { .. } => Ok(Flow::Normal),
            Stmt::ExprStmt(expr) => {
                self.eval_expr(expr, env)?;
                Ok(Flow::Normal)
            }
            Stmt::Block(stmts) => {
                let frame = Environment::with_parent(Rc::clone(env));
                self.exec_block(stmts, &frame)
            }
            Stmt::If { condition, then_branch, else_branch } => {
                if self.eval_condition(condition, env, "if")? {
                    let frame = Environment::with_parent(Rc::clone(env));
                    self.exec_block(then_branch, &frame)
                } else if let Some(else_branch) = else_branch {
                    let frame = Environment::with_parent(Rc::clone(env));
                    self.exec_block(else_branch, &frame)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While { condition, body } => {
                while self.eval_condition(condition, env, "while")? {
                    self.check_cancelled(condition.location())?;
                    // Fresh frame per iteration, so closures made in the
                    // body capture that iteration's locals.
                    let frame = Environment::with_parent(Rc::clone(env));
                    match self.exec_block(body, &frame)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For { var, iterable, body, location } => {
                let iterable = self.eval_expr(iterable, env)?;
                let items = self.iteration_items(&iterable, location)?;
                for item in items {
                    self.check_cancelled(location)?;
                    let frame = Environment::with_parent(Rc::clone(env));
                    frame.borrow_mut().define(var.clone(), item);
                    match self.exec_block(body, &frame)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr, env)?,
                    None => Value::Nil,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Break { .. } => Ok(Flow::Break),
            Stmt::Continue { .. } => Ok(Flow::Continue),
            Stmt::TryCatch { try_block, catch_var, catch_block } => {
                let frame = Environment::with_parent(Rc::clone(env));
                match self.exec_block(try_block, &frame) {
                    Ok(flow) => Ok(flow),
                    Err(unwind) => {
                        let caught = match self.catchable(unwind) {
                            Ok(value) => value,
                            Err(unwind) => return Err(unwind),
                        };
                        let frame = Environment::with_parent(Rc::clone(env));
                        frame.borrow_mut().define(catch_var.clone(), caught);
                        self.exec_block(catch_block, &frame)
                    }
                }
            }
            Stmt::Throw { value, location } => {
                let value = self.eval_expr(value, env)?;
                Err(Unwind::Throw { value, location: location.clone() })
            }
        }
    }

    /// The value a catch clause binds, or the unwind back if it must keep
    /// propagating. User throws surface as thrown; Runtime diagnostics
    /// surface as a record with `code` and `message` fields. Host
    /// interruption is not catchable.
    fn catchable(&self, unwind: Unwind) -> Result<Value, Unwind> {
        match unwind {
            Unwind::Throw { value, .. } => Ok(value),
            Unwind::Error(diag) => {
                if diag.code == DiagnosticCode::E309 {
                    return Err(Unwind::Error(diag));
                }
                let mut fields = AHashMap::new();
                fields.insert("code".to_string(), Value::str(diag.code.to_string()));
                fields.insert("message".to_string(), Value::str(diag.message.clone()));
                Ok(Value::record(fields))
            }
        }
    }

    fn eval_condition(
        &mut self,
        condition: &Expr,
        env: &Rc<RefCell<Environment>>,
        context: &str,
    ) -> Result<bool, Unwind> {
        match self.eval_expr(condition, env)? {
            Value::Bool(b) => Ok(b),
            other => Err(self
                .runtime_error(
                    DiagnosticCode::E302,
                    format!("'{}' condition must be a bool, got {}", context, other.type_name()),
                    condition.location(),
                )
                .into()),
        }
    }

    fn eval_expr(&mut self, expr: &Expr, env: &Rc<RefCell<Environment>>) -> Result<Value, Unwind> {
        match expr {
            Expr::Literal { value, .. } => Ok(match value {
                Literal::Int(n) => Value::Int(*n),
                Literal::Float(n) => Value::Float(*n),
                Literal::Str(s) => Value::str(s.clone()),
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Nil => Value::Nil,
            }),
            Expr::Variable { name, id, location } => match self.bindings.hops(*id) {
                Some(hops) => Environment::get_at(env, hops, name)
                    .ok_or_else(|| self.used_before_definition(name, location).into()),
                None => self
                    .globals
                    .borrow()
                    .get(name)
                    .ok_or_else(|| self.used_before_definition(name, location).into()),
            },
            Expr::Assign { name, id, value, location } => {
                let value = self.eval_expr(value, env)?;
                let assigned = match self.bindings.hops(*id) {
                    Some(hops) => Environment::assign_at(env, hops, name, value.clone()),
                    None => self.globals.borrow_mut().assign(name, value.clone()),
                };
                if assigned {
                    Ok(value)
                } else {
                    Err(self.used_before_definition(name, location).into())
                }
            }
            Expr::SetIndex { object, index, value, location } => {
                let object = self.eval_expr(object, env)?;
                let index = self.eval_expr(index, env)?;
                let value = self.eval_expr(value, env)?;
                self.set_index(&object, &index, value, location)
            }
            Expr::SetField { object, field, value, location } => {
                let object = self.eval_expr(object, env)?;
                let value = self.eval_expr(value, env)?;
                match object {
                    Value::Record(fields) => {
                        fields.borrow_mut().insert(field.clone(), value.clone());
                        Ok(value)
                    }
                    other => Err(self
                        .runtime_error(
                            DiagnosticCode::E302,
                            format!("Cannot set field '{}' on {}", field, other.type_name()),
                            location,
                        )
                        .into()),
                }
            }
            Expr::Unary { op, operand, location } => {
                let operand = self.eval_expr(operand, env)?;
                self.eval_unary(op, operand, location)
            }
            Expr::Binary { left, op, right, location } => {
                let left = self.eval_expr(left, env)?;
                let right = self.eval_expr(right, env)?;
                self.eval_binary(op, left, right, location)
            }
            Expr::Logical { left, op, right, location } => {
                let lhs = match self.eval_expr(left, env)? {
                    Value::Bool(b) => b,
                    other => {
                        return Err(self.logical_operand_error(op, &other, location).into());
                    }
                };
                // Short circuit before touching the right operand.
                if (op == "&&" && !lhs) || (op == "||" && lhs) {
                    return Ok(Value::Bool(lhs));
                }
                match self.eval_expr(right, env)? {
                    Value::Bool(b) => Ok(Value::Bool(b)),
                    other => Err(self.logical_operand_error(op, &other, location).into()),
                }
            }
            Expr::Call { callee, args, location } => {
                let callee = self.eval_expr(callee, env)?;
                let mut arg_values = Vec::with_capacity(args.len());
                for arg in args {
                    arg_values.push(self.eval_expr(arg, env)?);
                }
                self.call(callee, arg_values, location)
            }
            Expr::Index { object, index, location } => {
                let object = self.eval_expr(object, env)?;
                let index = self.eval_expr(index, env)?;
                self.get_index(&object, &index, location)
            }
            Expr::GetField { object, field, location } => {
                let object = self.eval_expr(object, env)?;
                match object {
                    Value::Record(fields) => {
                        fields.borrow().get(field).cloned().ok_or_else(|| {
                            self.runtime_error(
                                DiagnosticCode::E306,
                                format!("Record has no field '{}'", field),
                                location,
                            )
                            .into()
                        })
                    }
                    other => Err(self
                        .runtime_error(
                            DiagnosticCode::E302,
                            format!("Cannot read field '{}' of {}", field, other.type_name()),
                            location,
                        )
                        .into()),
                }
            }
            Expr::Array { elements, .. } => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.eval_expr(element, env)?);
                }
                Ok(Value::array(values))
            }
            Expr::Record { fields, location } => {
                let mut map = AHashMap::with_capacity(fields.len());
                for (key, value_expr) in fields {
                    if map.contains_key(key) {
                        return Err(self
                            .runtime_error(
                                DiagnosticCode::E302,
                                format!("Duplicate key '{}' in record literal", key),
                                location,
                            )
                            .into());
                    }
                    let value = self.eval_expr(value_expr, env)?;
                    map.insert(key.clone(), value);
                }
                Ok(Value::record(map))
            }
            Expr::Lambda { params, body, .. } => Ok(Value::Function(Rc::new(FunctionValue {
                name: None,
                params: params.clone(),
                body: body.clone(),
                closure: Rc::clone(env),
                bindings: Rc::clone(&self.bindings),
            }))),
        }
    }

    fn call(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        location: &SourceLocation,
    ) -> Result<Value, Unwind> {
        self.check_cancelled(location)?;
        match callee {
            Value::Function(func) => self.call_function(&func, args, location),
            Value::Native(native) => {
                if !native.arity.accepts(args.len()) {
                    return Err(self
                        .runtime_error(
                            DiagnosticCode::E301,
                            format!(
                                "'{}' expects {}, got {}",
                                native.name,
                                native.arity,
                                args.len()
                            ),
                            location,
                        )
                        .into());
                }
                let mut ctx = NativeCtx { out: &mut self.output };
                native.invoke(&mut ctx, &args).map_err(|message| {
                    Unwind::Error(self.runtime_error(
                        DiagnosticCode::E308,
                        message,
                        location,
                    ))
                })
            }
            other => Err(self
                .runtime_error(
                    DiagnosticCode::E303,
                    format!("Value of type {} is not callable", other.type_name()),
                    location,
                )
                .into()),
        }
    }

    fn call_function(
        &mut self,
        func: &FunctionValue,
        args: Vec<Value>,
        location: &SourceLocation,
    ) -> Result<Value, Unwind> {
        if args.len() != func.params.len() {
            return Err(self
                .runtime_error(
                    DiagnosticCode::E301,
                    format!(
                        "{} expects {} argument{}, got {}",
                        func.describe(),
                        func.params.len(),
                        if func.params.len() == 1 { "" } else { "s" },
                        args.len()
                    ),
                    location,
                )
                .into());
        }
        if self.call_depth >= MAX_CALL_DEPTH {
            return Err(self
                .runtime_error(
                    DiagnosticCode::E311,
                    format!("Call depth limit of {} exceeded", MAX_CALL_DEPTH),
                    location,
                )
                .into());
        }

        let frame = Environment::with_parent(Rc::clone(&func.closure));
        {
            let mut frame = frame.borrow_mut();
            for (param, arg) in func.params.iter().zip(args) {
                frame.define(param.clone(), arg);
            }
        }

        // The body resolves against the table of its defining unit.
        let saved_bindings = std::mem::replace(&mut self.bindings, Rc::clone(&func.bindings));
        self.call_depth += 1;
        let result = self.exec_block(&func.body, &frame);
        self.call_depth -= 1;
        self.bindings = saved_bindings;

        match result? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::Nil),
            Flow::Break | Flow::Continue => {
                unreachable!("resolver confines break/continue to loops")
            }
        }
    }

    fn eval_unary(
        &self,
        op: &str,
        operand: Value,
        location: &SourceLocation,
    ) -> Result<Value, Unwind> {
        match (op, &operand) {
            ("-", Value::Int(n)) => n.checked_neg().map(Value::Int).ok_or_else(|| {
                self.runtime_error(DiagnosticCode::E305, "Integer overflow in negation".into(), location)
                    .into()
            }),
            ("-", Value::Float(n)) => Ok(Value::Float(-n)),
            ("!", Value::Bool(b)) => Ok(Value::Bool(!b)),
            ("-", other) => Err(self
                .runtime_error(
                    DiagnosticCode::E302,
                    format!("Unary '-' expects a number, got {}", other.type_name()),
                    location,
                )
                .into()),
            ("!", other) => Err(self
                .runtime_error(
                    DiagnosticCode::E302,
                    format!("Unary '!' expects a bool, got {}", other.type_name()),
                    location,
                )
                .into()),
            _ => unreachable!("parser emits only '-' and '!' unary operators"),
        }
    }

    fn eval_binary(
        &self,
        op: &str,
        left: Value,
        right: Value,
        location: &SourceLocation,
    ) -> Result<Value, Unwind> {
        match op {
            "==" => return Ok(Value::Bool(left == right)),
            "!=" => return Ok(Value::Bool(left != right)),
            _ => {}
        }

        if let (Value::Str(a), Value::Str(b)) = (&left, &right) {
            return match op {
                "+" => Ok(Value::str(format!("{}{}", a, b))),
                "<" => Ok(Value::Bool(a < b)),
                "<=" => Ok(Value::Bool(a <= b)),
                ">" => Ok(Value::Bool(a > b)),
                ">=" => Ok(Value::Bool(a >= b)),
                _ => Err(self.binary_type_error(op, &left, &right, location).into()),
            };
        }

        match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => self.int_binary(op, *a, *b, location),
            (Value::Int(_), Value::Float(_))
            | (Value::Float(_), Value::Int(_))
            | (Value::Float(_), Value::Float(_)) => {
                // as_number is total for these three shapes.
                let a = left.as_number().expect("numeric operand");
                let b = right.as_number().expect("numeric operand");
                self.float_binary(op, a, b, location)
                    .ok_or_else(|| self.binary_type_error(op, &left, &right, location).into())
            }
            _ => Err(self.binary_type_error(op, &left, &right, location).into()),
        }
    }

    fn int_binary(
        &self,
        op: &str,
        a: i64,
        b: i64,
        location: &SourceLocation,
    ) -> Result<Value, Unwind> {
        let overflow = |this: &Self| {
            Unwind::Error(this.runtime_error(
                DiagnosticCode::E305,
                format!("Integer overflow in '{}'", op),
                location,
            ))
        };
        match op {
            "+" => a.checked_add(b).map(Value::Int).ok_or_else(|| overflow(self)),
            "-" => a.checked_sub(b).map(Value::Int).ok_or_else(|| overflow(self)),
            "*" => a.checked_mul(b).map(Value::Int).ok_or_else(|| overflow(self)),
            "/" => {
                if b == 0 {
                    return Err(self
                        .runtime_error(DiagnosticCode::E304, "Division by zero".into(), location)
                        .into());
                }
                a.checked_div(b).map(Value::Int).ok_or_else(|| overflow(self))
            }
            "%" => {
                if b == 0 {
                    return Err(self
                        .runtime_error(DiagnosticCode::E304, "Remainder by zero".into(), location)
                        .into());
                }
                a.checked_rem(b).map(Value::Int).ok_or_else(|| overflow(self))
            }
            "**" => {
                if b >= 0 {
                    u32::try_from(b)
                        .ok()
                        .and_then(|exp| a.checked_pow(exp))
                        .map(Value::Int)
                        .ok_or_else(|| overflow(self))
                } else {
                    // Negative exponent leaves the integers.
                    Ok(Value::Float((a as f64).powf(b as f64)))
                }
            }
            "<" => Ok(Value::Bool(a < b)),
            "<=" => Ok(Value::Bool(a <= b)),
            ">" => Ok(Value::Bool(a > b)),
            ">=" => Ok(Value::Bool(a >= b)),
            _ => unreachable!("parser emits no other binary operators"),
        }
    }

    fn float_binary(&self, op: &str, a: f64, b: f64, _location: &SourceLocation) -> Option<Value> {
        match op {
            "+" => Some(Value::Float(a + b)),
            "-" => Some(Value::Float(a - b)),
            "*" => Some(Value::Float(a * b)),
            "/" => Some(Value::Float(a / b)),
            "%" => Some(Value::Float(a % b)),
            "**" => Some(Value::Float(a.powf(b))),
            "<" => Some(Value::Bool(a < b)),
            "<=" => Some(Value::Bool(a <= b)),
            ">" => Some(Value::Bool(a > b)),
            ">=" => Some(Value::Bool(a >= b)),
            _ => None,
        }
    }

    fn get_index(
        &self,
        object: &Value,
        index: &Value,
        location: &SourceLocation,
    ) -> Result<Value, Unwind> {
        match (object, index) {
            (Value::Array(elements), Value::Int(i)) => {
                let elements = elements.borrow();
                self.array_slot(elements.len(), *i, location)
                    .map(|slot| elements[slot].clone())
            }
            (Value::Str(s), Value::Int(i)) => {
                let chars: Vec<char> = s.chars().collect();
                self.array_slot(chars.len(), *i, location)
                    .map(|slot| Value::str(chars[slot].to_string()))
            }
            (Value::Record(fields), Value::Str(key)) => {
                fields.borrow().get(key.as_str()).cloned().ok_or_else(|| {
                    self.runtime_error(
                        DiagnosticCode::E306,
                        format!("Record has no field '{}'", key),
                        location,
                    )
                    .into()
                })
            }
            (object, index) => Err(self
                .runtime_error(
                    DiagnosticCode::E306,
                    format!("Cannot index {} with {}", object.type_name(), index.type_name()),
                    location,
                )
                .into()),
        }
    }

    fn set_index(
        &self,
        object: &Value,
        index: &Value,
        value: Value,
        location: &SourceLocation,
    ) -> Result<Value, Unwind> {
        match (object, index) {
            (Value::Array(elements), Value::Int(i)) => {
                let mut elements = elements.borrow_mut();
                let slot = self.array_slot(elements.len(), *i, location)?;
                elements[slot] = value.clone();
                Ok(value)
            }
            (Value::Record(fields), Value::Str(key)) => {
                fields.borrow_mut().insert(key.to_string(), value.clone());
                Ok(value)
            }
            (object, index) => Err(self
                .runtime_error(
                    DiagnosticCode::E306,
                    format!(
                        "Cannot assign into {} with {} index",
                        object.type_name(),
                        index.type_name()
                    ),
                    location,
                )
                .into()),
        }
    }

    /// Bounds-check an index; arrays and strings do not auto-grow and do
    /// not accept negative indices.
    fn array_slot(
        &self,
        len: usize,
        index: i64,
        location: &SourceLocation,
    ) -> Result<usize, Unwind> {
        usize::try_from(index)
            .ok()
            .filter(|i| *i < len)
            .ok_or_else(|| {
                self.runtime_error(
                    DiagnosticCode::E306,
                    format!("Index {} out of bounds for length {}", index, len),
                    location,
                )
                .into()
            })
    }

    fn iteration_items(
        &self,
        iterable: &Value,
        location: &SourceLocation,
    ) -> Result<Vec<Value>, Unwind> {
        match iterable {
            // Snapshot so the body may mutate the array it walks.
            Value::Array(elements) => Ok(elements.borrow().clone()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
            other => Err(self
                .runtime_error(
                    DiagnosticCode::E302,
                    format!("'for' expects an array or string, got {}", other.type_name()),
                    location,
                )
                .into()),
        }
    }

    fn check_cancelled(&self, location: &SourceLocation) -> Result<(), Unwind> {
        if self.cancel.load(Ordering::Relaxed) {
            Err(self
                .runtime_error(
                    DiagnosticCode::E309,
                    "Evaluation interrupted by the host".into(),
                    location,
                )
                .into())
        } else {
            Ok(())
        }
    }

    fn used_before_definition(&self, name: &str, location: &SourceLocation) -> Diagnostic {
        self.runtime_error(
            DiagnosticCode::E310,
            format!("'{}' is used before its declaration has been evaluated", name),
            location,
        )
    }

    fn logical_operand_error(
        &self,
        op: &str,
        operand: &Value,
        location: &SourceLocation,
    ) -> Diagnostic {
        self.runtime_error(
            DiagnosticCode::E302,
            format!("'{}' expects bool operands, got {}", op, operand.type_name()),
            location,
        )
    }

    fn binary_type_error(
        &self,
        op: &str,
        left: &Value,
        right: &Value,
        location: &SourceLocation,
    ) -> Diagnostic {
        self.runtime_error(
            DiagnosticCode::E302,
            format!(
                "Operator '{}' cannot be applied to {} and {}",
                op,
                left.type_name(),
                right.type_name()
            ),
            location,
        )
    }

    fn runtime_error(
        &self,
        code: DiagnosticCode,
        message: String,
        location: &SourceLocation,
    ) -> Diagnostic {
        Diagnostic::new(code, message, location.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str) -> Result<Value, Vec<Diagnostic>> {
        let mut interp =
            Interpreter::with_output(NativeRegistry::standard(), OutputSink::Buffer(Default::default()));
        interp.eval_source(source)
    }

    fn eval_ok(source: &str) -> Value {
        eval(source).expect("evaluation should succeed")
    }

    fn eval_code(source: &str) -> DiagnosticCode {
        eval(source).expect_err("evaluation should fail")[0].code
    }

    #[test]
    fn precedence_multiplication_before_addition() {
        assert_eq!(eval_ok("1 + 2 * 3"), Value::Int(7));
    }

    #[test]
    fn block_scope_restores_the_outer_binding() {
        assert_eq!(eval_ok("let x = 1; { let x = 2; } x"), Value::Int(1));
    }

    #[test]
    fn mixed_arithmetic_promotes_to_float() {
        assert_eq!(eval_ok("1 + 2.5"), Value::Float(3.5));
        assert_eq!(eval_ok("7 / 2"), Value::Int(3));
        assert_eq!(eval_ok("7 / 2.0"), Value::Float(3.5));
    }

    #[test]
    fn checked_integer_arithmetic() {
        assert_eq!(eval_code("9223372036854775807 + 1"), DiagnosticCode::E305);
        assert_eq!(eval_code("1 / 0"), DiagnosticCode::E304);
        assert_eq!(eval_code("1 % 0"), DiagnosticCode::E304);
    }

    #[test]
    fn arity_mismatch_is_a_runtime_error() {
        let source = "fun add(a, b) { return a + b; } add(1)";
        assert_eq!(eval_code(source), DiagnosticCode::E301);
    }

    #[test]
    fn closures_capture_their_defining_environment() {
        let source = "
            fun make_counter() {
                let n = 0;
                return fun () { n = n + 1; return n; };
            }
            let c = make_counter();
            c();
            c();
            c()
        ";
        assert_eq!(eval_ok(source), Value::Int(3));
    }

    #[test]
    fn loop_iterations_do_not_share_frames() {
        let source = "
            let fs = [];
            for (i in range(0, 3)) {
                push(fs, fun () { return i; });
            }
            fs[0]() + fs[1]() + fs[2]()
        ";
        assert_eq!(eval_ok(source), Value::Int(3));
    }

    #[test]
    fn break_and_continue() {
        let source = "
            let total = 0;
            for (i in range(0, 10)) {
                if (i == 5) { break; }
                if (i % 2 == 1) { continue; }
                total = total + i;
            }
            total
        ";
        assert_eq!(eval_ok(source), Value::Int(6));
    }

    #[test]
    fn strict_conditions_reject_non_bool() {
        assert_eq!(eval_code("if (1) { }"), DiagnosticCode::E302);
        assert_eq!(eval_code("true && 1"), DiagnosticCode::E302);
    }

    #[test]
    fn short_circuit_skips_the_right_operand() {
        assert_eq!(eval_ok("false && 1 / 0 == 0"), Value::Bool(false));
        assert_eq!(eval_ok("true || 1 / 0 == 0"), Value::Bool(true));
    }

    #[test]
    fn try_catch_binds_the_thrown_value() {
        let source = "
            let seen = nil;
            try { throw 42; } catch (e) { seen = e; }
            seen
        ";
        assert_eq!(eval_ok(source), Value::Int(42));
    }

    #[test]
    fn try_catch_binds_runtime_errors_as_records() {
        let source = "
            let code = nil;
            try { 1 / 0; } catch (e) { code = e.code; }
            code
        ";
        assert_eq!(eval_ok(source), Value::str("E304"));
    }

    #[test]
    fn uncaught_throw_surfaces_as_runtime_error() {
        assert_eq!(eval_code("throw \"boom\""), DiagnosticCode::E307);
    }

    #[test]
    fn call_depth_limit() {
        assert_eq!(eval_code("fun f() { return f(); } f()"), DiagnosticCode::E311);
    }

    #[test]
    fn state_persists_across_units() {
        let mut interp = Interpreter::with_output(
            NativeRegistry::standard(),
            OutputSink::Buffer(Default::default()),
        );
        interp.eval_source("let x = 10;").unwrap();
        interp.eval_source("fun double(n) { return n * 2; }").unwrap();
        assert_eq!(interp.eval_source("double(x)").unwrap(), Value::Int(20));
    }

    #[test]
    fn cancellation_interrupts_loops_and_is_not_catchable() {
        let mut interp = Interpreter::with_output(
            NativeRegistry::standard(),
            OutputSink::Buffer(Default::default()),
        );
        interp.cancel_flag().store(true, Ordering::Relaxed);
        let errs = interp
            .eval_source("try { while (true) { } } catch (e) { }")
            .unwrap_err();
        assert_eq!(errs[0].code, DiagnosticCode::E309);
    }
}
