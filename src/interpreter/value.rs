// File: src/interpreter/value.rs
//
// Runtime value types for the Klang programming language.
// Defines all value types that can be represented and manipulated at
// runtime, as a tagged variant. Strings, arrays and records are
// reference-counted so cloning a Value is cheap; arrays and records have
// interior mutability and identity semantics on mutation.

use super::environment::Environment;
use crate::ast::Stmt;
use crate::resolver::Bindings;
use crate::stdlib::NativeFunction;
use ahash::AHashMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A user-defined function: parameter list, body, and the environment in
/// effect at its definition. The captured environment - not the caller's -
/// becomes the parent of each activation frame, which is the
/// lexical-closure invariant.
#[derive(Debug)]
pub struct FunctionValue {
    /// None for lambdas.
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    pub closure: Rc<RefCell<Environment>>,
    /// Binding side table of the unit that defined this function. Kept on
    /// the value because a later unit (a later REPL line) may call it.
    pub bindings: Rc<Bindings>,
}

impl FunctionValue {
    pub fn describe(&self) -> String {
        match &self.name {
            Some(name) => format!("function '{}'", name),
            None => "anonymous function".to_string(),
        }
    }
}

/// Runtime values in the Klang evaluator.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point number
    Float(f64),
    /// String value (reference-counted for cheap cloning)
    Str(Rc<String>),
    Array(Rc<RefCell<Vec<Value>>>),
    Record(Rc<RefCell<AHashMap<String, Value>>>),
    Function(Rc<FunctionValue>),
    /// Host function provided through the stdlib bridge
    Native(Rc<NativeFunction>),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(Rc::new(s.into()))
    }

    pub fn array(elements: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(elements)))
    }

    pub fn record(fields: AHashMap<String, Value>) -> Self {
        Value::Record(Rc::new(RefCell::new(fields)))
    }

    /// Kind name used in type errors: "int", "float", "string", ...
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Record(_) => "record",
            Value::Function(_) => "function",
            Value::Native(_) => "native function",
        }
    }

    /// Numeric view used by mixed int/float arithmetic and comparison.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Quoted form for display inside containers, so that
    /// `["a"]` prints distinguishably from `[a]`.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("\"{}\"", s),
            other => other.to_string(),
        }
    }
}

/// Structural equality for data, identity for functions. Int and Float
/// compare numerically, so `1 == 1.0` holds. Containers can reference
/// themselves, so comparison tracks the pairs currently being compared and
/// treats a revisited pair as equal; the comparison then terminates on
/// cyclic data instead of overflowing the stack.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.eq_with(other, &mut Vec::new())
    }
}

impl Value {
    fn eq_with(&self, other: &Self, in_progress: &mut Vec<(usize, usize)>) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let pair = (Rc::as_ptr(a) as usize, Rc::as_ptr(b) as usize);
                if in_progress.contains(&pair) {
                    return true;
                }
                in_progress.push(pair);
                let (a, b) = (a.borrow(), b.borrow());
                let equal = a.len() == b.len()
                    && a.iter().zip(b.iter()).all(|(x, y)| x.eq_with(y, in_progress));
                in_progress.pop();
                equal
            }
            (Value::Record(a), Value::Record(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let pair = (Rc::as_ptr(a) as usize, Rc::as_ptr(b) as usize);
                if in_progress.contains(&pair) {
                    return true;
                }
                in_progress.push(pair);
                let (a, b) = (a.borrow(), b.borrow());
                let equal = a.len() == b.len()
                    && a.iter().all(|(key, x)| {
                        b.get(key).is_some_and(|y| x.eq_with(y, in_progress))
                    });
                in_progress.pop();
                equal
            }
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_with(f, &mut Vec::new(), false)
    }
}

impl Value {
    /// Guarded writer behind `Display` and `repr`. Containers already on
    /// the `in_progress` stack reference themselves and print as `[...]`
    /// or `{...}` instead of recursing forever. `quoted` is set for values
    /// inside containers, so `["a"]` prints distinguishably from `[a]`.
    fn fmt_with(
        &self,
        f: &mut fmt::Formatter<'_>,
        in_progress: &mut Vec<usize>,
        quoted: bool,
    ) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => {
                // Keep a decimal point so floats stay visually distinct
                // from ints.
                if n.is_finite() && n.fract() == 0.0 {
                    write!(f, "{:.1}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Str(s) => {
                if quoted {
                    write!(f, "\"{}\"", s)
                } else {
                    write!(f, "{}", s)
                }
            }
            Value::Array(elements) => {
                let ptr = Rc::as_ptr(elements) as usize;
                if in_progress.contains(&ptr) {
                    return write!(f, "[...]");
                }
                in_progress.push(ptr);
                write!(f, "[")?;
                for (i, elem) in elements.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    elem.fmt_with(f, in_progress, true)?;
                }
                in_progress.pop();
                write!(f, "]")
            }
            Value::Record(fields) => {
                let ptr = Rc::as_ptr(fields) as usize;
                if in_progress.contains(&ptr) {
                    return write!(f, "{{...}}");
                }
                in_progress.push(ptr);
                let fields = fields.borrow();
                let mut keys: Vec<&String> = fields.keys().collect();
                keys.sort();
                write!(f, "{{")?;
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: ", key)?;
                    fields[*key].fmt_with(f, in_progress, true)?;
                }
                in_progress.pop();
                write!(f, "}}")
            }
            Value::Function(func) => match &func.name {
                Some(name) => write!(f, "<fun {}({})>", name, func.params.join(", ")),
                None => write!(f, "<fun ({})>", func.params.join(", ")),
            },
            Value::Native(native) => write!(f, "<native {}>", native.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_and_float_compare_numerically() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::Int(1), Value::Float(1.5));
        assert_ne!(Value::Int(1), Value::str("1"));
    }

    #[test]
    fn arrays_compare_structurally() {
        let a = Value::array(vec![Value::Int(1), Value::str("x")]);
        let b = Value::array(vec![Value::Int(1), Value::str("x")]);
        assert_eq!(a, b);
    }

    #[test]
    fn display_keeps_floats_distinct_from_ints() {
        assert_eq!(Value::Int(2).to_string(), "2");
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
    }

    #[test]
    fn container_display_quotes_strings() {
        let arr = Value::array(vec![Value::str("a"), Value::Int(1)]);
        assert_eq!(arr.to_string(), "[\"a\", 1]");
    }

    fn self_referencing_array() -> Value {
        let arr = Value::array(vec![Value::Int(1)]);
        if let Value::Array(elements) = &arr {
            elements.borrow_mut().push(arr.clone());
        }
        arr
    }

    #[test]
    fn cyclic_array_display_terminates() {
        assert_eq!(self_referencing_array().to_string(), "[1, [...]]");
    }

    #[test]
    fn cyclic_record_display_terminates() {
        let mut fields = AHashMap::new();
        fields.insert("n".to_string(), Value::Int(1));
        let rec = Value::record(fields);
        if let Value::Record(inner) = &rec {
            let cycle = rec.clone();
            inner.borrow_mut().insert("me".to_string(), cycle);
        }
        assert_eq!(rec.to_string(), "{me: {...}, n: 1}");
    }

    #[test]
    fn cyclic_equality_terminates() {
        let a = self_referencing_array();
        let b = self_referencing_array();
        assert_eq!(a, b);
        assert_eq!(a, a.clone());

        let c = Value::array(vec![Value::Int(2)]);
        if let Value::Array(elements) = &c {
            elements.borrow_mut().push(c.clone());
        }
        assert_ne!(a, c);
    }
}
