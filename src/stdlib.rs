// File: src/stdlib.rs
//
// Standard-library bridge for the Klang language core.
//
// The core does not own any library content; it owns a registry that the
// host populates with native functions before evaluation begins. Each entry
// declares its name and arity; invoking one out of contract fails with the
// same Runtime discipline as built-in operators. `NativeRegistry::standard()`
// provides the default set the `kc` front end installs.

use crate::interpreter::Value;
use ahash::AHashMap;
use rand::Rng;
use std::cell::RefCell;
use std::fmt;
use std::io::Write;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Declared argument-count contract of a native function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == *n,
            Arity::AtLeast(n) => count >= *n,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Arity::Exact(1) => write!(f, "exactly 1 argument"),
            Arity::Exact(n) => write!(f, "exactly {} arguments", n),
            Arity::AtLeast(1) => write!(f, "at least 1 argument"),
            Arity::AtLeast(n) => write!(f, "at least {} arguments", n),
        }
    }
}

/// Where `print`/`println` output goes. Tests swap in a buffer so side
/// effects are observable without touching the process stdout.
#[derive(Debug, Clone)]
pub enum OutputSink {
    Stdout,
    Buffer(Rc<RefCell<Vec<u8>>>),
}

impl OutputSink {
    pub fn write_str(&mut self, s: &str) {
        match self {
            OutputSink::Stdout => {
                print!("{}", s);
                let _ = std::io::stdout().flush();
            }
            OutputSink::Buffer(buf) => {
                buf.borrow_mut().extend_from_slice(s.as_bytes());
            }
        }
    }
}

/// Host context handed to every native call.
pub struct NativeCtx<'a> {
    pub out: &'a mut OutputSink,
}

pub type NativeImpl = fn(&mut NativeCtx, &[Value]) -> Result<Value, String>;

/// One registered host function.
pub struct NativeFunction {
    pub name: String,
    pub arity: Arity,
    func: NativeImpl,
}

impl NativeFunction {
    pub fn invoke(&self, ctx: &mut NativeCtx, args: &[Value]) -> Result<Value, String> {
        (self.func)(ctx, args)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({}, {})", self.name, self.arity)
    }
}

/// Registry of host functions injected into the global environment before
/// any evaluation. The resolver treats every registered name as a known
/// global.
#[derive(Debug, Default)]
pub struct NativeRegistry {
    entries: AHashMap<String, Rc<NativeFunction>>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a native under `name`. Re-registering replaces the entry.
    pub fn register(&mut self, name: &str, arity: Arity, func: NativeImpl) {
        self.entries.insert(
            name.to_string(),
            Rc::new(NativeFunction { name: name.to_string(), arity, func }),
        );
    }

    pub fn get(&self, name: &str) -> Option<Rc<NativeFunction>> {
        self.entries.get(name).cloned()
    }

    /// Registered names, sorted for stable output.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Rc<NativeFunction>)> {
        self.entries.iter()
    }

    /// The default set installed by the `kc` front end.
    pub fn standard() -> Self {
        let mut reg = NativeRegistry::new();

        reg.register("print", Arity::AtLeast(0), native_print);
        reg.register("println", Arity::AtLeast(0), native_println);
        reg.register("clock", Arity::Exact(0), native_clock);
        reg.register("len", Arity::Exact(1), native_len);
        reg.register("type_of", Arity::Exact(1), native_type_of);
        reg.register("str", Arity::Exact(1), native_str);
        reg.register("int", Arity::Exact(1), native_int);
        reg.register("float", Arity::Exact(1), native_float);
        reg.register("abs", Arity::Exact(1), native_abs);
        reg.register("sqrt", Arity::Exact(1), native_sqrt);
        reg.register("pow", Arity::Exact(2), native_pow);
        reg.register("floor", Arity::Exact(1), native_floor);
        reg.register("ceil", Arity::Exact(1), native_ceil);
        reg.register("min", Arity::Exact(2), native_min);
        reg.register("max", Arity::Exact(2), native_max);
        reg.register("random", Arity::Exact(0), native_random);
        reg.register("random_int", Arity::Exact(2), native_random_int);
        reg.register("push", Arity::Exact(2), native_push);
        reg.register("pop", Arity::Exact(1), native_pop);
        reg.register("keys", Arity::Exact(1), native_keys);
        reg.register("contains", Arity::Exact(2), native_contains);
        reg.register("range", Arity::Exact(2), native_range);

        reg
    }
}

// --- implementations ---

fn joined(args: &[Value]) -> String {
    args.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ")
}

fn native_print(ctx: &mut NativeCtx, args: &[Value]) -> Result<Value, String> {
    ctx.out.write_str(&joined(args));
    Ok(Value::Nil)
}

fn native_println(ctx: &mut NativeCtx, args: &[Value]) -> Result<Value, String> {
    ctx.out.write_str(&joined(args));
    ctx.out.write_str("\n");
    Ok(Value::Nil)
}

fn native_clock(_ctx: &mut NativeCtx, _args: &[Value]) -> Result<Value, String> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| format!("clock: {}", e))?;
    Ok(Value::Float(now.as_secs_f64()))
}

fn native_len(_ctx: &mut NativeCtx, args: &[Value]) -> Result<Value, String> {
    match &args[0] {
        Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
        Value::Array(a) => Ok(Value::Int(a.borrow().len() as i64)),
        Value::Record(r) => Ok(Value::Int(r.borrow().len() as i64)),
        other => Err(format!("len: expected a string, array or record, got {}", other.type_name())),
    }
}

fn native_type_of(_ctx: &mut NativeCtx, args: &[Value]) -> Result<Value, String> {
    Ok(Value::str(args[0].type_name()))
}

fn native_str(_ctx: &mut NativeCtx, args: &[Value]) -> Result<Value, String> {
    Ok(Value::str(args[0].to_string()))
}

fn native_int(_ctx: &mut NativeCtx, args: &[Value]) -> Result<Value, String> {
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Float(n) => Ok(Value::Int(*n as i64)),
        Value::Bool(b) => Ok(Value::Int(if *b { 1 } else { 0 })),
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| format!("int: cannot parse '{}' as an integer", s)),
        other => Err(format!("int: cannot convert {}", other.type_name())),
    }
}

fn native_float(_ctx: &mut NativeCtx, args: &[Value]) -> Result<Value, String> {
    match &args[0] {
        Value::Int(n) => Ok(Value::Float(*n as f64)),
        Value::Float(n) => Ok(Value::Float(*n)),
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| format!("float: cannot parse '{}' as a float", s)),
        other => Err(format!("float: cannot convert {}", other.type_name())),
    }
}

fn expect_number(name: &str, value: &Value) -> Result<f64, String> {
    value
        .as_number()
        .ok_or_else(|| format!("{}: expected a number, got {}", name, value.type_name()))
}

fn native_abs(_ctx: &mut NativeCtx, args: &[Value]) -> Result<Value, String> {
    match &args[0] {
        Value::Int(n) => n
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| "abs: integer overflow".to_string()),
        Value::Float(n) => Ok(Value::Float(n.abs())),
        other => Err(format!("abs: expected a number, got {}", other.type_name())),
    }
}

fn native_sqrt(_ctx: &mut NativeCtx, args: &[Value]) -> Result<Value, String> {
    Ok(Value::Float(expect_number("sqrt", &args[0])?.sqrt()))
}

fn native_pow(_ctx: &mut NativeCtx, args: &[Value]) -> Result<Value, String> {
    let base = expect_number("pow", &args[0])?;
    let exp = expect_number("pow", &args[1])?;
    Ok(Value::Float(base.powf(exp)))
}

fn native_floor(_ctx: &mut NativeCtx, args: &[Value]) -> Result<Value, String> {
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Float(n) => Ok(Value::Float(n.floor())),
        other => Err(format!("floor: expected a number, got {}", other.type_name())),
    }
}

fn native_ceil(_ctx: &mut NativeCtx, args: &[Value]) -> Result<Value, String> {
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Float(n) => Ok(Value::Float(n.ceil())),
        other => Err(format!("ceil: expected a number, got {}", other.type_name())),
    }
}

fn pick(name: &str, a: &Value, b: &Value, want_min: bool) -> Result<Value, String> {
    let x = expect_number(name, a)?;
    let y = expect_number(name, b)?;
    let smaller = x <= y;
    Ok(if smaller == want_min { a.clone() } else { b.clone() })
}

fn native_min(_ctx: &mut NativeCtx, args: &[Value]) -> Result<Value, String> {
    pick("min", &args[0], &args[1], true)
}

fn native_max(_ctx: &mut NativeCtx, args: &[Value]) -> Result<Value, String> {
    pick("max", &args[0], &args[1], false)
}

fn native_random(_ctx: &mut NativeCtx, _args: &[Value]) -> Result<Value, String> {
    let mut rng = rand::thread_rng();
    Ok(Value::Float(rng.gen::<f64>()))
}

fn native_random_int(_ctx: &mut NativeCtx, args: &[Value]) -> Result<Value, String> {
    match (&args[0], &args[1]) {
        (Value::Int(lo), Value::Int(hi)) => {
            if lo > hi {
                return Err(format!("random_int: empty range {}..{}", lo, hi));
            }
            let mut rng = rand::thread_rng();
            Ok(Value::Int(rng.gen_range(*lo..=*hi)))
        }
        (a, b) => Err(format!(
            "random_int: expected two integers, got {} and {}",
            a.type_name(),
            b.type_name()
        )),
    }
}

fn native_push(_ctx: &mut NativeCtx, args: &[Value]) -> Result<Value, String> {
    match &args[0] {
        Value::Array(a) => {
            a.borrow_mut().push(args[1].clone());
            Ok(args[0].clone())
        }
        other => Err(format!("push: expected an array, got {}", other.type_name())),
    }
}

fn native_pop(_ctx: &mut NativeCtx, args: &[Value]) -> Result<Value, String> {
    match &args[0] {
        Value::Array(a) => a
            .borrow_mut()
            .pop()
            .ok_or_else(|| "pop: array is empty".to_string()),
        other => Err(format!("pop: expected an array, got {}", other.type_name())),
    }
}

fn native_keys(_ctx: &mut NativeCtx, args: &[Value]) -> Result<Value, String> {
    match &args[0] {
        Value::Record(r) => {
            let mut keys: Vec<String> = r.borrow().keys().cloned().collect();
            keys.sort();
            Ok(Value::array(keys.into_iter().map(Value::str).collect()))
        }
        other => Err(format!("keys: expected a record, got {}", other.type_name())),
    }
}

fn native_contains(_ctx: &mut NativeCtx, args: &[Value]) -> Result<Value, String> {
    match (&args[0], &args[1]) {
        (Value::Array(a), needle) => Ok(Value::Bool(a.borrow().iter().any(|v| v == needle))),
        (Value::Record(r), Value::Str(key)) => {
            Ok(Value::Bool(r.borrow().contains_key(key.as_str())))
        }
        (Value::Str(haystack), Value::Str(needle)) => {
            Ok(Value::Bool(haystack.contains(needle.as_str())))
        }
        (a, b) => Err(format!(
            "contains: cannot search {} for {}",
            a.type_name(),
            b.type_name()
        )),
    }
}

fn native_range(_ctx: &mut NativeCtx, args: &[Value]) -> Result<Value, String> {
    match (&args[0], &args[1]) {
        (Value::Int(lo), Value::Int(hi)) => {
            let mut out = Vec::new();
            let mut i = *lo;
            while i < *hi {
                out.push(Value::Int(i));
                i += 1;
            }
            Ok(Value::array(out))
        }
        (a, b) => Err(format!(
            "range: expected two integers, got {} and {}",
            a.type_name(),
            b.type_name()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> Result<Value, String> {
        let reg = NativeRegistry::standard();
        let native = reg.get(name).expect("native should be registered");
        let mut sink = OutputSink::Buffer(Rc::new(RefCell::new(Vec::new())));
        let mut ctx = NativeCtx { out: &mut sink };
        native.invoke(&mut ctx, args)
    }

    #[test]
    fn arity_contract_display() {
        assert_eq!(Arity::Exact(2).to_string(), "exactly 2 arguments");
        assert_eq!(Arity::AtLeast(1).to_string(), "at least 1 argument");
        assert!(Arity::AtLeast(1).accepts(3));
        assert!(!Arity::Exact(2).accepts(1));
    }

    #[test]
    fn println_writes_to_the_sink() {
        let buf = Rc::new(RefCell::new(Vec::new()));
        let mut sink = OutputSink::Buffer(Rc::clone(&buf));
        let mut ctx = NativeCtx { out: &mut sink };
        let reg = NativeRegistry::standard();
        reg.get("println")
            .unwrap()
            .invoke(&mut ctx, &[Value::str("hi"), Value::Int(2)])
            .unwrap();
        assert_eq!(String::from_utf8(buf.borrow().clone()).unwrap(), "hi 2\n");
    }

    #[test]
    fn len_covers_strings_arrays_and_records() {
        assert_eq!(call("len", &[Value::str("abc")]), Ok(Value::Int(3)));
        assert_eq!(
            call("len", &[Value::array(vec![Value::Int(1), Value::Int(2)])]),
            Ok(Value::Int(2))
        );
        assert!(call("len", &[Value::Int(5)]).is_err());
    }

    #[test]
    fn conversions() {
        assert_eq!(call("int", &[Value::str(" 42 ")]), Ok(Value::Int(42)));
        assert_eq!(call("int", &[Value::Float(3.9)]), Ok(Value::Int(3)));
        assert!(call("int", &[Value::str("nope")]).is_err());
        assert_eq!(call("float", &[Value::Int(2)]), Ok(Value::Float(2.0)));
        assert_eq!(call("str", &[Value::Int(7)]), Ok(Value::str("7")));
    }

    #[test]
    fn min_preserves_the_operand_kind() {
        assert_eq!(call("min", &[Value::Int(1), Value::Float(2.0)]), Ok(Value::Int(1)));
        assert_eq!(call("max", &[Value::Int(1), Value::Float(2.0)]), Ok(Value::Float(2.0)));
    }

    #[test]
    fn range_is_half_open() {
        let v = call("range", &[Value::Int(1), Value::Int(4)]).unwrap();
        assert_eq!(v, Value::array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]));
    }

    #[test]
    fn random_int_respects_bounds() {
        for _ in 0..50 {
            match call("random_int", &[Value::Int(3), Value::Int(5)]).unwrap() {
                Value::Int(n) => assert!((3..=5).contains(&n)),
                other => panic!("expected int, got {:?}", other),
            }
        }
        assert!(call("random_int", &[Value::Int(5), Value::Int(3)]).is_err());
    }

    #[test]
    fn registry_registration_and_names() {
        let mut reg = NativeRegistry::new();
        reg.register("answer", Arity::Exact(0), |_, _| Ok(Value::Int(42)));
        assert!(reg.get("answer").is_some());
        assert_eq!(reg.names(), vec!["answer".to_string()]);
    }
}
