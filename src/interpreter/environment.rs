// File: src/interpreter/environment.rs
//
// Lexical scoping environment for variable storage in the Klang evaluator.
//
// Environments form a parent-linked chain that parallels the static scope
// chain built by the resolver. Each activation record (function call, block,
// loop iteration) owns a fresh frame whose parent is the *defining*
// environment, which is what makes closures capture lexically. Frames are
// shared through Rc because any number of closures may keep a frame alive
// after the activation that created it has returned; the chain is acyclic
// by construction since a child only ever points outward.

use super::value::Value;
use ahash::AHashMap;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug)]
pub struct Environment {
    values: AHashMap<String, Value>,
    parent: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    /// Create a root (global) environment.
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Environment { values: AHashMap::new(), parent: None }))
    }

    /// Create a frame enclosed by `parent`.
    pub fn with_parent(parent: Rc<RefCell<Environment>>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Environment { values: AHashMap::new(), parent: Some(parent) }))
    }

    /// Introduce or rebind a name in this frame only.
    pub fn define(&mut self, name: String, value: Value) {
        self.values.insert(name, value);
    }

    /// Look a name up through the chain, innermost first.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.values.get(name) {
            return Some(value.clone());
        }
        match &self.parent {
            Some(parent) => parent.borrow().get(name),
            None => None,
        }
    }

    /// Assign to an existing binding somewhere in the chain.
    /// Returns false if no enclosing frame defines the name.
    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        if let Some(slot) = self.values.get_mut(name) {
            *slot = value;
            return true;
        }
        match &self.parent {
            Some(parent) => parent.borrow_mut().assign(name, value),
            None => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Names defined directly in this frame, sorted for stable output.
    pub fn local_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.values.keys().cloned().collect();
        names.sort();
        names
    }

    /// Walk `hops` parent links outward from `env`.
    ///
    /// The resolver guarantees the distance is valid for every binding it
    /// hands out, so a short chain here is a resolver bug, not user error.
    fn ancestor(env: &Rc<RefCell<Environment>>, hops: usize) -> Rc<RefCell<Environment>> {
        let mut current = Rc::clone(env);
        for _ in 0..hops {
            let parent = current
                .borrow()
                .parent
                .as_ref()
                .map(Rc::clone)
                .expect("resolver produced a scope distance longer than the environment chain");
            current = parent;
        }
        current
    }

    /// Read a name at an exact scope distance, bypassing dynamic lookup.
    pub fn get_at(env: &Rc<RefCell<Environment>>, hops: usize, name: &str) -> Option<Value> {
        Self::ancestor(env, hops).borrow().values.get(name).cloned()
    }

    /// Assign a name at an exact scope distance.
    pub fn assign_at(
        env: &Rc<RefCell<Environment>>,
        hops: usize,
        name: &str,
        value: Value,
    ) -> bool {
        let frame = Self::ancestor(env, hops);
        let mut frame = frame.borrow_mut();
        if let Some(slot) = frame.values.get_mut(name) {
            *slot = value;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_frames_shadow_outer() {
        let global = Environment::new();
        global.borrow_mut().define("x".into(), Value::Int(10));

        let inner = Environment::with_parent(Rc::clone(&global));
        inner.borrow_mut().define("x".into(), Value::Int(20));

        assert_eq!(inner.borrow().get("x"), Some(Value::Int(20)));
        assert_eq!(global.borrow().get("x"), Some(Value::Int(10)));
    }

    #[test]
    fn assign_walks_the_chain() {
        let global = Environment::new();
        global.borrow_mut().define("x".into(), Value::Int(1));

        let inner = Environment::with_parent(Rc::clone(&global));
        assert!(inner.borrow_mut().assign("x", Value::Int(2)));
        assert_eq!(global.borrow().get("x"), Some(Value::Int(2)));

        assert!(!inner.borrow_mut().assign("missing", Value::Nil));
    }

    #[test]
    fn get_at_reads_exactly_the_requested_frame() {
        let global = Environment::new();
        global.borrow_mut().define("x".into(), Value::Int(1));

        let mid = Environment::with_parent(Rc::clone(&global));
        mid.borrow_mut().define("x".into(), Value::Int(2));

        let inner = Environment::with_parent(Rc::clone(&mid));

        assert_eq!(Environment::get_at(&inner, 1, "x"), Some(Value::Int(2)));
        assert_eq!(Environment::get_at(&inner, 2, "x"), Some(Value::Int(1)));
    }

    #[test]
    fn frames_outlive_their_activation_when_shared() {
        let global = Environment::new();
        let frame = Environment::with_parent(Rc::clone(&global));
        frame.borrow_mut().define("captured".into(), Value::Int(42));

        let closure_view = Rc::clone(&frame);
        drop(frame);

        assert_eq!(closure_view.borrow().get("captured"), Some(Value::Int(42)));
    }
}
