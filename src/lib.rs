// File: src/lib.rs
//
// Library interface for the Klang language core.
// Exposes modules for the kc front end, integration tests and embedders.

pub mod ast;
pub mod errors;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod resolver;
pub mod stdlib;
