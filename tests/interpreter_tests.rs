// Integration tests for the Klang interpreter
//
// These tests run complete Klang programs through the public API and check
// the results. Tests cover:
// - Variable declaration, scoping and shadowing
// - Control flow (if/else, while, for, break/continue)
// - Functions, closures and recursion
// - Data structures (arrays, records)
// - Error handling (throw, try/catch, diagnostics per phase)
// - Built-in functions and printed output

use klang::errors::{DiagnosticCode, DiagnosticKind};
use klang::interpreter::{Interpreter, Value};
use klang::stdlib::{NativeRegistry, OutputSink};
use std::cell::RefCell;
use std::rc::Rc;

fn run_code(code: &str) -> Result<Value, DiagnosticCode> {
    let mut interp = Interpreter::with_output(
        NativeRegistry::standard(),
        OutputSink::Buffer(Rc::new(RefCell::new(Vec::new()))),
    );
    interp.eval_source(code).map_err(|diags| diags[0].code)
}

fn run_value(code: &str) -> Value {
    run_code(code).expect("program should evaluate")
}

fn run_output(code: &str) -> String {
    let buf = Rc::new(RefCell::new(Vec::new()));
    let mut interp = Interpreter::with_output(
        NativeRegistry::standard(),
        OutputSink::Buffer(Rc::clone(&buf)),
    );
    interp.eval_source(code).expect("program should evaluate");
    let out = String::from_utf8(buf.borrow().clone()).expect("output should be utf-8");
    out
}

// --- variables and scoping ---

#[test]
fn test_let_declares_and_expressions_evaluate() {
    assert_eq!(run_value("let x = 41; x + 1"), Value::Int(42));
}

#[test]
fn test_block_scope_shadows_and_restores() {
    assert_eq!(run_value("let x = 1; { let x = 2; } x"), Value::Int(1));
}

#[test]
fn test_trailing_declaration_yields_nil() {
    // Only the final statement's value is echoed, and declarations have none.
    assert_eq!(run_value("1 + 1; let x = 2;"), Value::Nil);
}

#[test]
fn test_assignment_is_an_expression() {
    assert_eq!(run_value("let x = 1; let y = x = 5; y"), Value::Int(5));
    assert_eq!(run_value("let x = 1; x = 5; x"), Value::Int(5));
}

#[test]
fn test_global_rebinding_is_allowed() {
    assert_eq!(run_value("let x = 1; let x = \"two\"; x"), Value::str("two"));
}

// --- operators ---

#[test]
fn test_arithmetic_precedence() {
    assert_eq!(run_value("1 + 2 * 3"), Value::Int(7));
    assert_eq!(run_value("(1 + 2) * 3"), Value::Int(9));
    assert_eq!(run_value("2 ** 3 ** 2"), Value::Int(512));
    assert_eq!(run_value("10 % 4"), Value::Int(2));
}

#[test]
fn test_mixed_arithmetic_promotes() {
    assert_eq!(run_value("1 + 0.5"), Value::Float(1.5));
    assert_eq!(run_value("7 / 2"), Value::Int(3));
    assert_eq!(run_value("7.0 / 2"), Value::Float(3.5));
}

#[test]
fn test_string_concatenation_and_comparison() {
    assert_eq!(run_value("\"foo\" + \"bar\""), Value::str("foobar"));
    assert_eq!(run_value("\"abc\" < \"abd\""), Value::Bool(true));
}

#[test]
fn test_equality_is_structural_for_data() {
    assert_eq!(run_value("[1, 2] == [1, 2]"), Value::Bool(true));
    // A leading '{' opens a block, so record comparisons need a binding.
    assert_eq!(run_value("let r = {a: 1} == {a: 1}; r"), Value::Bool(true));
    assert_eq!(run_value("1 == 1.0"), Value::Bool(true));
    assert_eq!(run_value("1 == \"1\""), Value::Bool(false));
}

#[test]
fn test_mismatched_operands_are_type_errors() {
    assert_eq!(run_code("1 + \"one\""), Err(DiagnosticCode::E302));
    assert_eq!(run_code("-true"), Err(DiagnosticCode::E302));
    assert_eq!(run_code("!1"), Err(DiagnosticCode::E302));
}

#[test]
fn test_checked_integer_arithmetic() {
    assert_eq!(run_code("1 / 0"), Err(DiagnosticCode::E304));
    assert_eq!(run_code("9223372036854775807 + 1"), Err(DiagnosticCode::E305));
    assert_eq!(run_value("9223372036854775807.0 + 1.0 > 0.0"), Value::Bool(true));
}

// --- control flow ---

#[test]
fn test_if_else_chains() {
    let code = r#"
        fun grade(n) {
            if (n >= 90) { return "A"; }
            else if (n >= 80) { return "B"; }
            else { return "C"; }
        }
        grade(85)
    "#;
    assert_eq!(run_value(code), Value::str("B"));
}

#[test]
fn test_while_loop_with_break_and_continue() {
    let code = r#"
        let total = 0;
        let i = 0;
        while (true) {
            i = i + 1;
            if (i > 10) { break; }
            if (i % 2 == 0) { continue; }
            total = total + i;
        }
        total
    "#;
    assert_eq!(run_value(code), Value::Int(25));
}

#[test]
fn test_for_iterates_arrays_and_strings() {
    let code = r#"
        let sum = 0;
        for (n in [1, 2, 3]) { sum = sum + n; }
        sum
    "#;
    assert_eq!(run_value(code), Value::Int(6));

    let code = r#"
        let out = "";
        for (c in "abc") { out = c + out; }
        out
    "#;
    assert_eq!(run_value(code), Value::str("cba"));
}

#[test]
fn test_conditions_must_be_bool() {
    assert_eq!(run_code("if (1) { }"), Err(DiagnosticCode::E302));
    assert_eq!(run_code("while (\"yes\") { }"), Err(DiagnosticCode::E302));
}

// --- functions and closures ---

#[test]
fn test_recursion() {
    let code = r#"
        fun fib(n) {
            if (n < 2) { return n; }
            return fib(n - 1) + fib(n - 2);
        }
        fib(10)
    "#;
    assert_eq!(run_value(code), Value::Int(55));
}

#[test]
fn test_arity_mismatch_is_a_runtime_error() {
    let code = "fun add(a, b) { return a + b; } add(1)";
    assert_eq!(run_code(code), Err(DiagnosticCode::E301));
}

#[test]
fn test_closures_share_their_defining_frame() {
    let code = r#"
        fun make() {
            let n = 0;
            let inc = fun () { n = n + 1; return n; };
            let get = fun () { return n; };
            return [inc, get];
        }
        let pair = make();
        pair[0]();
        pair[0]();
        pair[1]()
    "#;
    assert_eq!(run_value(code), Value::Int(2));
}

#[test]
fn test_functions_hoist_within_their_scope() {
    let code = r#"
        fun even(n) { if (n == 0) { return true; } return odd(n - 1); }
        fun odd(n) { if (n == 0) { return false; } return even(n - 1); }
        even(10)
    "#;
    assert_eq!(run_value(code), Value::Bool(true));
}

#[test]
fn test_implicit_return_is_nil() {
    assert_eq!(run_value("fun noop() { } noop()"), Value::Nil);
}

#[test]
fn test_calling_a_non_function_fails() {
    assert_eq!(run_code("let x = 3; x()"), Err(DiagnosticCode::E303));
}

#[test]
fn test_unbounded_recursion_is_cut_off() {
    assert_eq!(run_code("fun f() { return f(); } f()"), Err(DiagnosticCode::E311));
}

// --- arrays and records ---

#[test]
fn test_array_indexing_and_mutation() {
    let code = r#"
        let xs = [10, 20, 30];
        xs[1] = xs[1] + 5;
        xs[1]
    "#;
    assert_eq!(run_value(code), Value::Int(25));
}

#[test]
fn test_array_out_of_bounds() {
    assert_eq!(run_code("[1, 2][5]"), Err(DiagnosticCode::E306));
    assert_eq!(run_code("[1, 2][0 - 1]"), Err(DiagnosticCode::E306));
}

#[test]
fn test_record_fields_and_index_access() {
    let code = r#"
        let user = {name: "ada", age: 36};
        user.age = user.age + 1;
        user["age"]
    "#;
    assert_eq!(run_value(code), Value::Int(37));
}

#[test]
fn test_missing_record_field() {
    assert_eq!(run_code("let r = {a: 1}; r.b"), Err(DiagnosticCode::E306));
}

#[test]
fn test_arrays_have_reference_semantics() {
    let code = r#"
        let a = [1];
        let b = a;
        push(b, 2);
        len(a)
    "#;
    assert_eq!(run_value(code), Value::Int(2));
}

#[test]
fn test_cyclic_array_prints_with_placeholder() {
    let code = r#"
        let a = [1];
        a[0] = a;
        println(a);
    "#;
    assert_eq!(run_output(code), "[[...]]\n");
}

#[test]
fn test_cyclic_structures_compare_without_looping() {
    let code = r#"
        let a = [1];
        a[0] = a;
        let b = [1];
        b[0] = b;
        a == b
    "#;
    assert_eq!(run_value(code), Value::Bool(true));
}

// --- error handling ---

#[test]
fn test_throw_and_catch() {
    let code = r#"
        fun risky(n) {
            if (n < 0) { throw "negative"; }
            return n;
        }
        let msg = "";
        try { risky(0 - 1); } catch (e) { msg = e; }
        msg
    "#;
    assert_eq!(run_value(code), Value::str("negative"));
}

#[test]
fn test_runtime_errors_are_catchable_as_records() {
    let code = r#"
        let caught = nil;
        try { [1][9]; } catch (e) { caught = e.code; }
        caught
    "#;
    assert_eq!(run_value(code), Value::str("E306"));
}

#[test]
fn test_uncaught_throw_is_a_runtime_error() {
    assert_eq!(run_code("throw {reason: \"boom\"}"), Err(DiagnosticCode::E307));
}

#[test]
fn test_throw_unwinds_through_calls_to_the_nearest_handler() {
    let code = r#"
        fun inner() { throw 7; }
        fun outer() { inner(); return 0; }
        let got = nil;
        try { outer(); } catch (e) { got = e; }
        got
    "#;
    assert_eq!(run_value(code), Value::Int(7));
}

// --- diagnostics per phase ---

#[test]
fn test_lexical_errors() {
    assert_eq!(run_code("let x = 1 $ 2;"), Err(DiagnosticCode::E001));
    assert_eq!(run_code("let s = \"open"), Err(DiagnosticCode::E002));
    assert_eq!(run_code("let s = \"a\\qb\";"), Err(DiagnosticCode::E003));
    assert_eq!(run_code("/* never closed"), Err(DiagnosticCode::E004));
}

#[test]
fn test_lone_ampersand_is_lexical() {
    assert_eq!(run_code("true & false"), Err(DiagnosticCode::E001));
}

#[test]
fn test_syntax_errors() {
    assert_eq!(run_code("let = 5;"), Err(DiagnosticCode::E101));
    assert_eq!(run_code("let x = (1 + 2"), Err(DiagnosticCode::E102));
}

#[test]
fn test_undefined_name_is_a_binding_error_before_evaluation() {
    // Resolution fails the whole unit, so the println never runs.
    let buf = Rc::new(RefCell::new(Vec::new()));
    let mut interp = Interpreter::with_output(
        NativeRegistry::standard(),
        OutputSink::Buffer(Rc::clone(&buf)),
    );
    let errs = interp.eval_source("println(\"side effect\"); foo()").unwrap_err();
    assert_eq!(errs[0].code, DiagnosticCode::E201);
    assert_eq!(errs[0].kind(), DiagnosticKind::Binding);
    assert!(buf.borrow().is_empty());
}

#[test]
fn test_misspelled_name_gets_a_suggestion() {
    let mut interp = Interpreter::new(NativeRegistry::standard());
    let errs = interp.eval_source("printl(1)").unwrap_err();
    // 'print' and 'println' are both one edit away.
    let suggestion = errs[0].suggestion.as_deref().expect("should suggest a name");
    assert!(suggestion == "print" || suggestion == "println", "got '{}'", suggestion);
}

#[test]
fn test_binding_errors_for_misplaced_control_flow() {
    assert_eq!(run_code("return 1;"), Err(DiagnosticCode::E203));
    assert_eq!(run_code("break;"), Err(DiagnosticCode::E204));
    assert_eq!(run_code("{ let a = a; }"), Err(DiagnosticCode::E205));
    assert_eq!(run_code("{ let a = 1; let a = 2; }"), Err(DiagnosticCode::E202));
}

// --- builtins and output ---

#[test]
fn test_println_output_is_captured() {
    let out = run_output(r#"println("hello", 1 + 1);"#);
    assert_eq!(out, "hello 2\n");
}

#[test]
fn test_operands_evaluate_left_to_right() {
    let code = r#"
        fun seen(x) { println(x); return x; }
        seen(1) + seen(2) * seen(3);
    "#;
    assert_eq!(run_output(code), "1\n2\n3\n");
}

#[test]
fn test_print_does_not_append_newline() {
    let out = run_output(r#"print("a"); print("b");"#);
    assert_eq!(out, "ab");
}

#[test]
fn test_builtin_pipeline() {
    let code = r#"
        let xs = range(1, 5);
        let total = 0;
        for (x in xs) { total = total + x; }
        str(total) + ":" + str(len(xs))
    "#;
    assert_eq!(run_value(code), Value::str("10:4"));
}

#[test]
fn test_builtin_failures_are_catchable() {
    let code = r#"
        let seen = nil;
        try { pop([]); } catch (e) { seen = e.code; }
        seen
    "#;
    assert_eq!(run_value(code), Value::str("E308"));
}

#[test]
fn test_type_of_names_every_kind() {
    assert_eq!(run_value("type_of(nil)"), Value::str("nil"));
    assert_eq!(run_value("type_of(1)"), Value::str("int"));
    assert_eq!(run_value("type_of(1.0)"), Value::str("float"));
    assert_eq!(run_value("type_of(true)"), Value::str("bool"));
    assert_eq!(run_value("type_of(\"s\")"), Value::str("string"));
    assert_eq!(run_value("type_of([])"), Value::str("array"));
    assert_eq!(run_value("type_of({})"), Value::str("record"));
    assert_eq!(run_value("type_of(fun () { })"), Value::str("function"));
    assert_eq!(run_value("type_of(println)"), Value::str("native function"));
}

// --- comments and statement termination ---

#[test]
fn test_comments_are_trivia() {
    let code = r#"
        // line comment
        let x = 1; /* block
        comment */ let y = 2;
        x + y
    "#;
    assert_eq!(run_value(code), Value::Int(3));
}

#[test]
fn test_semicolon_optional_before_closing_brace() {
    assert_eq!(run_value("fun f() { return 1 } f()"), Value::Int(1));
}

// --- session persistence (REPL shape) ---

#[test]
fn test_state_persists_across_evaluations() {
    let mut interp = Interpreter::new(NativeRegistry::standard());
    interp.eval_source("let base = 100;").unwrap();
    interp.eval_source("fun bump(n) { return base + n; }").unwrap();
    assert_eq!(interp.eval_source("bump(1)").unwrap(), Value::Int(101));

    // Rebinding a global is visible to previously defined functions.
    interp.eval_source("base = 200;").unwrap();
    assert_eq!(interp.eval_source("bump(1)").unwrap(), Value::Int(201));
}

#[test]
fn test_failed_unit_leaves_earlier_state_intact() {
    let mut interp = Interpreter::new(NativeRegistry::standard());
    interp.eval_source("let x = 1;").unwrap();
    assert!(interp.eval_source("nope()").is_err());
    assert_eq!(interp.eval_source("x").unwrap(), Value::Int(1));
}
