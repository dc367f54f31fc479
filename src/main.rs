// File: src/main.rs
//
// Main entry point for the kc command-line interface.
// Handles argument parsing and dispatches to the appropriate subcommand
// (run, lex, parse, or repl). Exit codes follow sysexits: 65 for errors in
// the program text, 70 for runtime failures, 74 for I/O failures.

use clap::{Parser as ClapParser, Subcommand};
use klang::errors::{Diagnostic, DiagnosticKind};
use klang::interpreter::Interpreter;
use klang::lexer::Lexer;
use klang::parser::Parser;
use klang::repl::Repl;
use klang::stdlib::NativeRegistry;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const EX_DATAERR: u8 = 65;
const EX_SOFTWARE: u8 = 70;
const EX_IOERR: u8 = 74;

#[derive(ClapParser)]
#[command(
    name = "kc",
    about = "Klang: a small dynamic language",
    version = env!("CARGO_PKG_VERSION"),
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
#[command(arg_required_else_help = true)]
enum Commands {
    /// Run a Klang script file
    Run {
        /// Path to the .k file
        file: PathBuf,
    },

    /// Tokenize a file and dump the token stream
    Lex {
        /// Path to the .k file
        file: PathBuf,

        /// Emit the tokens as JSON
        #[arg(long)]
        json: bool,
    },

    /// Parse a file and dump the AST
    Parse {
        /// Path to the .k file
        file: PathBuf,
    },

    /// Launch the interactive REPL
    Repl,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { file } => cmd_run(&file),
        Commands::Lex { file, json } => cmd_lex(&file, json),
        Commands::Parse { file } => cmd_parse(&file),
        Commands::Repl => match Repl::new().and_then(|mut repl| repl.run()) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("error: {}", err);
                ExitCode::from(EX_IOERR)
            }
        },
    }
}

/// Read a script, enforcing the .k extension the toolchain expects.
fn read_program(path: &Path) -> Result<String, ExitCode> {
    if path.extension().and_then(|ext| ext.to_str()) != Some("k") {
        eprintln!("error: expected a .k file, got '{}'", path.display());
        return Err(ExitCode::from(EX_DATAERR));
    }
    fs::read_to_string(path).map_err(|err| {
        eprintln!("error: cannot read '{}': {}", path.display(), err);
        ExitCode::from(EX_IOERR)
    })
}

/// Print diagnostics with the file name attached and pick the exit code:
/// runtime failures are EX_SOFTWARE, everything static is EX_DATAERR.
fn report(diagnostics: Vec<Diagnostic>, path: &Path) -> ExitCode {
    let mut runtime = false;
    for mut diagnostic in diagnostics {
        if diagnostic.location.file.is_none() {
            diagnostic.location.file = Some(path.display().to_string());
        }
        if diagnostic.kind() == DiagnosticKind::Runtime {
            runtime = true;
        }
        eprint!("{}", diagnostic);
    }
    ExitCode::from(if runtime { EX_SOFTWARE } else { EX_DATAERR })
}

fn cmd_run(path: &Path) -> ExitCode {
    let source = match read_program(path) {
        Ok(source) => source,
        Err(code) => return code,
    };

    let mut interpreter = Interpreter::new(NativeRegistry::standard());
    match interpreter.eval_source(&source) {
        Ok(_) => ExitCode::SUCCESS,
        Err(diagnostics) => report(diagnostics, path),
    }
}

fn cmd_lex(path: &Path, json: bool) -> ExitCode {
    let source = match read_program(path) {
        Ok(source) => source,
        Err(code) => return code,
    };

    match Lexer::tokenize_source(&source) {
        Ok(tokens) => {
            if json {
                match serde_json::to_string_pretty(&tokens) {
                    Ok(out) => println!("{}", out),
                    Err(err) => {
                        eprintln!("error: cannot serialize tokens: {}", err);
                        return ExitCode::from(EX_SOFTWARE);
                    }
                }
            } else {
                for token in &tokens {
                    println!("{}:{}\t{:?}", token.line, token.column, token.kind);
                }
            }
            ExitCode::SUCCESS
        }
        Err(diagnostic) => report(vec![diagnostic.annotate_source(&source)], path),
    }
}

fn cmd_parse(path: &Path) -> ExitCode {
    let source = match read_program(path) {
        Ok(source) => source,
        Err(code) => return code,
    };

    let tokens = match Lexer::tokenize_source(&source) {
        Ok(tokens) => tokens,
        Err(diagnostic) => return report(vec![diagnostic.annotate_source(&source)], path),
    };

    match Parser::new(tokens).parse() {
        Ok(stmts) => {
            println!("{:#?}", stmts);
            ExitCode::SUCCESS
        }
        Err(diagnostics) => report(
            diagnostics.into_iter().map(|d| d.annotate_source(&source)).collect(),
            path,
        ),
    }
}
