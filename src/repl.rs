// File: src/repl.rs
//
// Interactive REPL (Read-Eval-Print Loop) for the Klang programming language.
// Provides an interactive shell for executing Klang code with features like:
// - Multi-line input support for functions, loops, and control structures
// - Command history with up/down arrow navigation
// - Special commands (:help, :quit, :clear, :vars, :reset)
// - Persistent global environment across inputs

use crate::interpreter::{Interpreter, Value};
use crate::stdlib::NativeRegistry;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

/// REPL session that maintains interpreter state and handles user interaction.
pub struct Repl {
    interpreter: Interpreter,
    editor: DefaultEditor,
}

impl Repl {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let editor = DefaultEditor::new()?;
        Ok(Repl { interpreter: Interpreter::new(NativeRegistry::standard()), editor })
    }

    fn show_banner(&self) {
        println!(
            "{}",
            format!("Klang REPL v{} - Interactive Shell", env!("CARGO_PKG_VERSION")).bright_cyan()
        );
        println!(
            "  Type {}{} for commands, {}{} to leave",
            ":".bright_blue(),
            "help".bright_yellow(),
            ":".bright_blue(),
            "quit".bright_yellow()
        );
        println!("  {} Leave braces unclosed to continue on the next line", "Tip:".bright_magenta());
        println!();
    }

    /// Starts the REPL loop.
    pub fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.show_banner();

        let mut buffer = String::new();

        loop {
            let prompt = if buffer.is_empty() {
                "klang> ".bright_green().to_string()
            } else {
                ".....> ".bright_blue().to_string()
            };

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let _ = self.editor.add_history_entry(line.as_str());

                    // Commands are only recognized outside multi-line input.
                    if buffer.is_empty() && line.trim().starts_with(':') {
                        if self.handle_command(line.trim()) {
                            continue;
                        } else {
                            break;
                        }
                    }

                    buffer.push_str(&line);
                    buffer.push('\n');

                    if is_input_complete(&buffer) {
                        self.eval_input(&buffer);
                        buffer.clear();
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C (input discarded, :quit to exit)".bright_yellow());
                    buffer.clear();
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "Goodbye!".bright_cyan());
                    break;
                }
                Err(err) => {
                    eprintln!("{} {}", "Error:".bright_red(), err);
                    break;
                }
            }
        }

        Ok(())
    }

    /// Returns true to continue the REPL, false on :quit.
    fn handle_command(&mut self, cmd: &str) -> bool {
        match cmd {
            ":help" | ":h" => {
                self.show_help();
                true
            }
            ":quit" | ":q" | ":exit" => {
                println!("{}", "Goodbye!".bright_cyan());
                false
            }
            ":clear" | ":c" => {
                print!("\x1B[2J\x1B[1;1H");
                self.show_banner();
                true
            }
            ":vars" | ":v" => {
                self.show_variables();
                true
            }
            ":reset" | ":r" => {
                self.interpreter = Interpreter::new(NativeRegistry::standard());
                println!("{}", "Environment reset".bright_green());
                true
            }
            _ => {
                println!(
                    "{} Unknown command: {}. Type {}{} for available commands.",
                    "Error:".bright_red(),
                    cmd.bright_yellow(),
                    ":".bright_blue(),
                    "help".bright_yellow()
                );
                true
            }
        }
    }

    fn show_help(&self) {
        println!();
        println!("{}", "REPL Commands:".bright_cyan().bold());
        println!("  {} or :h   Display this help message", ":help".bright_yellow());
        println!("  {} or :q   Exit the REPL", ":quit".bright_yellow());
        println!("  {} or :c  Clear the screen", ":clear".bright_yellow());
        println!("  {} or :v   Show defined globals", ":vars".bright_yellow());
        println!("  {} or :r  Discard all state and start fresh", ":reset".bright_yellow());
        println!();
        println!("{}", "Multi-line Input:".bright_cyan().bold());
        println!("  Leave braces, brackets or parentheses unclosed to continue");
        println!("  on the next line. Close them to evaluate.");
        println!();
        println!("{}", "Examples:".bright_cyan().bold());
        println!("  {}", "klang> let x = 42;".dimmed());
        println!("  {}", "klang> fun greet(name) {".dimmed());
        println!("  {}", ".....>     println(\"Hello, \" + name);".dimmed());
        println!("  {}", ".....> }".dimmed());
        println!("  {}", "klang> greet(\"World\")".dimmed());
        println!();
    }

    /// Lists user-defined globals. Natives are elided so the listing stays
    /// readable.
    fn show_variables(&self) {
        let entries: Vec<(String, Value)> = self
            .interpreter
            .global_entries()
            .into_iter()
            .filter(|(_, value)| !matches!(value, Value::Native(_)))
            .collect();

        println!();
        if entries.is_empty() {
            println!("  {}", "(no globals defined yet)".dimmed());
        } else {
            println!("{}", "Defined Globals:".bright_cyan().bold());
            for (name, value) in entries {
                println!("  {} = {}", name.bright_yellow(), value.repr());
            }
        }
        println!();
    }

    /// Evaluates one complete input and echoes the resulting value.
    fn eval_input(&mut self, input: &str) {
        if input.trim().is_empty() {
            return;
        }

        match self.interpreter.eval_source(input) {
            Ok(Value::Nil) => {}
            Ok(value) => {
                println!("{} {}", "=>".bright_blue(), value.repr().bright_white());
            }
            Err(diagnostics) => {
                for diagnostic in diagnostics {
                    eprint!("{}", diagnostic);
                }
            }
        }
    }
}

/// True if all delimiters are balanced outside strings and comments, so
/// the buffered input can be handed to the lexer.
fn is_input_complete(input: &str) -> bool {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return true;
    }

    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escape_next = false;
    let mut in_line_comment = false;
    let mut in_block_comment = false;
    let mut chars = trimmed.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_line_comment {
            if ch == '\n' {
                in_line_comment = false;
            }
            continue;
        }
        if in_block_comment {
            if ch == '*' && chars.peek() == Some(&'/') {
                chars.next();
                in_block_comment = false;
            }
            continue;
        }
        if escape_next {
            escape_next = false;
            continue;
        }
        if in_string {
            match ch {
                '\\' => escape_next = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '/' if chars.peek() == Some(&'/') => {
                chars.next();
                in_line_comment = true;
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                in_block_comment = true;
            }
            '{' | '[' | '(' => depth += 1,
            '}' | ']' | ')' => depth -= 1,
            _ => {}
        }
    }

    // A block comment may close on a later line; a string may not, so an
    // unterminated one is handed to the lexer for a real diagnostic instead
    // of a stuck prompt.
    !in_block_comment && depth <= 0
}
