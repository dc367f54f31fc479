// File: src/errors.rs
//
// Diagnostics for the Klang language core.
// Every failure the core can produce, from lexing through evaluation, is a
// Diagnostic carrying a stable code, a message and a source location.
// The CLI front end renders diagnostics; the core only implements Display.

use colored::Colorize;
use std::fmt;

/// Source location information for tracking where code appears in a file.
/// Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
    pub file: Option<String>,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column, file: None }
    }

    pub fn with_file(line: usize, column: usize, file: String) -> Self {
        Self { line, column, file: Some(file) }
    }

    pub fn unknown() -> Self {
        Self { line: 0, column: 0, file: None }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(ref file) = self.file {
            write!(f, "{}:{}:{}", file, self.line, self.column)
        } else {
            write!(f, "{}:{}", self.line, self.column)
        }
    }
}

/// Phases that can report errors. Lexical, Syntax and Binding errors are
/// static and prevent evaluation from starting; Runtime errors occur during
/// evaluation and are distinct from control-flow signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Lexical,
    Syntax,
    Binding,
    Runtime,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DiagnosticKind::Lexical => write!(f, "Lexical Error"),
            DiagnosticKind::Syntax => write!(f, "Syntax Error"),
            DiagnosticKind::Binding => write!(f, "Binding Error"),
            DiagnosticKind::Runtime => write!(f, "Runtime Error"),
        }
    }
}

/// Stable diagnostic codes. E0xx lexical, E1xx syntax, E2xx binding,
/// E3xx runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticCode {
    /// Character is not valid in Klang
    E001,
    /// Unterminated string literal
    E002,
    /// Invalid escape sequence
    E003,
    /// Unterminated block comment
    E004,
    /// Malformed number literal
    E005,
    /// Unexpected token
    E101,
    /// Unexpected end of input
    E102,
    /// Undefined reference
    E201,
    /// Duplicate declaration in the same scope
    E202,
    /// `return` outside a function
    E203,
    /// `break` or `continue` outside a loop
    E204,
    /// Variable read in its own initializer
    E205,
    /// Arity mismatch in a call
    E301,
    /// Operand type mismatch
    E302,
    /// Value is not callable
    E303,
    /// Integer division or remainder by zero
    E304,
    /// Integer overflow
    E305,
    /// Bad index or index out of bounds
    E306,
    /// Uncaught throw
    E307,
    /// Native function failure
    E308,
    /// Evaluation interrupted by the host
    E309,
    /// Name resolved statically but not yet defined at runtime
    E310,
    /// Call depth limit exceeded
    E311,
}

impl DiagnosticCode {
    pub fn kind(self) -> DiagnosticKind {
        match self {
            DiagnosticCode::E001
            | DiagnosticCode::E002
            | DiagnosticCode::E003
            | DiagnosticCode::E004
            | DiagnosticCode::E005 => DiagnosticKind::Lexical,
            DiagnosticCode::E101 | DiagnosticCode::E102 => DiagnosticKind::Syntax,
            DiagnosticCode::E201
            | DiagnosticCode::E202
            | DiagnosticCode::E203
            | DiagnosticCode::E204
            | DiagnosticCode::E205 => DiagnosticKind::Binding,
            DiagnosticCode::E301
            | DiagnosticCode::E302
            | DiagnosticCode::E303
            | DiagnosticCode::E304
            | DiagnosticCode::E305
            | DiagnosticCode::E306
            | DiagnosticCode::E307
            | DiagnosticCode::E308
            | DiagnosticCode::E309
            | DiagnosticCode::E310
            | DiagnosticCode::E311 => DiagnosticKind::Runtime,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A structured error with location information.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub message: String,
    pub location: SourceLocation,
    pub source_line: Option<String>,
    pub suggestion: Option<String>,
    pub help: Option<String>,
    pub note: Option<String>,
}

impl Diagnostic {
    pub fn new(code: DiagnosticCode, message: String, location: SourceLocation) -> Self {
        Self {
            code,
            message,
            location,
            source_line: None,
            suggestion: None,
            help: None,
            note: None,
        }
    }

    pub fn kind(&self) -> DiagnosticKind {
        self.code.kind()
    }

    pub fn with_source(mut self, source_line: String) -> Self {
        self.source_line = Some(source_line);
        self
    }

    pub fn with_suggestion(mut self, suggestion: String) -> Self {
        self.suggestion = Some(suggestion);
        self
    }

    pub fn with_help(mut self, help: String) -> Self {
        self.help = Some(help);
        self
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.note = Some(note);
        self
    }

    /// Attach the offending source line from the full source text, if the
    /// location points into it.
    pub fn annotate_source(mut self, source: &str) -> Self {
        if self.source_line.is_none() && self.location.line > 0 {
            if let Some(line) = source.lines().nth(self.location.line - 1) {
                self.source_line = Some(line.to_string());
            }
        }
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind_str = format!("{} [{}]", self.kind(), self.code);
        writeln!(f, "{}: {}", kind_str.red().bold(), self.message.bold())?;

        let location_str = format!("  --> {}", self.location);
        writeln!(f, "{}", location_str.bright_blue())?;

        if let Some(ref source) = self.source_line {
            let line_num = self.location.line;
            let col_num = self.location.column;

            writeln!(f, "   {}", "|".bright_blue())?;
            writeln!(
                f,
                "{} {} {}",
                format!("{:3}", line_num).bright_blue(),
                "|".bright_blue(),
                source
            )?;
            writeln!(
                f,
                "   {} {}{}",
                "|".bright_blue(),
                " ".repeat(col_num.saturating_sub(1)),
                "^".red().bold()
            )?;
            writeln!(f, "   {}", "|".bright_blue())?;
        }

        if let Some(ref help) = self.help {
            writeln!(
                f,
                "   {} {}",
                "=".bright_yellow(),
                format!("help: {}", help).bright_yellow()
            )?;
        }

        if let Some(ref suggestion) = self.suggestion {
            writeln!(
                f,
                "   {} {}",
                "=".bright_green(),
                format!("Did you mean '{}'?", suggestion).bright_green()
            )?;
        }

        if let Some(ref note) = self.note {
            writeln!(f, "   {} {}", "=".bright_cyan(), format!("note: {}", note).bright_cyan())?;
        }

        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

/// Computes the Levenshtein distance between two strings.
/// Used for "Did you mean?" suggestions on unresolved identifiers.
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let len1 = s1.chars().count();
    let len2 = s2.chars().count();

    if len1 == 0 {
        return len2;
    }
    if len2 == 0 {
        return len1;
    }

    let mut matrix = vec![vec![0; len2 + 1]; len1 + 1];

    for (i, row) in matrix.iter_mut().enumerate().take(len1 + 1) {
        row[0] = i;
    }
    for j in 0..=len2 {
        matrix[0][j] = j;
    }

    let s1_chars: Vec<char> = s1.chars().collect();
    let s2_chars: Vec<char> = s2.chars().collect();

    for i in 1..=len1 {
        for j in 1..=len2 {
            let cost = if s1_chars[i - 1] == s2_chars[j - 1] { 0 } else { 1 };
            matrix[i][j] = std::cmp::min(
                std::cmp::min(
                    matrix[i - 1][j] + 1, // deletion
                    matrix[i][j - 1] + 1, // insertion
                ),
                matrix[i - 1][j - 1] + cost, // substitution
            );
        }
    }

    matrix[len1][len2]
}

/// Find the closest match from a list of candidates using Levenshtein
/// distance. Returns None if no good match is found (distance > 3).
pub fn find_closest_match<'a, I>(target: &str, candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best_match = None;
    let mut best_distance = usize::MAX;

    for candidate in candidates {
        let distance = levenshtein_distance(target, candidate);

        if distance <= 3 && distance < best_distance {
            best_distance = distance;
            best_match = Some(candidate);
        }
    }

    best_match
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_to_their_phase() {
        assert_eq!(DiagnosticCode::E002.kind(), DiagnosticKind::Lexical);
        assert_eq!(DiagnosticCode::E101.kind(), DiagnosticKind::Syntax);
        assert_eq!(DiagnosticCode::E201.kind(), DiagnosticKind::Binding);
        assert_eq!(DiagnosticCode::E302.kind(), DiagnosticKind::Runtime);
    }

    #[test]
    fn closest_match_prefers_small_edits() {
        let names = ["println", "len", "range"];
        assert_eq!(find_closest_match("printn", names.iter().copied()), Some("println"));
        assert_eq!(find_closest_match("zzzzzz", names.iter().copied()), None);
    }

    #[test]
    fn annotate_source_picks_the_right_line() {
        let d = Diagnostic::new(
            DiagnosticCode::E101,
            "unexpected token".into(),
            SourceLocation::new(2, 1),
        )
        .annotate_source("first\nsecond\nthird");
        assert_eq!(d.source_line.as_deref(), Some("second"));
    }
}
