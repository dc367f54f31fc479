// File: src/lexer.rs
//
// Lexical analyzer (tokenizer) for the Klang programming language.
// Converts source code text into a stream of tokens for parsing.
//
// Supports:
// - Keywords: let, fun, return, if, else, while, for, in, break, continue,
//   try, catch, throw, true, false, nil
// - Identifiers, integer and float literals
// - String literals with escape sequences (\n, \t, \", \\), single-line only
// - Operators: + - * / % ** = == != < > <= >= && || ! -> ++ --
// - Punctuation: ( ) { } [ ] , ; : .
// - Comments: // to end of line, /* ... */ blocks
//
// Trivia (whitespace and comments) is discarded. The lexer halts at the
// first lexical error; multi-error reporting happens at the parser level.

use crate::errors::{Diagnostic, DiagnosticCode, SourceLocation};
use ahash::AHashMap;
use once_cell::sync::Lazy;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TokenKind {
    Identifier(String),
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Keyword(String),
    Operator(String),
    Punctuation(char),
    Eof,
}

impl TokenKind {
    /// Human-readable description used in "expected X, found Y" messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Identifier(name) => format!("identifier '{}'", name),
            TokenKind::Int(n) => format!("integer literal '{}'", n),
            TokenKind::Float(n) => format!("float literal '{}'", n),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Bool(b) => format!("'{}'", b),
            TokenKind::Keyword(k) => format!("keyword '{}'", k),
            TokenKind::Operator(op) => format!("'{}'", op),
            TokenKind::Punctuation(c) => format!("'{}'", c),
            TokenKind::Eof => "end of input".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    /// Raw source text of the token, exactly as written.
    pub lexeme: String,
    pub line: usize,
    pub column: usize,
    /// Byte offset of the first character in the source text.
    pub offset: usize,
}

impl Token {
    pub fn location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column)
    }
}

static KEYWORDS: Lazy<AHashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut map = AHashMap::new();
    for kw in [
        "let", "fun", "return", "if", "else", "while", "for", "in", "break", "continue", "try",
        "catch", "throw", "nil",
    ] {
        map.insert(kw, kw);
    }
    map
});

/// Tokenizes Klang source code into a vector of tokens.
///
/// Lexing is pure over the input text: the same source always produces the
/// same token stream. The stream always ends with exactly one Eof token.
pub struct Lexer {
    chars: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    offset: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer { chars: source.chars().collect(), position: 0, line: 1, column: 1, offset: 0 }
    }

    /// Convenience wrapper: lex a full source string in one call.
    pub fn tokenize_source(source: &str) -> Result<Vec<Token>, Diagnostic> {
        Lexer::new(source).tokenize()
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, Diagnostic> {
        let mut tokens = Vec::new();

        while !self.is_at_end() {
            let c = self.peek();

            if c == ' ' || c == '\t' || c == '\r' || c == '\n' {
                self.advance();
                continue;
            }

            if c == '/' && self.peek_next() == Some('/') {
                while !self.is_at_end() && self.peek() != '\n' {
                    self.advance();
                }
                continue;
            }

            if c == '/' && self.peek_next() == Some('*') {
                self.skip_block_comment()?;
                continue;
            }

            let start_line = self.line;
            let start_column = self.column;
            let start_offset = self.offset;
            let start_pos = self.position;

            let kind = self.scan_token()?;
            let lexeme: String = self.chars[start_pos..self.position].iter().collect();
            tokens.push(Token {
                kind,
                lexeme,
                line: start_line,
                column: start_column,
                offset: start_offset,
            });
        }

        tokens.push(Token {
            kind: TokenKind::Eof,
            lexeme: String::new(),
            line: self.line,
            column: self.column,
            offset: self.offset,
        });
        Ok(tokens)
    }

    fn scan_token(&mut self) -> Result<TokenKind, Diagnostic> {
        let c = self.peek();

        if c == '"' {
            return self.scan_string();
        }
        if c.is_ascii_digit() {
            return self.scan_number();
        }
        if c.is_alphabetic() || c == '_' {
            return Ok(self.scan_identifier());
        }

        self.advance();
        match c {
            '(' | ')' | '{' | '}' | '[' | ']' | ',' | ';' | ':' | '.' => {
                Ok(TokenKind::Punctuation(c))
            }
            '+' => {
                if self.match_char('+') {
                    Ok(TokenKind::Operator("++".into()))
                } else {
                    Ok(TokenKind::Operator("+".into()))
                }
            }
            '-' => {
                if self.match_char('-') {
                    Ok(TokenKind::Operator("--".into()))
                } else if self.match_char('>') {
                    Ok(TokenKind::Operator("->".into()))
                } else {
                    Ok(TokenKind::Operator("-".into()))
                }
            }
            '*' => {
                if self.match_char('*') {
                    Ok(TokenKind::Operator("**".into()))
                } else {
                    Ok(TokenKind::Operator("*".into()))
                }
            }
            '/' => Ok(TokenKind::Operator("/".into())),
            '%' => Ok(TokenKind::Operator("%".into())),
            '=' => {
                if self.match_char('=') {
                    Ok(TokenKind::Operator("==".into()))
                } else {
                    Ok(TokenKind::Operator("=".into()))
                }
            }
            '!' => {
                if self.match_char('=') {
                    Ok(TokenKind::Operator("!=".into()))
                } else {
                    Ok(TokenKind::Operator("!".into()))
                }
            }
            '<' => {
                if self.match_char('=') {
                    Ok(TokenKind::Operator("<=".into()))
                } else {
                    Ok(TokenKind::Operator("<".into()))
                }
            }
            '>' => {
                if self.match_char('=') {
                    Ok(TokenKind::Operator(">=".into()))
                } else {
                    Ok(TokenKind::Operator(">".into()))
                }
            }
            '&' => {
                if self.match_char('&') {
                    Ok(TokenKind::Operator("&&".into()))
                } else {
                    Err(self
                        .error(DiagnosticCode::E001, "Character '&' is not valid alone")
                        .with_help("Use '&&' for logical AND".into()))
                }
            }
            '|' => {
                if self.match_char('|') {
                    Ok(TokenKind::Operator("||".into()))
                } else {
                    Err(self
                        .error(DiagnosticCode::E001, "Character '|' is not valid alone")
                        .with_help("Use '||' for logical OR".into()))
                }
            }
            _ => Err(self
                .error(DiagnosticCode::E001, &format!("Character '{}' is not valid in Klang", c))
                .with_help("Remove or replace it".into())),
        }
    }

    fn scan_string(&mut self) -> Result<TokenKind, Diagnostic> {
        let open_line = self.line;
        let open_column = self.column;
        self.advance(); // opening quote

        let mut s = String::new();
        loop {
            if self.is_at_end() {
                return Err(Diagnostic::new(
                    DiagnosticCode::E002,
                    "Unterminated string literal".into(),
                    SourceLocation::new(open_line, open_column),
                )
                .with_help("Add a closing quote".into()));
            }

            let c = self.peek();
            if c == '"' {
                self.advance();
                return Ok(TokenKind::Str(s));
            }
            if c == '\n' {
                return Err(Diagnostic::new(
                    DiagnosticCode::E002,
                    "String literal cannot span multiple lines".into(),
                    SourceLocation::new(open_line, open_column),
                )
                .with_help("Close the string before the line break".into()));
            }
            if c == '\\' {
                self.advance();
                if self.is_at_end() {
                    continue; // reported as unterminated on the next loop
                }
                let esc = self.peek();
                self.advance();
                match esc {
                    'n' => s.push('\n'),
                    't' => s.push('\t'),
                    '"' => s.push('"'),
                    '\\' => s.push('\\'),
                    other => {
                        return Err(self
                            .error(
                                DiagnosticCode::E003,
                                &format!("Invalid escape sequence: \\{}", other),
                            )
                            .with_help("Valid escapes are \\n, \\t, \\\" and \\\\".into()));
                    }
                }
                continue;
            }
            s.push(c);
            self.advance();
        }
    }

    fn scan_number(&mut self) -> Result<TokenKind, Diagnostic> {
        let start_line = self.line;
        let start_column = self.column;
        let start = self.position;

        while !self.is_at_end() && self.peek().is_ascii_digit() {
            self.advance();
        }

        let mut is_float = false;
        // A '.' only belongs to the number when followed by a digit, so that
        // method-call syntax on literals stays lexable.
        if !self.is_at_end() && self.peek() == '.' {
            match self.peek_next() {
                Some(d) if d.is_ascii_digit() => {
                    is_float = true;
                    self.advance(); // .
                    while !self.is_at_end() && self.peek().is_ascii_digit() {
                        self.advance();
                    }
                }
                Some(d) if d.is_alphabetic() || d == '_' => {}
                _ => {
                    self.advance();
                    return Err(Diagnostic::new(
                        DiagnosticCode::E005,
                        "Malformed number literal: expected digits after '.'".into(),
                        SourceLocation::new(start_line, start_column),
                    ));
                }
            }
        }

        let text: String = self.chars[start..self.position].iter().collect();
        if is_float {
            match text.parse::<f64>() {
                Ok(n) => Ok(TokenKind::Float(n)),
                Err(_) => Err(Diagnostic::new(
                    DiagnosticCode::E005,
                    format!("Malformed number literal: '{}'", text),
                    SourceLocation::new(start_line, start_column),
                )),
            }
        } else {
            match text.parse::<i64>() {
                Ok(n) => Ok(TokenKind::Int(n)),
                Err(_) => Err(Diagnostic::new(
                    DiagnosticCode::E005,
                    format!("Integer literal '{}' is out of range", text),
                    SourceLocation::new(start_line, start_column),
                )
                .with_note("Integers are 64-bit signed".into())),
            }
        }
    }

    fn scan_identifier(&mut self) -> TokenKind {
        let start = self.position;
        while !self.is_at_end() && (self.peek().is_alphanumeric() || self.peek() == '_') {
            self.advance();
        }
        let ident: String = self.chars[start..self.position].iter().collect();

        match ident.as_str() {
            "true" => TokenKind::Bool(true),
            "false" => TokenKind::Bool(false),
            _ => {
                if KEYWORDS.contains_key(ident.as_str()) {
                    TokenKind::Keyword(ident)
                } else {
                    TokenKind::Identifier(ident)
                }
            }
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), Diagnostic> {
        let open_line = self.line;
        let open_column = self.column;
        self.advance(); // /
        self.advance(); // *

        while !self.is_at_end() {
            if self.peek() == '*' && self.peek_next() == Some('/') {
                self.advance();
                self.advance();
                return Ok(());
            }
            self.advance();
        }

        Err(Diagnostic::new(
            DiagnosticCode::E004,
            "Unterminated block comment".into(),
            SourceLocation::new(open_line, open_column),
        )
        .with_help("Close the comment with */".into()))
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.chars.len()
    }

    fn peek(&self) -> char {
        self.chars[self.position]
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.position + 1).copied()
    }

    fn advance(&mut self) -> char {
        let c = self.chars[self.position];
        self.position += 1;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    fn match_char(&mut self, expected: char) -> bool {
        if !self.is_at_end() && self.peek() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, code: DiagnosticCode, message: &str) -> Diagnostic {
        Diagnostic::new(code, message.to_string(), SourceLocation::new(self.line, self.column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::tokenize_source(source)
            .expect("lexing should succeed")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_keywords_and_identifiers() {
        let ks = kinds("let count = 10;");
        assert_eq!(
            ks,
            vec![
                TokenKind::Keyword("let".into()),
                TokenKind::Identifier("count".into()),
                TokenKind::Operator("=".into()),
                TokenKind::Int(10),
                TokenKind::Punctuation(';'),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn splits_int_and_float_literals() {
        assert_eq!(kinds("42")[0], TokenKind::Int(42));
        assert_eq!(kinds("3.14")[0], TokenKind::Float(3.14));
    }

    #[test]
    fn comments_are_trivia() {
        let ks = kinds("1 // trailing\n/* block\ncomment */ 2");
        assert_eq!(ks, vec![TokenKind::Int(1), TokenKind::Int(2), TokenKind::Eof]);
    }

    #[test]
    fn string_escapes() {
        assert_eq!(kinds(r#""a\n\t\"\\b""#)[0], TokenKind::Str("a\n\t\"\\b".into()));
    }

    #[test]
    fn unterminated_string_is_a_lexical_error() {
        let err = Lexer::tokenize_source("\"abc").unwrap_err();
        assert_eq!(err.code, DiagnosticCode::E002);
        assert_eq!(err.location.line, 1);
    }

    #[test]
    fn newline_in_string_is_a_lexical_error() {
        let err = Lexer::tokenize_source("\"abc\ndef\"").unwrap_err();
        assert_eq!(err.code, DiagnosticCode::E002);
    }

    #[test]
    fn lone_ampersand_is_rejected_with_help() {
        let err = Lexer::tokenize_source("a & b").unwrap_err();
        assert_eq!(err.code, DiagnosticCode::E001);
        assert!(err.help.unwrap().contains("&&"));
    }

    #[test]
    fn unterminated_block_comment_is_reported_at_opening() {
        let err = Lexer::tokenize_source("1 + /* never closed").unwrap_err();
        assert_eq!(err.code, DiagnosticCode::E004);
        assert_eq!(err.location.column, 5);
    }

    #[test]
    fn positions_are_one_based() {
        let tokens = Lexer::tokenize_source("let x\nlet y").unwrap();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[2].line, tokens[2].column), (2, 1));
        assert_eq!((tokens[3].line, tokens[3].column), (2, 5));
        assert_eq!(tokens[0].offset, 0);
        assert_eq!(tokens[2].offset, 6);
        assert_eq!(tokens[3].offset, 10);
    }

    #[test]
    fn relexing_joined_lexemes_reproduces_the_stream() {
        let source = "fun add(a, b) { return a + b; } add(1, 2.5) && !false";
        let first = Lexer::tokenize_source(source).unwrap();
        let joined: Vec<String> = first.iter().map(|t| t.lexeme.clone()).collect();
        let second = Lexer::tokenize_source(&joined.join(" ")).unwrap();
        let first_kinds: Vec<&TokenKind> = first.iter().map(|t| &t.kind).collect();
        let second_kinds: Vec<&TokenKind> = second.iter().map(|t| &t.kind).collect();
        assert_eq!(first_kinds, second_kinds);
    }
}
