// File: src/parser.rs
//
// Recursive descent parser for the Klang programming language.
// Transforms a sequence of tokens into an Abstract Syntax Tree (AST).
//
// The parser uses a single-token lookahead and advances through the token
// stream as it builds the AST. Expression parsing is precedence-climbing:
//
//   assignment (right) < || < && < equality < comparison
//     < additive < multiplicative < ** (right) < unary < call/index/field
//
// On a malformed construct the parser records a Syntax diagnostic naming the
// expected and found tokens, resynchronizes at the next statement boundary,
// and keeps collecting further errors. Running out of tokens (an unclosed
// delimiter) is reported distinctly (E102) from an unexpected token (E101).

use crate::ast::{Expr, Literal, NodeId, Stmt};
use crate::errors::{Diagnostic, DiagnosticCode, SourceLocation};
use crate::lexer::{Token, TokenKind};

type ParseResult<T> = Result<T, Diagnostic>;

/// Parser maintains position in the token stream and provides methods to
/// parse statements and expressions.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<Diagnostic>,
    next_id: u32,
}

impl Parser {
    /// Creates a new parser from a vector of tokens.
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0, errors: Vec::new(), next_id: 0 }
    }

    /// Parse the entire token stream into one compilation unit.
    ///
    /// Returns every collected Syntax diagnostic if any construct was
    /// malformed; a partial AST is never handed to later phases.
    pub fn parse(mut self) -> Result<Vec<Stmt>, Vec<Diagnostic>> {
        let mut stmts = Vec::new();

        while !self.at_eof() {
            if matches!(self.peek_kind(), TokenKind::Punctuation(';')) {
                self.advance();
                continue;
            }

            match self.parse_stmt() {
                Ok(stmt) => stmts.push(stmt),
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize();
                }
            }
        }

        if self.errors.is_empty() {
            Ok(stmts)
        } else {
            Err(self.errors)
        }
    }

    // --- statements ---

    fn parse_stmt(&mut self) -> ParseResult<Stmt> {
        match self.peek_kind() {
            TokenKind::Keyword(k) if k == "let" => self.parse_let(),
            TokenKind::Keyword(k) if k == "fun" => {
                // `fun name(...)` declares; `fun (...)` is a lambda expression.
                if matches!(self.peek_kind_at(1), TokenKind::Identifier(_)) {
                    self.parse_fun()
                } else {
                    self.parse_expr_stmt()
                }
            }
            TokenKind::Keyword(k) if k == "return" => self.parse_return(),
            TokenKind::Keyword(k) if k == "if" => self.parse_if(),
            TokenKind::Keyword(k) if k == "while" => self.parse_while(),
            TokenKind::Keyword(k) if k == "for" => self.parse_for(),
            TokenKind::Keyword(k) if k == "break" => {
                let location = self.peek_location();
                self.advance();
                self.terminate()?;
                Ok(Stmt::Break { location })
            }
            TokenKind::Keyword(k) if k == "continue" => {
                let location = self.peek_location();
                self.advance();
                self.terminate()?;
                Ok(Stmt::Continue { location })
            }
            TokenKind::Keyword(k) if k == "try" => self.parse_try_catch(),
            TokenKind::Keyword(k) if k == "throw" => self.parse_throw(),
            TokenKind::Punctuation('{') => Ok(Stmt::Block(self.parse_block()?)),
            _ => self.parse_expr_stmt(),
        }
    }

    fn parse_let(&mut self) -> ParseResult<Stmt> {
        let location = self.peek_location();
        self.advance(); // let
        let name = self.expect_identifier("a variable name")?;
        self.expect_operator("=")?;
        let value = self.parse_expr()?;
        self.terminate()?;
        Ok(Stmt::Let { name, value, location })
    }

    fn parse_fun(&mut self) -> ParseResult<Stmt> {
        let location = self.peek_location();
        self.advance(); // fun
        let name = self.expect_identifier("a function name")?;
        let params = self.parse_params()?;
        let body = self.parse_block()?;
        Ok(Stmt::Fun { name, params, body, location })
    }

    fn parse_params(&mut self) -> ParseResult<Vec<String>> {
        self.expect_punct('(')?;
        let mut params = Vec::new();
        if !matches!(self.peek_kind(), TokenKind::Punctuation(')')) {
            loop {
                params.push(self.expect_identifier("a parameter name")?);
                if matches!(self.peek_kind(), TokenKind::Punctuation(',')) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect_punct(')')?;
        Ok(params)
    }

    fn parse_return(&mut self) -> ParseResult<Stmt> {
        let location = self.peek_location();
        self.advance(); // return
        let value = if matches!(
            self.peek_kind(),
            TokenKind::Punctuation(';') | TokenKind::Punctuation('}') | TokenKind::Eof
        ) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.terminate()?;
        Ok(Stmt::Return { value, location })
    }

    fn parse_if(&mut self) -> ParseResult<Stmt> {
        self.advance(); // if
        let condition = self.parse_condition()?;
        let then_branch = self.parse_block()?;

        let else_branch = if matches!(self.peek_kind(), TokenKind::Keyword(k) if k == "else") {
            self.advance(); // else
            if matches!(self.peek_kind(), TokenKind::Keyword(k) if k == "if") {
                // `else if` chains as a single-statement else branch.
                Some(vec![self.parse_if()?])
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };

        Ok(Stmt::If { condition, then_branch, else_branch })
    }

    fn parse_while(&mut self) -> ParseResult<Stmt> {
        self.advance(); // while
        let condition = self.parse_condition()?;
        let body = self.parse_block()?;
        Ok(Stmt::While { condition, body })
    }

    fn parse_for(&mut self) -> ParseResult<Stmt> {
        let location = self.peek_location();
        self.advance(); // for
        self.expect_punct('(')?;
        let var = self.expect_identifier("a loop variable name")?;
        match self.peek_kind() {
            TokenKind::Keyword(k) if k == "in" => {
                self.advance();
            }
            _ => return Err(self.error_here("'in'")),
        }
        let iterable = self.parse_expr()?;
        self.expect_punct(')')?;
        let body = self.parse_block()?;
        Ok(Stmt::For { var, iterable, body, location })
    }

    fn parse_try_catch(&mut self) -> ParseResult<Stmt> {
        self.advance(); // try
        let try_block = self.parse_block()?;
        match self.peek_kind() {
            TokenKind::Keyword(k) if k == "catch" => {
                self.advance();
            }
            _ => return Err(self.error_here("'catch'")),
        }
        self.expect_punct('(')?;
        let catch_var = self.expect_identifier("a catch variable name")?;
        self.expect_punct(')')?;
        let catch_block = self.parse_block()?;
        Ok(Stmt::TryCatch { try_block, catch_var, catch_block })
    }

    fn parse_throw(&mut self) -> ParseResult<Stmt> {
        let location = self.peek_location();
        self.advance(); // throw
        let value = self.parse_expr()?;
        self.terminate()?;
        Ok(Stmt::Throw { value, location })
    }

    fn parse_expr_stmt(&mut self) -> ParseResult<Stmt> {
        let expr = self.parse_expr()?;
        self.terminate()?;
        Ok(Stmt::ExprStmt(expr))
    }

    /// Parenthesized condition, as in `if (cond) { ... }`.
    fn parse_condition(&mut self) -> ParseResult<Expr> {
        self.expect_punct('(')?;
        let condition = self.parse_expr()?;
        self.expect_punct(')')?;
        Ok(condition)
    }

    fn parse_block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect_punct('{')?;
        let mut stmts = Vec::new();
        while !matches!(self.peek_kind(), TokenKind::Punctuation('}') | TokenKind::Eof) {
            if matches!(self.peek_kind(), TokenKind::Punctuation(';')) {
                self.advance();
                continue;
            }
            stmts.push(self.parse_stmt()?);
        }
        self.expect_punct('}')?;
        Ok(stmts)
    }

    /// Consume a statement terminator. A `;` is required between simple
    /// statements but optional before `}` and at end of input.
    fn terminate(&mut self) -> ParseResult<()> {
        match self.peek_kind() {
            TokenKind::Punctuation(';') => {
                self.advance();
                Ok(())
            }
            TokenKind::Punctuation('}') | TokenKind::Eof => Ok(()),
            _ => Err(self.error_here("';'")),
        }
    }

    // --- expressions ---

    fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> ParseResult<Expr> {
        let expr = self.parse_or()?;

        if matches!(self.peek_kind(), TokenKind::Operator(op) if op == "=") {
            let location = self.peek_location();
            self.advance(); // =
            let value = Box::new(self.parse_assignment()?);

            return match expr {
                Expr::Variable { name, id, .. } => Ok(Expr::Assign { name, id, value, location }),
                Expr::Index { object, index, .. } => {
                    Ok(Expr::SetIndex { object, index, value, location })
                }
                Expr::GetField { object, field, .. } => {
                    Ok(Expr::SetField { object, field, value, location })
                }
                other => Err(Diagnostic::new(
                    DiagnosticCode::E101,
                    "Invalid assignment target".into(),
                    other.location().clone(),
                )
                .with_help("Only variables, indexes and record fields can be assigned".into())),
            };
        }

        Ok(expr)
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_and()?;
        while matches!(self.peek_kind(), TokenKind::Operator(op) if op == "||") {
            let location = self.peek_location();
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Logical {
                left: Box::new(left),
                op: "||".into(),
                right: Box::new(right),
                location,
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_equality()?;
        while matches!(self.peek_kind(), TokenKind::Operator(op) if op == "&&") {
            let location = self.peek_location();
            self.advance();
            let right = self.parse_equality()?;
            left = Expr::Logical {
                left: Box::new(left),
                op: "&&".into(),
                right: Box::new(right),
                location,
            };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_comparison()?;
        while matches!(self.peek_kind(), TokenKind::Operator(op) if matches!(op.as_str(), "==" | "!="))
        {
            let (op, location) = self.take_operator();
            let right = self.parse_comparison()?;
            left = Expr::Binary { left: Box::new(left), op, right: Box::new(right), location };
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_additive()?;
        while matches!(self.peek_kind(), TokenKind::Operator(op) if matches!(op.as_str(), "<" | "<=" | ">" | ">="))
        {
            let (op, location) = self.take_operator();
            let right = self.parse_additive()?;
            left = Expr::Binary { left: Box::new(left), op, right: Box::new(right), location };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        while matches!(self.peek_kind(), TokenKind::Operator(op) if matches!(op.as_str(), "+" | "-"))
        {
            let (op, location) = self.take_operator();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary { left: Box::new(left), op, right: Box::new(right), location };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_power()?;
        while matches!(self.peek_kind(), TokenKind::Operator(op) if matches!(op.as_str(), "*" | "/" | "%"))
        {
            let (op, location) = self.take_operator();
            let right = self.parse_power()?;
            left = Expr::Binary { left: Box::new(left), op, right: Box::new(right), location };
        }
        Ok(left)
    }

    fn parse_power(&mut self) -> ParseResult<Expr> {
        let base = self.parse_unary()?;
        if matches!(self.peek_kind(), TokenKind::Operator(op) if op == "**") {
            let (op, location) = self.take_operator();
            // Right-associative: 2 ** 3 ** 2 is 2 ** (3 ** 2).
            let exponent = self.parse_power()?;
            return Ok(Expr::Binary {
                left: Box::new(base),
                op,
                right: Box::new(exponent),
                location,
            });
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        match self.peek_kind() {
            TokenKind::Operator(op) if matches!(op.as_str(), "-" | "!") => {
                let (op, location) = self.take_operator();
                let operand = Box::new(self.parse_unary()?);
                Ok(Expr::Unary { op, operand, location })
            }
            TokenKind::Operator(op) if matches!(op.as_str(), "++" | "--" | "->") => {
                let (op, location) = self.take_operator();
                Err(Diagnostic::new(
                    DiagnosticCode::E101,
                    format!("Operator '{}' is not supported", op),
                    location,
                )
                .with_note("The token is recognised for compatibility but has no meaning".into()))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;

        loop {
            match self.peek_kind() {
                TokenKind::Punctuation('(') => {
                    let location = self.peek_location();
                    self.advance(); // (
                    let mut args = Vec::new();
                    if !matches!(self.peek_kind(), TokenKind::Punctuation(')')) {
                        loop {
                            args.push(self.parse_expr()?);
                            if matches!(self.peek_kind(), TokenKind::Punctuation(',')) {
                                self.advance();
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect_punct(')')?;
                    expr = Expr::Call { callee: Box::new(expr), args, location };
                }
                TokenKind::Punctuation('[') => {
                    let location = self.peek_location();
                    self.advance(); // [
                    let index = Box::new(self.parse_expr()?);
                    self.expect_punct(']')?;
                    expr = Expr::Index { object: Box::new(expr), index, location };
                }
                TokenKind::Punctuation('.') => {
                    let location = self.peek_location();
                    self.advance(); // .
                    let field = self.expect_identifier("a field name")?;
                    expr = Expr::GetField { object: Box::new(expr), field, location };
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let location = self.peek_location();

        match self.peek_kind().clone() {
            TokenKind::Int(n) => {
                self.advance();
                Ok(Expr::Literal { value: Literal::Int(n), location })
            }
            TokenKind::Float(n) => {
                self.advance();
                Ok(Expr::Literal { value: Literal::Float(n), location })
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Literal { value: Literal::Str(s), location })
            }
            TokenKind::Bool(b) => {
                self.advance();
                Ok(Expr::Literal { value: Literal::Bool(b), location })
            }
            TokenKind::Keyword(k) if k == "nil" => {
                self.advance();
                Ok(Expr::Literal { value: Literal::Nil, location })
            }
            TokenKind::Keyword(k) if k == "fun" => self.parse_lambda(),
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Expr::Variable { name, id: self.fresh_id(), location })
            }
            TokenKind::Punctuation('(') => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect_punct(')')?;
                Ok(expr)
            }
            TokenKind::Punctuation('[') => self.parse_array_literal(),
            TokenKind::Punctuation('{') => self.parse_record_literal(),
            _ => Err(self.error_here("an expression")),
        }
    }

    fn parse_lambda(&mut self) -> ParseResult<Expr> {
        let location = self.peek_location();
        self.advance(); // fun
        let params = self.parse_params()?;
        let body = self.parse_block()?;
        Ok(Expr::Lambda { params, body, location })
    }

    fn parse_array_literal(&mut self) -> ParseResult<Expr> {
        let location = self.peek_location();
        self.advance(); // [
        let mut elements = Vec::new();
        if !matches!(self.peek_kind(), TokenKind::Punctuation(']')) {
            loop {
                elements.push(self.parse_expr()?);
                if matches!(self.peek_kind(), TokenKind::Punctuation(',')) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect_punct(']')?;
        Ok(Expr::Array { elements, location })
    }

    fn parse_record_literal(&mut self) -> ParseResult<Expr> {
        let location = self.peek_location();
        self.advance(); // {
        let mut fields = Vec::new();
        if !matches!(self.peek_kind(), TokenKind::Punctuation('}')) {
            loop {
                let key = match self.peek_kind().clone() {
                    TokenKind::Identifier(name) => {
                        self.advance();
                        name
                    }
                    TokenKind::Str(s) => {
                        self.advance();
                        s
                    }
                    _ => return Err(self.error_here("a field name")),
                };
                self.expect_punct(':')?;
                let value = self.parse_expr()?;
                fields.push((key, value));
                if matches!(self.peek_kind(), TokenKind::Punctuation(',')) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect_punct('}')?;
        Ok(Expr::Record { fields, location })
    }

    // --- token stream helpers ---

    fn fresh_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_kind_at(&self, offset: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn peek_location(&self) -> SourceLocation {
        self.peek().location()
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    fn advance(&mut self) -> &Token {
        let idx = self.pos.min(self.tokens.len() - 1);
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        &self.tokens[idx]
    }

    fn take_operator(&mut self) -> (String, SourceLocation) {
        let location = self.peek_location();
        let op = match self.advance().kind {
            TokenKind::Operator(ref op) => op.clone(),
            _ => unreachable!("take_operator called off an operator token"),
        };
        (op, location)
    }

    fn expect_punct(&mut self, c: char) -> ParseResult<()> {
        if matches!(self.peek_kind(), TokenKind::Punctuation(p) if *p == c) {
            self.advance();
            Ok(())
        } else {
            Err(self.error_here(&format!("'{}'", c)))
        }
    }

    fn expect_operator(&mut self, op: &str) -> ParseResult<()> {
        if matches!(self.peek_kind(), TokenKind::Operator(o) if o == op) {
            self.advance();
            Ok(())
        } else {
            Err(self.error_here(&format!("'{}'", op)))
        }
    }

    fn expect_identifier(&mut self, what: &str) -> ParseResult<String> {
        match self.peek_kind().clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error_here(what)),
        }
    }

    /// Build an "expected X, found Y" diagnostic at the current token.
    /// Running out of input gets its own code so an unclosed delimiter is
    /// distinguishable from a misplaced token.
    fn error_here(&self, expected: &str) -> Diagnostic {
        let found = self.peek();
        if matches!(found.kind, TokenKind::Eof) {
            Diagnostic::new(
                DiagnosticCode::E102,
                format!("Unexpected end of input: expected {}", expected),
                found.location(),
            )
            .with_help("Check for a missing closing delimiter".into())
        } else {
            Diagnostic::new(
                DiagnosticCode::E101,
                format!("Expected {}, found {}", expected, found.kind.describe()),
                found.location(),
            )
        }
    }

    /// Skip tokens until a likely statement boundary so that one malformed
    /// construct does not drown everything after it in spurious errors.
    fn synchronize(&mut self) {
        while !self.at_eof() {
            if matches!(self.peek_kind(), TokenKind::Punctuation(';')) {
                self.advance();
                return;
            }
            if matches!(
                self.peek_kind(),
                TokenKind::Keyword(k) if matches!(
                    k.as_str(),
                    "let" | "fun" | "if" | "while" | "for" | "return" | "break" | "continue"
                        | "try" | "throw"
                )
            ) {
                return;
            }
            self.advance();
        }
    }
}
