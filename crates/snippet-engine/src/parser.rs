//! Lexer and parser for synthesized snippet compilation units.
//!
//! The grammar is the rewritten-snippet language: an `import` header, typed
//! `field` declarations and an evaluation body made of `name = expr;`
//! statements followed by `return expr;`.

use crate::ast::{Accessor, BinaryOp, Expr, ParseError, Span, Stmt, UnaryOp, UnitAst};
use snippet_model::ValueKind;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Int(i64),
    Real(f64),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    Comma,
    Semi,
    Colon,
    Dot,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    EqEq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

pub fn lex(src: &str) -> Result<Vec<Token>, ParseError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < src.len() {
        let start = i;
        let Some(c) = src[i..].chars().next() else {
            break;
        };
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                i += 1;
            }
            '(' => {
                tokens.push(tok(TokenKind::LParen, start, i + 1));
                i += 1;
            }
            ')' => {
                tokens.push(tok(TokenKind::RParen, start, i + 1));
                i += 1;
            }
            ',' => {
                tokens.push(tok(TokenKind::Comma, start, i + 1));
                i += 1;
            }
            ';' => {
                tokens.push(tok(TokenKind::Semi, start, i + 1));
                i += 1;
            }
            ':' => {
                tokens.push(tok(TokenKind::Colon, start, i + 1));
                i += 1;
            }
            '.' => {
                tokens.push(tok(TokenKind::Dot, start, i + 1));
                i += 1;
            }
            '+' => {
                tokens.push(tok(TokenKind::Plus, start, i + 1));
                i += 1;
            }
            '-' => {
                tokens.push(tok(TokenKind::Minus, start, i + 1));
                i += 1;
            }
            '*' => {
                tokens.push(tok(TokenKind::Star, start, i + 1));
                i += 1;
            }
            '/' => {
                tokens.push(tok(TokenKind::Slash, start, i + 1));
                i += 1;
            }
            '%' => {
                tokens.push(tok(TokenKind::Percent, start, i + 1));
                i += 1;
            }
            '=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(tok(TokenKind::EqEq, start, i + 2));
                    i += 2;
                } else {
                    tokens.push(tok(TokenKind::Assign, start, i + 1));
                    i += 1;
                }
            }
            '!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(tok(TokenKind::Ne, start, i + 2));
                    i += 2;
                } else {
                    tokens.push(tok(TokenKind::Bang, start, i + 1));
                    i += 1;
                }
            }
            '<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(tok(TokenKind::Le, start, i + 2));
                    i += 2;
                } else {
                    tokens.push(tok(TokenKind::Lt, start, i + 1));
                    i += 1;
                }
            }
            '>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(tok(TokenKind::Ge, start, i + 2));
                    i += 2;
                } else {
                    tokens.push(tok(TokenKind::Gt, start, i + 1));
                    i += 1;
                }
            }
            '&' => {
                if bytes.get(i + 1) == Some(&b'&') {
                    tokens.push(tok(TokenKind::AndAnd, start, i + 2));
                    i += 2;
                } else {
                    return Err(ParseError::new("expected `&&`", Span::new(start, i + 1)));
                }
            }
            '|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    tokens.push(tok(TokenKind::OrOr, start, i + 2));
                    i += 2;
                } else {
                    return Err(ParseError::new("expected `||`", Span::new(start, i + 1)));
                }
            }
            '\'' | '"' => {
                let (value, end) = lex_string(src, i, c)?;
                tokens.push(tok(TokenKind::Str(value), start, end));
                i = end;
            }
            '0'..='9' => {
                let (kind, end) = lex_number(src, i)?;
                tokens.push(tok(kind, start, end));
                i = end;
            }
            c if unicode_ident::is_xid_start(c) || c == '_' => {
                let mut end = i + c.len_utf8();
                while let Some(ch) = src[end..].chars().next() {
                    if unicode_ident::is_xid_continue(ch) || ch == '_' {
                        end += ch.len_utf8();
                    } else {
                        break;
                    }
                }
                tokens.push(tok(TokenKind::Ident(src[i..end].to_string()), start, end));
                i = end;
            }
            other => {
                return Err(ParseError::new(
                    format!("unexpected character `{other}`"),
                    Span::new(start, start + other.len_utf8()),
                ));
            }
        }
    }
    tokens.push(tok(TokenKind::Eof, src.len(), src.len()));
    Ok(tokens)
}

fn tok(kind: TokenKind, start: usize, end: usize) -> Token {
    Token {
        kind,
        span: Span::new(start, end),
    }
}

fn lex_string(src: &str, start: usize, quote: char) -> Result<(String, usize), ParseError> {
    let mut value = String::new();
    let mut i = start + 1;
    loop {
        let Some(c) = src[i..].chars().next() else {
            return Err(ParseError::new(
                "unterminated string literal",
                Span::new(start, src.len()),
            ));
        };
        match c {
            '\n' => {
                return Err(ParseError::new(
                    "unterminated string literal",
                    Span::new(start, i),
                ));
            }
            '\\' => {
                let Some(esc) = src[i + 1..].chars().next() else {
                    return Err(ParseError::new(
                        "unterminated string literal",
                        Span::new(start, src.len()),
                    ));
                };
                match esc {
                    'n' => value.push('\n'),
                    'r' => value.push('\r'),
                    't' => value.push('\t'),
                    '\\' | '\'' | '"' => value.push(esc),
                    other => {
                        return Err(ParseError::new(
                            format!("invalid escape sequence `\\{other}`"),
                            Span::new(i, i + 1 + other.len_utf8()),
                        ));
                    }
                }
                i += 1 + esc.len_utf8();
            }
            c if c == quote => return Ok((value, i + 1)),
            other => {
                value.push(other);
                i += other.len_utf8();
            }
        }
    }
}

fn lex_number(src: &str, start: usize) -> Result<(TokenKind, usize), ParseError> {
    let bytes = src.as_bytes();
    let mut i = start;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut is_real = false;
    if i < bytes.len() && bytes[i] == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit) {
        is_real = true;
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        if j < bytes.len() && bytes[j].is_ascii_digit() {
            is_real = true;
            i = j;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
        }
    }
    let text = &src[start..i];
    if is_real {
        let n: f64 = text
            .parse()
            .map_err(|_| ParseError::new("invalid number literal", Span::new(start, i)))?;
        Ok((TokenKind::Real(n), i))
    } else {
        let n: i64 = text.parse().map_err(|_| {
            ParseError::new("integer literal out of range", Span::new(start, i))
        })?;
        Ok((TokenKind::Int(n), i))
    }
}

/// Parse a complete synthesized unit (imports, fields, body).
pub fn parse_unit(src: &str) -> Result<UnitAst, ParseError> {
    let tokens = lex(src)?;
    let mut parser = Parser::new(tokens);
    let unit = parser.parse_unit()?;
    parser.expect_eof()?;
    Ok(unit)
}

/// Parse a single expression (used by tests and the lowering diagnostics).
pub fn parse_expression(src: &str) -> Result<Expr, ParseError> {
    let tokens = lex(src)?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expr(0)?;
    parser.expect_eof()?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn bump(&mut self) -> Token {
        let t = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, ParseError> {
        let t = self.peek().clone();
        if &t.kind == kind {
            Ok(self.bump())
        } else {
            Err(ParseError::new(format!("expected {what}"), t.span))
        }
    }

    fn expect_eof(&mut self) -> Result<(), ParseError> {
        let t = self.peek().clone();
        if t.kind == TokenKind::Eof {
            Ok(())
        } else {
            Err(ParseError::new("expected end of input", t.span))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<(String, Span), ParseError> {
        let t = self.peek().clone();
        match t.kind {
            TokenKind::Ident(name) => {
                self.bump();
                Ok((name, t.span))
            }
            _ => Err(ParseError::new(format!("expected {what}"), t.span)),
        }
    }

    fn at_keyword(&self, kw: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(name) if name == kw)
    }

    fn parse_unit(&mut self) -> Result<UnitAst, ParseError> {
        let mut imports = Vec::new();
        while self.at_keyword("import") {
            self.bump();
            let (name, _) = self.expect_ident("module name after `import`")?;
            self.expect(&TokenKind::Semi, "`;` after import")?;
            imports.push(name);
        }

        let mut fields = Vec::new();
        while self.at_keyword("field") {
            self.bump();
            let (name, _) = self.expect_ident("field name after `field`")?;
            self.expect(&TokenKind::Colon, "`:` after field name")?;
            let (kind_name, kind_span) = self.expect_ident("field kind")?;
            let kind = match kind_name.as_str() {
                "Int" => ValueKind::Int,
                "Real" => ValueKind::Real,
                "Text" => ValueKind::Text,
                other => {
                    return Err(ParseError::new(
                        format!("unknown field kind `{other}`"),
                        kind_span,
                    ));
                }
            };
            self.expect(&TokenKind::Semi, "`;` after field declaration")?;
            fields.push((name, kind));
        }

        let mut stmts = Vec::new();
        loop {
            if self.at_keyword("return") {
                self.bump();
                let ret = self.parse_expr(0)?;
                self.expect(&TokenKind::Semi, "`;` after return expression")?;
                return Ok(UnitAst {
                    imports,
                    fields,
                    stmts,
                    ret,
                });
            }
            let (name, span) = match self.peek().kind.clone() {
                TokenKind::Ident(name) => {
                    let span = self.peek().span;
                    self.bump();
                    (name, span)
                }
                _ => {
                    return Err(ParseError::new(
                        "expected statement or `return`",
                        self.peek().span,
                    ));
                }
            };
            if self.peek().kind != TokenKind::Assign {
                return Err(ParseError::new(
                    format!("expected `=` after `{name}` (statements have the form `name = expression;`)"),
                    span,
                ));
            }
            self.bump();
            let value = self.parse_expr(0)?;
            self.expect(&TokenKind::Semi, "`;` after statement")?;
            stmts.push(Stmt { name, value });
        }
    }

    fn parse_expr(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_prefix()?;
        loop {
            let (op, lbp, rbp) = match self.peek().kind {
                TokenKind::OrOr => (BinaryOp::Or, 1, 2),
                TokenKind::AndAnd => (BinaryOp::And, 3, 4),
                TokenKind::EqEq => (BinaryOp::Eq, 5, 6),
                TokenKind::Ne => (BinaryOp::Ne, 5, 6),
                TokenKind::Lt => (BinaryOp::Lt, 7, 8),
                TokenKind::Le => (BinaryOp::Le, 7, 8),
                TokenKind::Gt => (BinaryOp::Gt, 7, 8),
                TokenKind::Ge => (BinaryOp::Ge, 7, 8),
                TokenKind::Plus => (BinaryOp::Add, 9, 10),
                TokenKind::Minus => (BinaryOp::Sub, 9, 10),
                TokenKind::Star => (BinaryOp::Mul, 11, 12),
                TokenKind::Slash => (BinaryOp::Div, 11, 12),
                TokenKind::Percent => (BinaryOp::Mod, 11, 12),
                _ => break,
            };
            if lbp < min_bp {
                break;
            }
            self.bump();
            let rhs = self.parse_expr(rbp)?;
            lhs = Expr::Binary {
                op,
                left: Box::new(lhs),
                right: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ParseError> {
        match self.peek().kind.clone() {
            TokenKind::Minus => {
                self.bump();
                let expr = self.parse_expr(13)?;
                Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    expr: Box::new(expr),
                })
            }
            TokenKind::Bang => {
                self.bump();
                let expr = self.parse_expr(13)?;
                Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(expr),
                })
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_atom()?;
        while self.peek().kind == TokenKind::Dot {
            self.bump();
            let (name, span) = self.expect_ident("accessor name after `.`")?;
            let accessor = match name.as_str() {
                "int" => Accessor::Int,
                "real" => Accessor::Real,
                other => {
                    return Err(ParseError::new(
                        format!("unknown accessor `.{other}()`"),
                        span,
                    ));
                }
            };
            self.expect(&TokenKind::LParen, "`(` after accessor")?;
            self.expect(&TokenKind::RParen, "`)` after accessor")?;
            expr = Expr::Access {
                expr: Box::new(expr),
                accessor,
            };
        }
        Ok(expr)
    }

    fn parse_atom(&mut self) -> Result<Expr, ParseError> {
        let t = self.peek().clone();
        match t.kind {
            TokenKind::Int(n) => {
                self.bump();
                Ok(Expr::IntLit(n))
            }
            TokenKind::Real(n) => {
                self.bump();
                Ok(Expr::RealLit(n))
            }
            TokenKind::Str(s) => {
                self.bump();
                Ok(Expr::TextLit(s))
            }
            TokenKind::Ident(name) => {
                self.bump();
                match name.as_str() {
                    "true" => return Ok(Expr::BoolLit(true)),
                    "false" => return Ok(Expr::BoolLit(false)),
                    _ => {}
                }
                if self.peek().kind == TokenKind::LParen {
                    self.bump();
                    let mut args = Vec::new();
                    if self.peek().kind != TokenKind::RParen {
                        loop {
                            args.push(self.parse_expr(0)?);
                            if self.peek().kind == TokenKind::Comma {
                                self.bump();
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(&TokenKind::RParen, "`)` after arguments")?;
                    Ok(Expr::Call { name, args })
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            TokenKind::LParen => {
                self.bump();
                let expr = self.parse_expr(0)?;
                self.expect(&TokenKind::RParen, "closing `)`")?;
                Ok(expr)
            }
            _ => Err(ParseError::new("expected expression", t.span)),
        }
    }
}
