use serde::{Deserialize, Serialize};
use snippet_model::ValueKind;

/// Byte range into the parsed source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (at {}..{})",
            self.message, self.span.start, self.span.end
        )
    }
}

impl std::error::Error for ParseError {}

impl ParseError {
    #[must_use]
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }

    /// 1-based line of the error position within `src`.
    pub fn line_in(&self, src: &str) -> u32 {
        let upto = self.span.start.min(src.len());
        1 + src[..upto].bytes().filter(|b| *b == b'\n').count() as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

/// Postfix value-extraction accessor (`.int()` / `.real()`), appended by the
/// token rewriter behind numeric column references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accessor {
    Int,
    Real,
}

impl Accessor {
    pub fn name(self) -> &'static str {
        match self {
            Accessor::Int => "int",
            Accessor::Real => "real",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntLit(i64),
    RealLit(f64),
    TextLit(String),
    BoolLit(bool),
    /// Unresolved name; lowering decides local vs field.
    Ident(String),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Access {
        expr: Box<Expr>,
        accessor: Accessor,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

/// `name = expr;` assignment statement introducing (or reassigning) a local.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub name: String,
    pub value: Expr,
}

/// Parsed synthesized compilation unit: import header, field declarations and
/// the evaluation body (statements plus the `return`-wrapped value expression).
#[derive(Debug, Clone, PartialEq)]
pub struct UnitAst {
    pub imports: Vec<String>,
    pub fields: Vec<(String, ValueKind)>,
    pub stmts: Vec<Stmt>,
    pub ret: Expr,
}
