//! Syntax tree produced by the parser.

use crate::value::Value;

/// Object roots a rule may read from.
pub const ROOTS: &[&str] = &["consumer", "product", "pool", "entitlement"];

/// Built-in functions callable from expressions.
pub const BUILTINS: &[&str] = &["days", "int", "len"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            Self::And => "&&",
            Self::Or => "||",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Add => "+",
            Self::Sub => "-",
        };
        f.write_str(symbol)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Value),
    Now,
    Root(String),
    Field(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Vec<Stmt>,
    },
    Require {
        condition: Expr,
        message: Expr,
    },
    Error(Expr),
    Warn(Expr),
    Fail(Expr),
    CreatePool {
        product: Expr,
        quantity: Expr,
    },
    Record {
        key: Expr,
        value: Expr,
    },
    Select {
        filter: Option<Expr>,
        order: Option<(Expr, SortOrder)>,
    },
    Return,
}

impl Stmt {
    /// The keyword that introduces this statement.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::If { .. } => "if",
            Self::Require { .. } => "require",
            Self::Error(_) => "error",
            Self::Warn(_) => "warn",
            Self::Fail(_) => "fail",
            Self::CreatePool { .. } => "create_pool",
            Self::Record { .. } => "record",
            Self::Select { .. } => "select",
            Self::Return => "return",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub line: usize,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct Program {
    pub language: Option<String>,
    pub functions: Vec<FunctionDef>,
}
