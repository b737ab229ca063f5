//! Syntax tree for compiled rules

use crate::Value;

/// A parsed rule body
#[derive(Debug, Clone, PartialEq)]
pub enum Program {
    /// A single bare expression; its value is the result
    Expression(Expr),
    /// A statement block; only `return` produces a result
    Block(Vec<Stmt>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `let`/`const`/`var` declaration
    Let { name: String, init: Option<Expr> },
    /// Assignment to a variable or a member path rooted at one
    Assign {
        target: Place,
        op: AssignOp,
        value: Expr,
    },
    Return(Option<Expr>),
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Vec<Stmt>,
    },
    Block(Vec<Stmt>),
    Expr(Expr),
}

/// An assignable location: `name`, `name.a`, `name[0].b`, ...
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub root: String,
    pub path: Vec<Property>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// `undefined`: the absence of a value, distinct from `null`
    Undefined,
    Ident(String),
    Array(Vec<Element>),
    Object(Vec<Entry>),
    Member {
        object: Box<Expr>,
        property: Property,
        optional: bool,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Element>,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
}

/// Member access key
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Name(String),
    Index(Box<Expr>),
}

/// Array literal or call argument element
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Item(Expr),
    Spread(Expr),
}

/// Object literal entry
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Field(Key, Expr),
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    Static(String),
    Computed(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    TypeOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    StrictEq,
    StrictNe,
    LooseEq,
    LooseNe,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

impl AssignOp {
    /// The arithmetic operator a compound assignment applies
    pub fn binary(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Set => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Sub => Some(BinaryOp::Sub),
            AssignOp::Mul => Some(BinaryOp::Mul),
            AssignOp::Div => Some(BinaryOp::Div),
        }
    }
}
