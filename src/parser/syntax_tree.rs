//! The untyped syntax tree, as produced by the parser.
use std::fmt::{self, Display, Formatter};

#[derive(Debug)]
pub struct Program {
    pub defs: Vec<ExtDef>,
}

/// A top-level definition.
#[derive(Debug)]
pub enum ExtDef {
    /// A global variable declaration, e.g. `int g;`.
    GlobalVars {
        spec: TypeSpec,
        decs: Vec<VarDec>,
        line: u32,
    },
    /// A bare specifier, e.g. `struct Point { int x; int y; };`.
    TypeDef { spec: TypeSpec, line: u32 },
    /// A function definition.
    Function {
        spec: TypeSpec,
        name: String,
        params: Vec<ParamDec>,
        body: Block,
        line: u32,
    },
}

/// A type specifier.
#[derive(Debug)]
pub enum TypeSpec {
    Int,
    /// A struct definition (fields present) or a reference to a previously
    /// defined struct (fields absent).
    Struct {
        name: Option<String>,
        fields: Option<Vec<FieldDef>>,
    },
}

/// One field line inside a struct definition; may declare several fields.
#[derive(Debug)]
pub struct FieldDef {
    pub spec: TypeSpec,
    pub decs: Vec<VarDec>,
    pub line: u32,
}

/// A declarator: a name with zero or more array dimensions, and an
/// optional initialiser.
#[derive(Debug)]
pub struct VarDec {
    pub name: String,
    pub dims: Vec<u32>,
    pub init: Option<Expr>,
    pub line: u32,
}

#[derive(Debug)]
pub struct ParamDec {
    pub spec: TypeSpec,
    pub dec: VarDec,
}

/// A compound statement: local definitions followed by statements.
#[derive(Debug)]
pub struct Block {
    pub defs: Vec<Def>,
    pub stmts: Vec<Stmt>,
}

#[derive(Debug)]
pub struct Def {
    pub spec: TypeSpec,
    pub decs: Vec<VarDec>,
    pub line: u32,
}

#[derive(Debug)]
pub enum Stmt {
    Expr(Expr),
    Block(Block),
    Return {
        value: Expr,
        line: u32,
    },
    If {
        cond: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
}

#[derive(Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub line: u32,
}

#[derive(Debug)]
pub enum ExprKind {
    Literal(i32),
    Identifier(String),
    Assign(Box<Expr>, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Compare(Relop, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Negate(Box<Expr>),
    Call { name: String, args: Vec<Expr> },
    Index { base: Box<Expr>, index: Box<Expr> },
    Member { base: Box<Expr>, field: String },
}

/// An arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}
impl Display for BinOp {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let text = match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        };
        f.write_str(text)
    }
}

/// A relational operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relop {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Neq,
}
impl Display for Relop {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let text = match self {
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Eq => "==",
            Self::Neq => "!=",
        };
        f.write_str(text)
    }
}
