//! Abstract Syntax Tree definitions handed over by the external parser.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::span::Span;

/// A complete checked unit (one source file).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Module {
    /// Top-level items in source order.
    pub items: Vec<Item>,
}

impl Module {
    pub fn new(items: Vec<Item>) -> Self {
        Self { items }
    }

    /// Iterate over the top-level function definitions.
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.items.iter().filter_map(|item| match item {
            Item::Function(func) => Some(func),
            _ => None,
        })
    }

    /// Iterate over the top-level record declarations.
    pub fn records(&self) -> impl Iterator<Item = &RecordDecl> {
        self.items.iter().filter_map(|item| match item {
            Item::Record(record) => Some(record),
            _ => None,
        })
    }
}

/// A top-level item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Item {
    Function(Function),
    Record(RecordDecl),
    Stmt(Stmt),
}

/// A function definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: Ident,
    pub params: Vec<Param>,
    pub returns: TypeAnnotation,
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// A function parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub name: Ident,
    pub ty: TypeAnnotation,
    pub span: Span,
}

/// A structural record declaration (`class MyData(TypedDict): ...`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDecl {
    pub name: Ident,
    /// Records whose fields are inherited, in order.
    #[serde(default)]
    pub bases: Vec<Ident>,
    /// Default requiredness for fields without an explicit marker.
    #[serde(default = "default_total")]
    pub total: bool,
    pub fields: Vec<FieldDef>,
    pub span: Span,
}

fn default_total() -> bool {
    true
}

/// A field definition in a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: Ident,
    pub ty: TypeAnnotation,
    /// Explicit `Required[...]` / `NotRequired[...]` marker.
    #[serde(default)]
    pub required: Option<bool>,
    pub span: Span,
}

/// A type annotation as written in source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TypeAnnotation {
    /// A scalar keyword or the name of a declared record.
    Named(Ident),
    /// `Callable[[A, B], R]`.
    Callable {
        params: Vec<TypeAnnotation>,
        returns: Box<TypeAnnotation>,
        span: Span,
    },
}

/// A statement, either inside a function body or at module level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Stmt {
    Expr(Expr),
    Return(Option<Expr>, Span),
    Assign {
        target: Ident,
        annotation: Option<TypeAnnotation>,
        value: Expr,
        span: Span,
    },
}

/// An identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

/// A literal-shaped expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    /// A scalar literal such as `1`, `"x"`, `b"x"`, `True`, or `None`.
    Scalar(ScalarKind, Span),
    /// A dictionary display with string keys.
    Dict(Vec<DictEntry>, Span),
    /// A call with positional arguments.
    Call(Ident, Vec<Expr>, Span),
    /// A reference to a parameter, variable, or function.
    Name(Ident),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Scalar(_, s) => *s,
            Expr::Dict(_, s) => *s,
            Expr::Call(_, _, s) => *s,
            Expr::Name(ident) => ident.span,
        }
    }
}

/// A `"key": value` entry of a dictionary display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DictEntry {
    pub key: String,
    pub value: Expr,
    pub span: Span,
}

/// The closed set of scalar kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    Int,
    Float,
    Str,
    Bytes,
    Bool,
    None,
}

impl ScalarKind {
    pub const ALL: [ScalarKind; 6] = [
        ScalarKind::Int,
        ScalarKind::Float,
        ScalarKind::Str,
        ScalarKind::Bytes,
        ScalarKind::Bool,
        ScalarKind::None,
    ];

    /// Map an annotation keyword to its kind. Accepts both `None` and `none`.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "int" => Some(ScalarKind::Int),
            "float" => Some(ScalarKind::Float),
            "str" => Some(ScalarKind::Str),
            "bytes" => Some(ScalarKind::Bytes),
            "bool" => Some(ScalarKind::Bool),
            "None" | "none" => Some(ScalarKind::None),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            ScalarKind::Int => "int",
            ScalarKind::Float => "float",
            ScalarKind::Str => "str",
            ScalarKind::Bytes => "bytes",
            ScalarKind::Bool => "bool",
            ScalarKind::None => "None",
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}
