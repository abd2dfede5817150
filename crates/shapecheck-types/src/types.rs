//! Type definitions for shapecheck.
//!
//! A [`TypeExpr`] is built once per declaration and then shared read-only by
//! every site that refers to it; record and callable payloads sit behind `Arc`.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

pub use shapecheck_ast::ScalarKind;

/// A type expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    Scalar(ScalarKind),
    Record(Arc<RecordType>),
    Callable(Arc<CallableType>),
}

/// A structural record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordType {
    /// Declared name, used for rendering only.
    name: Option<String>,
    fields: Vec<Field>,
}

/// A field of a record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: TypeExpr,
    pub required: bool,
}

/// A function signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallableType {
    params: Vec<Param>,
    returns: TypeExpr,
}

/// A positional parameter of a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
}

/// A structurally invalid type declaration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedTypeError {
    #[error("duplicate field '{field}' in record {record}")]
    DuplicateField { record: String, field: String },

    #[error("duplicate parameter '{param}' in signature")]
    DuplicateParam { param: String },
}

impl Field {
    pub fn new(name: impl Into<String>, ty: TypeExpr, required: bool) -> Self {
        Self {
            name: name.into(),
            ty,
            required,
        }
    }

    pub fn required(name: impl Into<String>, ty: TypeExpr) -> Self {
        Self::new(name, ty, true)
    }

    pub fn optional(name: impl Into<String>, ty: TypeExpr) -> Self {
        Self::new(name, ty, false)
    }
}

impl Param {
    pub fn new(name: impl Into<String>, ty: TypeExpr) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

impl TypeExpr {
    pub fn scalar(kind: ScalarKind) -> Self {
        TypeExpr::Scalar(kind)
    }

    /// Build a record type, rejecting duplicate field names.
    pub fn record(name: Option<String>, fields: Vec<Field>) -> Result<Self, MalformedTypeError> {
        RecordType::new(name, fields).map(|record| TypeExpr::Record(Arc::new(record)))
    }

    /// Build a callable type, rejecting duplicate parameter names.
    pub fn callable(params: Vec<Param>, returns: TypeExpr) -> Result<Self, MalformedTypeError> {
        CallableType::new(params, returns).map(|sig| TypeExpr::Callable(Arc::new(sig)))
    }

    /// Identity check used to deduplicate diagnostics. Compatibility is the
    /// matcher's job, not this one.
    pub fn same_as(&self, other: &TypeExpr) -> bool {
        match (self, other) {
            (TypeExpr::Record(a), TypeExpr::Record(b)) => Arc::ptr_eq(a, b) || a == b,
            (TypeExpr::Callable(a), TypeExpr::Callable(b)) => Arc::ptr_eq(a, b) || a == b,
            _ => self == other,
        }
    }
}

impl RecordType {
    pub fn new(name: Option<String>, fields: Vec<Field>) -> Result<Self, MalformedTypeError> {
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(MalformedTypeError::DuplicateField {
                    record: name.clone().unwrap_or_else(|| "<anonymous>".to_string()),
                    field: field.name.clone(),
                });
            }
        }
        Ok(Self { name, fields })
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl CallableType {
    pub fn new(params: Vec<Param>, returns: TypeExpr) -> Result<Self, MalformedTypeError> {
        for (i, param) in params.iter().enumerate() {
            if params[..i].iter().any(|p| p.name == param.name) {
                return Err(MalformedTypeError::DuplicateParam {
                    param: param.name.clone(),
                });
            }
        }
        Ok(Self { params, returns })
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn returns(&self) -> &TypeExpr {
        &self.returns
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Scalar(kind) => write!(f, "{}", kind),
            TypeExpr::Record(record) => write!(f, "{}", record),
            TypeExpr::Callable(sig) => write!(f, "{}", sig),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            return f.write_str(name);
        }
        f.write_str("{")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            let marker = if field.required { "" } else { "?" };
            write!(f, "{}{}: {}", field.name, marker, field.ty)?;
        }
        f.write_str("}")
    }
}

impl fmt::Display for CallableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", param.name, param.ty)?;
        }
        write!(f, ") -> {}", self.returns)
    }
}

/// Explicit scalar widening rules.
///
/// Scalars are invariant: a kind is only assignable to itself unless a rule
/// `from -> to` is registered here. The default table is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WideningTable {
    rules: Vec<(ScalarKind, ScalarKind)>,
}

impl WideningTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `from -> to`. Registering the same rule twice is a no-op.
    pub fn allow(mut self, from: ScalarKind, to: ScalarKind) -> Self {
        self.insert(from, to);
        self
    }

    pub fn insert(&mut self, from: ScalarKind, to: ScalarKind) {
        if from != to && !self.rules.contains(&(from, to)) {
            self.rules.push((from, to));
        }
    }

    /// Whether a value of kind `actual` may be used where `expected` is declared.
    pub fn permits(&self, actual: ScalarKind, expected: ScalarKind) -> bool {
        actual == expected || self.rules.contains(&(actual, expected))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
