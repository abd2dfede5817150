//! Type error definitions.

use miette::Diagnostic;
use shapecheck_ast::Span;
use thiserror::Error;

use crate::matcher::{MatchPath, MismatchReason};
use crate::types::{MalformedTypeError, TypeExpr};

/// A type checking diagnostic.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("type mismatch{}: {reason}", path_suffix(.path))]
    #[diagnostic(code(shapecheck::mismatch))]
    Mismatch {
        expected: TypeExpr,
        found: String,
        reason: MismatchReason,
        path: MatchPath,
        #[label("incompatible value")]
        span: Span,
    },

    #[error("unknown callable: {name}")]
    #[diagnostic(code(shapecheck::unknown_callable))]
    UnknownCallable {
        name: String,
        #[label("not declared in this module")]
        span: Span,
    },

    #[error("'{name}' is not callable: it has type {found}")]
    #[diagnostic(code(shapecheck::not_callable))]
    NotCallable {
        name: String,
        found: String,
        #[label("called here")]
        span: Span,
    },

    #[error("malformed type '{name}': {cause}")]
    #[diagnostic(code(shapecheck::malformed_type))]
    MalformedType {
        name: String,
        cause: MalformedTypeError,
        #[label("declared here")]
        span: Span,
    },

    #[error("unknown type: {name}")]
    #[diagnostic(
        code(shapecheck::unknown_type),
        help("annotations must name a scalar (int, float, str, bytes, bool, None) or a declared record")
    )]
    UnknownType {
        name: String,
        #[label]
        span: Span,
    },

    #[error("record {name} refers to itself")]
    #[diagnostic(code(shapecheck::recursive_record))]
    RecursiveRecord {
        name: String,
        #[label("cycle closes here")]
        span: Span,
    },

    #[error("duplicate definition: {name}")]
    #[diagnostic(code(shapecheck::duplicate_definition))]
    DuplicateDefinition {
        name: String,
        #[label("redefined here")]
        span: Span,
        #[label("first defined here")]
        first: Span,
    },

    #[error("undefined name: {name}")]
    #[diagnostic(code(shapecheck::undefined_name))]
    UndefinedName {
        name: String,
        #[label]
        span: Span,
    },

    #[error("'return' outside function")]
    #[diagnostic(code(shapecheck::return_outside_function))]
    ReturnOutsideFunction {
        #[label]
        span: Span,
    },
}

fn path_suffix(path: &MatchPath) -> String {
    path.suffix()
}

impl TypeError {
    /// Get the source span of this error.
    pub fn span(&self) -> Span {
        match self {
            TypeError::Mismatch { span, .. } => *span,
            TypeError::UnknownCallable { span, .. } => *span,
            TypeError::NotCallable { span, .. } => *span,
            TypeError::MalformedType { span, .. } => *span,
            TypeError::UnknownType { span, .. } => *span,
            TypeError::RecursiveRecord { span, .. } => *span,
            TypeError::DuplicateDefinition { span, .. } => *span,
            TypeError::UndefinedName { span, .. } => *span,
            TypeError::ReturnOutsideFunction { span } => *span,
        }
    }

    /// Stable identifier of the diagnostic kind.
    pub fn code_str(&self) -> &'static str {
        match self {
            TypeError::Mismatch { .. } => "shapecheck::mismatch",
            TypeError::UnknownCallable { .. } => "shapecheck::unknown_callable",
            TypeError::NotCallable { .. } => "shapecheck::not_callable",
            TypeError::MalformedType { .. } => "shapecheck::malformed_type",
            TypeError::UnknownType { .. } => "shapecheck::unknown_type",
            TypeError::RecursiveRecord { .. } => "shapecheck::recursive_record",
            TypeError::DuplicateDefinition { .. } => "shapecheck::duplicate_definition",
            TypeError::UndefinedName { .. } => "shapecheck::undefined_name",
            TypeError::ReturnOutsideFunction { .. } => "shapecheck::return_outside_function",
        }
    }

    /// Rendered expected type, for mismatches.
    pub fn expected(&self) -> Option<String> {
        match self {
            TypeError::Mismatch { expected, .. } => Some(expected.to_string()),
            _ => None,
        }
    }

    /// Rendered actual type or literal, for mismatches.
    pub fn actual(&self) -> Option<&str> {
        match self {
            TypeError::Mismatch { found, .. } => Some(found),
            _ => None,
        }
    }

    pub fn path(&self) -> Option<&MatchPath> {
        match self {
            TypeError::Mismatch { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Duplicate check: same kind, location and types.
    pub fn same_as(&self, other: &TypeError) -> bool {
        match (self, other) {
            (
                TypeError::Mismatch { expected: e1, found: f1, reason: r1, path: p1, span: s1 },
                TypeError::Mismatch { expected: e2, found: f2, reason: r2, path: p2, span: s2 },
            ) => e1.same_as(e2) && f1 == f2 && r1 == r2 && p1 == p2 && s1 == s2,
            _ => self == other,
        }
    }
}
