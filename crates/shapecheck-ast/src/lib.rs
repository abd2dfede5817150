//! shapecheck syntax tree
//!
//! The shapes an external parser produces for the checker: declarations,
//! statements and literal expressions, each with a byte-offset span.

pub mod span;
pub mod ast;

pub use ast::*;
pub use span::Span;
