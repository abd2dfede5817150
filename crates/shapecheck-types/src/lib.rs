//! Structural type checking for shapecheck modules.
//!
//! This crate provides:
//! - Type definitions and widening rules (`types`)
//! - Type environment for symbol tracking (`env`)
//! - Structural assignability (`matcher`)
//! - Collect/verify checking of whole modules (`checker`)

pub mod types;
pub mod env;
pub mod error;
pub mod matcher;
pub mod checker;

pub use types::{ScalarKind, TypeExpr, WideningTable};
pub use env::TypeEnv;
pub use error::TypeError;
pub use matcher::{MatchResult, Matcher, Mismatch};
pub use checker::{check_module, check_program, CheckOptions, CheckOutcome};
