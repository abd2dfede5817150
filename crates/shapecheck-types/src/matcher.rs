//! Structural assignability between expected types and actual literals or types.
//!
//! Rules, in order of precedence:
//!
//! 1. Scalars match only the identical kind, or one admitted by the widening table.
//! 2. A dict literal matches a record when every required field is present with
//!    an assignable value and it carries no undeclared keys.
//! 3. A record type matches a record type by width subtyping.
//! 4. A call matches a signature when its arity is exact and every argument is
//!    assignable; a contextual return type must accept the declared return.
//! 5. Callable types match with contravariant parameters and covariant return.
//!
//! Anything else is a shape mismatch. References the environment cannot
//! resolve are treated as compatible; the checker reports them on its own walk.

use std::fmt;

use shapecheck_ast::{DictEntry, Expr};

use crate::env::TypeEnv;
use crate::types::{CallableType, RecordType, TypeExpr, WideningTable};

/// One step of a path from the root of a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    Argument(usize),
    Return,
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(name) => write!(f, "field {:?}", name),
            PathSegment::Argument(index) => write!(f, "argument {}", index),
            PathSegment::Return => f.write_str("return value"),
        }
    }
}

/// Field/argument path from the root of a match, outermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchPath(Vec<PathSegment>);

impl MatchPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn first(&self) -> Option<&PathSegment> {
        self.0.first()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// `" at <path>"`, or nothing at the root.
    pub fn suffix(&self) -> String {
        if self.is_root() {
            String::new()
        } else {
            format!(" at {}", self)
        }
    }
}

impl fmt::Display for MatchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

/// Why a match failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MismatchReason {
    /// Incompatible types or shapes.
    Incompatible { expected: String, found: String },
    /// A required record key is absent.
    MissingKey(String),
    /// A required record key is only optionally present in the actual record.
    OptionalKey(String),
    /// A dict literal key the record does not declare.
    ExtraKey(String),
    /// Wrong number of arguments or parameters.
    Arity { expected: usize, found: usize },
}

impl fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MismatchReason::Incompatible { expected, found } => {
                write!(f, "expected {}, found {}", expected, found)
            }
            MismatchReason::MissingKey(key) => write!(f, "missing required key {:?}", key),
            MismatchReason::OptionalKey(key) => {
                write!(f, "key {:?} is required but may be missing", key)
            }
            MismatchReason::ExtraKey(key) => write!(f, "unexpected key {:?}", key),
            MismatchReason::Arity { expected, found } => {
                write!(f, "expected {} arguments, found {}", expected, found)
            }
        }
    }
}

/// A failed match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub reason: MismatchReason,
    pub path: MatchPath,
}

impl Mismatch {
    pub fn new(reason: MismatchReason) -> Self {
        Self {
            reason,
            path: MatchPath::root(),
        }
    }

    fn incompatible(expected: impl fmt::Display, found: impl fmt::Display) -> Self {
        Self::new(MismatchReason::Incompatible {
            expected: expected.to_string(),
            found: found.to_string(),
        })
    }

    /// Nest this mismatch under `segment`.
    pub fn within(mut self, segment: PathSegment) -> Self {
        self.path.0.insert(0, segment);
        self
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.reason, self.path.suffix())
    }
}

/// `Ok` or the first mismatch found.
pub type MatchResult = Result<(), Mismatch>;

/// The candidate side of a match.
#[derive(Debug, Clone, Copy)]
pub enum Actual<'a> {
    Literal(&'a Expr),
    Type(&'a TypeExpr),
}

impl<'a> From<&'a Expr> for Actual<'a> {
    fn from(expr: &'a Expr) -> Self {
        Actual::Literal(expr)
    }
}

impl<'a> From<&'a TypeExpr> for Actual<'a> {
    fn from(ty: &'a TypeExpr) -> Self {
        Actual::Type(ty)
    }
}

/// Decides assignability against a resolved environment.
pub struct Matcher<'a> {
    env: &'a TypeEnv,
    widening: &'a WideningTable,
}

impl<'a> Matcher<'a> {
    pub fn new(env: &'a TypeEnv, widening: &'a WideningTable) -> Self {
        Self { env, widening }
    }

    /// Whether `actual` may be used where `expected` is declared.
    ///
    /// A call checked against a callable applies rule 4 with no contextual
    /// return; everywhere else a call stands for its declared return type.
    pub fn is_assignable<'b>(&self, expected: &TypeExpr, actual: impl Into<Actual<'b>>) -> MatchResult {
        let actual: Actual<'b> = actual.into();
        match (expected, actual) {
            (TypeExpr::Callable(sig), Actual::Literal(Expr::Call(_, args, _))) => {
                match self.check_call(sig, args, None).into_iter().next() {
                    Some(mismatch) => Err(mismatch),
                    None => Ok(()),
                }
            }
            (_, Actual::Literal(expr)) => self.match_value(expected, expr),
            (_, Actual::Type(ty)) => self.match_type(expected, ty),
        }
    }

    /// Check a call site against `sig`, one mismatch per failing argument.
    ///
    /// An arity mismatch is reported alone. When `expected_return` is given,
    /// the declared return must be assignable to it.
    pub fn check_call(
        &self,
        sig: &CallableType,
        args: &[Expr],
        expected_return: Option<&TypeExpr>,
    ) -> Vec<Mismatch> {
        if args.len() != sig.arity() {
            return vec![Mismatch::new(MismatchReason::Arity {
                expected: sig.arity(),
                found: args.len(),
            })];
        }

        let mut mismatches: Vec<Mismatch> = sig
            .params()
            .iter()
            .zip(args)
            .enumerate()
            .filter_map(|(i, (param, arg))| {
                self.match_value(&param.ty, arg)
                    .err()
                    .map(|m| m.within(PathSegment::Argument(i)))
            })
            .collect();

        if let Some(expected) = expected_return {
            if let Err(m) = self.match_type(expected, sig.returns()) {
                mismatches.push(m.within(PathSegment::Return));
            }
        }
        mismatches
    }

    /// Match a literal in value position.
    pub fn match_value(&self, expected: &TypeExpr, expr: &Expr) -> MatchResult {
        match (expected, expr) {
            (_, Expr::Name(ident)) => match self.env.value_type(&ident.name) {
                Some(ty) => self.match_type(expected, &ty),
                None => Ok(()),
            },
            (_, Expr::Call(callee, _, _)) => match self.env.callable(&callee.name) {
                Some(sig) => self.match_type(expected, sig.returns()),
                None => Ok(()),
            },
            (TypeExpr::Scalar(kind), Expr::Scalar(literal, _)) => {
                if self.widening.permits(*literal, *kind) {
                    Ok(())
                } else {
                    Err(Mismatch::incompatible(kind, literal))
                }
            }
            (TypeExpr::Record(record), Expr::Dict(entries, _)) => self.match_dict(record, entries),
            _ => Err(Mismatch::incompatible(expected, self.describe(expr))),
        }
    }

    /// Match two declared types.
    pub fn match_type(&self, expected: &TypeExpr, actual: &TypeExpr) -> MatchResult {
        match (expected, actual) {
            (TypeExpr::Scalar(e), TypeExpr::Scalar(a)) => {
                if self.widening.permits(*a, *e) {
                    Ok(())
                } else {
                    Err(Mismatch::incompatible(e, a))
                }
            }
            (TypeExpr::Record(e), TypeExpr::Record(a)) => self.match_records(e, a),
            (TypeExpr::Callable(e), TypeExpr::Callable(a)) => self.match_signatures(e, a),
            _ => Err(Mismatch::incompatible(expected, actual)),
        }
    }

    fn match_dict(&self, record: &RecordType, entries: &[DictEntry]) -> MatchResult {
        for field in record.fields() {
            // Later duplicates win, as they do at runtime.
            match entries.iter().rev().find(|e| e.key == field.name) {
                Some(entry) => self
                    .match_value(&field.ty, &entry.value)
                    .map_err(|m| m.within(PathSegment::Field(field.name.clone())))?,
                None if field.required => {
                    return Err(Mismatch::new(MismatchReason::MissingKey(field.name.clone()))
                        .within(PathSegment::Field(field.name.clone())));
                }
                None => {}
            }
        }

        if let Some(extra) = entries.iter().find(|e| record.field(&e.key).is_none()) {
            return Err(Mismatch::new(MismatchReason::ExtraKey(extra.key.clone()))
                .within(PathSegment::Field(extra.key.clone())));
        }
        Ok(())
    }

    fn match_records(&self, expected: &RecordType, actual: &RecordType) -> MatchResult {
        for field in expected.fields() {
            let segment = || PathSegment::Field(field.name.clone());
            match actual.field(&field.name) {
                Some(found) => {
                    if field.required && !found.required {
                        return Err(Mismatch::new(MismatchReason::OptionalKey(field.name.clone()))
                            .within(segment()));
                    }
                    self.match_type(&field.ty, &found.ty)
                        .map_err(|m| m.within(segment()))?;
                }
                None if field.required => {
                    return Err(Mismatch::new(MismatchReason::MissingKey(field.name.clone()))
                        .within(segment()));
                }
                None => {}
            }
        }
        Ok(())
    }

    fn match_signatures(&self, expected: &CallableType, actual: &CallableType) -> MatchResult {
        if expected.arity() != actual.arity() {
            return Err(Mismatch::new(MismatchReason::Arity {
                expected: expected.arity(),
                found: actual.arity(),
            }));
        }
        for (i, (e, a)) in expected.params().iter().zip(actual.params()).enumerate() {
            self.match_type(&a.ty, &e.ty)
                .map_err(|m| m.within(PathSegment::Argument(i)))?;
        }
        self.match_type(expected.returns(), actual.returns())
            .map_err(|m| m.within(PathSegment::Return))
    }

    /// Render a literal for diagnostics, resolving references where possible.
    pub fn describe(&self, expr: &Expr) -> String {
        match expr {
            Expr::Scalar(kind, _) => kind.to_string(),
            Expr::Dict(entries, _) => {
                let body: Vec<String> = entries
                    .iter()
                    .map(|e| format!("{:?}: {}", e.key, self.describe(&e.value)))
                    .collect();
                format!("{{{}}}", body.join(", "))
            }
            Expr::Call(callee, _, _) => match self.env.callable(&callee.name) {
                Some(sig) => sig.returns().to_string(),
                None => format!("{}(...)", callee.name),
            },
            Expr::Name(ident) => match self.env.value_type(&ident.name) {
                Some(ty) => ty.to_string(),
                None => ident.name.clone(),
            },
        }
    }
}
