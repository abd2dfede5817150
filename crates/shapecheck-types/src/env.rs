//! Type environment for symbol resolution and scoping.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use shapecheck_ast::Span;

use crate::types::{CallableType, TypeExpr};

/// A type environment that tracks all declared symbols.
#[derive(Debug, Clone, Default)]
pub struct TypeEnv {
    /// Record declarations.
    records: HashMap<String, RecordInfo>,
    /// Function signatures.
    functions: HashMap<String, FunctionInfo>,
    /// Declarations whose types failed to build.
    poisoned: HashSet<String>,
    /// Variables and parameters in the current scope.
    locals: HashMap<String, Binding>,
    /// Parent scope for nested lookups, shared by every child.
    parent: Option<Arc<TypeEnv>>,
}

/// Information about a record declaration.
#[derive(Debug, Clone)]
pub struct RecordInfo {
    pub name: String,
    pub ty: TypeExpr,
    pub span: Span,
}

/// Information about a function.
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub name: String,
    pub signature: Arc<CallableType>,
    pub span: Span,
}

/// What a variable name is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// Declared with an annotation.
    Typed(TypeExpr),
    /// Assigned without an annotation; matches anything.
    Untyped,
}

impl Binding {
    pub fn ty(&self) -> Option<&TypeExpr> {
        match self {
            Binding::Typed(ty) => Some(ty),
            Binding::Untyped => None,
        }
    }
}

impl TypeEnv {
    /// Create a new empty type environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a child scope of `parent`.
    pub fn within(parent: Arc<TypeEnv>) -> Self {
        Self {
            parent: Some(parent),
            ..Self::default()
        }
    }

    /// Register a record.
    pub fn define_record(&mut self, name: &str, ty: TypeExpr, span: Span) {
        self.records.insert(
            name.to_string(),
            RecordInfo {
                name: name.to_string(),
                ty,
                span,
            },
        );
    }

    /// Look up a record by name.
    pub fn get_record(&self, name: &str) -> Option<&RecordInfo> {
        self.records
            .get(name)
            .or_else(|| self.parent.as_ref().and_then(|p| p.get_record(name)))
    }

    /// Register a function.
    pub fn define_function(&mut self, name: &str, signature: Arc<CallableType>, span: Span) {
        self.functions.insert(
            name.to_string(),
            FunctionInfo {
                name: name.to_string(),
                signature,
                span,
            },
        );
    }

    /// Look up a function by name.
    pub fn get_function(&self, name: &str) -> Option<&FunctionInfo> {
        self.functions
            .get(name)
            .or_else(|| self.parent.as_ref().and_then(|p| p.get_function(name)))
    }

    /// Mark a declaration whose type could not be built.
    pub fn poison(&mut self, name: &str) {
        self.poisoned.insert(name.to_string());
    }

    pub fn is_poisoned(&self, name: &str) -> bool {
        self.poisoned.contains(name)
            || self.parent.as_ref().is_some_and(|p| p.is_poisoned(name))
    }

    /// Define a variable or parameter in this scope.
    pub fn define_local(&mut self, name: &str, binding: Binding) {
        self.locals.insert(name.to_string(), binding);
    }

    /// Look up a variable.
    pub fn get_local(&self, name: &str) -> Option<&Binding> {
        self.locals
            .get(name)
            .or_else(|| self.parent.as_ref().and_then(|p| p.get_local(name)))
    }

    /// The declared type of a name used as a value: variables first, then
    /// functions. `None` for untyped or unknown names.
    pub fn value_type(&self, name: &str) -> Option<TypeExpr> {
        if let Some(binding) = self.get_local(name) {
            return binding.ty().cloned();
        }
        self.get_function(name)
            .map(|f| TypeExpr::Callable(f.signature.clone()))
    }

    /// The signature a call to `name` resolves to, if any.
    pub fn callable(&self, name: &str) -> Option<Arc<CallableType>> {
        if let Some(binding) = self.get_local(name) {
            return match binding {
                Binding::Typed(TypeExpr::Callable(sig)) => Some(sig.clone()),
                _ => None,
            };
        }
        self.get_function(name).map(|f| f.signature.clone())
    }

    /// Whether `name` refers to anything at all, typed or not.
    pub fn is_bound(&self, name: &str) -> bool {
        self.get_local(name).is_some()
            || self.get_function(name).is_some()
            || self.get_record(name).is_some()
            || self.is_poisoned(name)
    }

    /// Number of functions declared directly in this scope.
    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    /// Number of records declared directly in this scope.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}
