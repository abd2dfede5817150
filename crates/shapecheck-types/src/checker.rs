//! Type checker for shapecheck modules.
//!
//! A run moves through three phases. **Collect** resolves every top-level
//! record, function signature and global variable, so a call may refer to a
//! function declared further down. **Verify** walks items in source order,
//! checking calls, returns and annotated assignments. **Done** hands back the
//! diagnostics in the order they were found. Nothing is fatal: a failing
//! declaration becomes a diagnostic and the run carries on.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::debug;
use shapecheck_ast::{Expr, Function, Ident, Item, Module, RecordDecl, Span, Stmt, TypeAnnotation};

use crate::env::{Binding, TypeEnv};
use crate::error::TypeError;
use crate::matcher::{Matcher, Mismatch, PathSegment};
use crate::types::{CallableType, Field, Param, ScalarKind, TypeExpr, WideningTable};

/// Options for a checking run.
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// Scalar conversions admitted beyond identity. Empty by default.
    pub widening: WideningTable,
}

impl CheckOptions {
    pub fn with_widening(mut self, widening: WideningTable) -> Self {
        self.widening = widening;
        self
    }
}

/// Diagnostics and the collected environment of one run.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub diagnostics: Vec<TypeError>,
    pub env: TypeEnv,
}

impl CheckOutcome {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn into_result(self) -> Result<TypeEnv, Vec<TypeError>> {
        if self.diagnostics.is_empty() {
            Ok(self.env)
        } else {
            Err(self.diagnostics)
        }
    }
}

/// Type check a complete module.
pub fn check_module(module: &Module, options: &CheckOptions) -> CheckOutcome {
    let mut checker = Checker::new(module, options);
    checker.collect();
    checker.verify();
    checker.finish()
}

/// Type check with default options.
pub fn check_program(module: &Module) -> Result<TypeEnv, Vec<TypeError>> {
    check_module(module, &CheckOptions::default()).into_result()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Collect,
    Verify,
    Done,
}

/// Resolved parameter and return types of one function item.
#[derive(Debug)]
struct Frame {
    params: Vec<(String, Binding)>,
    returns: Option<TypeExpr>,
}

/// What a `return` statement is checked against.
enum ReturnContext {
    Module,
    /// `None` when the declared return type failed to resolve.
    Function(Option<TypeExpr>),
}

/// The type checker state.
struct Checker<'m> {
    module: &'m Module,
    options: &'m CheckOptions,
    phase: Phase,
    env: TypeEnv,
    errors: Vec<TypeError>,
    /// Record declarations by name; the first definition wins.
    record_decls: HashMap<&'m str, &'m RecordDecl>,
    /// Records whose type failed to build.
    failed_records: HashSet<&'m str>,
    /// First span of each top-level record or function name.
    declared: HashMap<&'m str, Span>,
    /// Item indices of declarations that redefine an earlier name.
    shadowed: HashSet<usize>,
    /// Function frames by item index.
    frames: HashMap<usize, Frame>,
}

impl<'m> Checker<'m> {
    fn new(module: &'m Module, options: &'m CheckOptions) -> Self {
        Self {
            module,
            options,
            phase: Phase::Collect,
            env: TypeEnv::new(),
            errors: Vec::new(),
            record_decls: HashMap::new(),
            failed_records: HashSet::new(),
            declared: HashMap::new(),
            shadowed: HashSet::new(),
            frames: HashMap::new(),
        }
    }

    fn collect(&mut self) {
        debug_assert_eq!(self.phase, Phase::Collect);
        let module = self.module;
        debug!("collect: {} items", module.items.len());

        // Records and functions share one namespace.
        for (index, item) in module.items.iter().enumerate() {
            let name = match item {
                Item::Function(func) => &func.name,
                Item::Record(record) => &record.name,
                Item::Stmt(_) => continue,
            };
            if let Some(first) = self.declared.get(name.name.as_str()).copied() {
                self.report(TypeError::DuplicateDefinition {
                    name: name.name.clone(),
                    span: name.span,
                    first,
                });
                self.shadowed.insert(index);
                continue;
            }
            self.declared.insert(&name.name, name.span);
            if let Item::Record(record) = item {
                self.record_decls.insert(&record.name.name, record);
            }
        }

        for (index, item) in module.items.iter().enumerate() {
            if let Item::Record(record) = item {
                if !self.shadowed.contains(&index) {
                    self.resolve_record(&record.name.name, &mut Vec::new());
                }
            }
        }

        for (index, item) in module.items.iter().enumerate() {
            if let Item::Function(func) = item {
                let frame = self.build_frame(func);
                if !self.shadowed.contains(&index) {
                    self.register_function(func, &frame);
                }
                self.frames.insert(index, frame);
            }
        }

        // A global may not rebind a record or function name.
        for item in &module.items {
            if let Item::Stmt(Stmt::Assign { target, annotation, .. }) = item {
                if let Some(first) = self.declared.get(target.name.as_str()).copied() {
                    self.report(TypeError::DuplicateDefinition {
                        name: target.name.clone(),
                        span: target.span,
                        first,
                    });
                    continue;
                }
                self.register_global(target, annotation.as_ref());
            }
        }

        self.phase = Phase::Verify;
        debug!(
            "collect done: {} records, {} functions",
            self.env.record_count(),
            self.env.function_count()
        );
    }

    fn resolve_record(&mut self, name: &'m str, visiting: &mut Vec<&'m str>) -> Option<TypeExpr> {
        if let Some(info) = self.env.get_record(name) {
            return Some(info.ty.clone());
        }
        if self.failed_records.contains(name) {
            return None;
        }
        let decl = *self.record_decls.get(name)?;

        visiting.push(name);
        let built = self.build_record(decl, visiting);
        visiting.pop();

        match built {
            Some(ty) => {
                debug!("record {}: {:?}", name, ty);
                self.env.define_record(name, ty.clone(), decl.span);
                Some(ty)
            }
            None => {
                debug!("record {} failed to resolve", name);
                self.failed_records.insert(name);
                self.env.poison(name);
                None
            }
        }
    }

    fn build_record(&mut self, decl: &'m RecordDecl, visiting: &mut Vec<&'m str>) -> Option<TypeExpr> {
        let mut fields = Vec::new();
        let mut complete = true;

        for base in &decl.bases {
            match self.resolve_record_ref(base, visiting) {
                Some(TypeExpr::Record(inherited)) => fields.extend(inherited.fields().iter().cloned()),
                _ => complete = false,
            }
        }

        for field in &decl.fields {
            match self.resolve_annotation(&field.ty, visiting) {
                Some(ty) => fields.push(Field::new(
                    field.name.name.clone(),
                    ty,
                    field.required.unwrap_or(decl.total),
                )),
                None => complete = false,
            }
        }

        if !complete {
            return None;
        }

        match TypeExpr::record(Some(decl.name.name.clone()), fields) {
            Ok(ty) => Some(ty),
            Err(cause) => {
                self.report(TypeError::MalformedType {
                    name: decl.name.name.clone(),
                    cause,
                    span: decl.name.span,
                });
                None
            }
        }
    }

    fn resolve_record_ref(&mut self, ident: &'m Ident, visiting: &mut Vec<&'m str>) -> Option<TypeExpr> {
        let name = ident.name.as_str();
        if visiting.contains(&name) {
            self.report(TypeError::RecursiveRecord {
                name: ident.name.clone(),
                span: ident.span,
            });
            return None;
        }
        if self.record_decls.contains_key(name) {
            return self.resolve_record(name, visiting);
        }
        self.report(TypeError::UnknownType {
            name: ident.name.clone(),
            span: ident.span,
        });
        None
    }

    /// Resolve an annotation, reporting unknown or recursive names.
    fn resolve_annotation(&mut self, annotation: &'m TypeAnnotation, visiting: &mut Vec<&'m str>) -> Option<TypeExpr> {
        match annotation {
            TypeAnnotation::Named(ident) => match ScalarKind::from_keyword(&ident.name) {
                Some(kind) => Some(TypeExpr::scalar(kind)),
                None => self.resolve_record_ref(ident, visiting),
            },
            TypeAnnotation::Callable { params, returns, .. } => {
                let params: Vec<Option<TypeExpr>> = params
                    .iter()
                    .map(|param| self.resolve_annotation(param, visiting))
                    .collect();
                let returns = self.resolve_annotation(returns, visiting)?;
                let params = params
                    .into_iter()
                    .enumerate()
                    .map(|(i, ty)| ty.map(|ty| Param::new(format!("arg{}", i), ty)))
                    .collect::<Option<Vec<_>>>()?;
                TypeExpr::callable(params, returns).ok()
            }
        }
    }

    fn build_frame(&mut self, func: &'m Function) -> Frame {
        let params = func
            .params
            .iter()
            .map(|param| {
                let binding = self
                    .resolve_annotation(&param.ty, &mut Vec::new())
                    .map_or(Binding::Untyped, Binding::Typed);
                (param.name.name.clone(), binding)
            })
            .collect();
        let returns = self.resolve_annotation(&func.returns, &mut Vec::new());
        Frame { params, returns }
    }

    fn register_function(&mut self, func: &Function, frame: &Frame) {
        let name = &func.name.name;
        let params: Option<Vec<Param>> = frame
            .params
            .iter()
            .map(|(param, binding)| binding.ty().map(|ty| Param::new(param.clone(), ty.clone())))
            .collect();

        let (Some(params), Some(returns)) = (params, frame.returns.clone()) else {
            debug!("function {} has unresolved annotations; poisoned", name);
            self.env.poison(name);
            return;
        };

        match CallableType::new(params, returns) {
            Ok(signature) => {
                debug!("function {}: {}", name, signature);
                self.env.define_function(name, Arc::new(signature), func.span);
            }
            Err(cause) => {
                self.report(TypeError::MalformedType {
                    name: name.clone(),
                    cause,
                    span: func.name.span,
                });
                self.env.poison(name);
            }
        }
    }

    fn register_global(&mut self, target: &Ident, annotation: Option<&'m TypeAnnotation>) {
        let binding = match annotation {
            Some(annotation) => self
                .resolve_annotation(annotation, &mut Vec::new())
                .map_or(Binding::Untyped, Binding::Typed),
            None => Binding::Untyped,
        };
        // The first annotation of a global is its declared type.
        let declared = matches!(self.env.get_local(&target.name), Some(Binding::Typed(_)));
        if !declared {
            self.env.define_local(&target.name, binding);
        }
    }

    fn verify(&mut self) {
        debug_assert_eq!(self.phase, Phase::Verify);
        let module = self.module;
        let globals = Arc::new(self.env.clone());
        let mut module_scope = TypeEnv::within(Arc::clone(&globals));

        for (index, item) in module.items.iter().enumerate() {
            match item {
                Item::Function(func) => self.verify_function(index, func, &globals),
                Item::Record(_) => {}
                Item::Stmt(stmt) => self.verify_stmt(stmt, &mut module_scope, &ReturnContext::Module),
            }
        }

        self.phase = Phase::Done;
    }

    fn verify_function(&mut self, index: usize, func: &'m Function, globals: &Arc<TypeEnv>) {
        debug!("verify function {}", func.name.name);
        let Some(frame) = self.frames.remove(&index) else {
            return;
        };

        let mut scope = TypeEnv::within(Arc::clone(globals));
        for (name, binding) in frame.params {
            scope.define_local(&name, binding);
        }

        let context = ReturnContext::Function(frame.returns);
        for stmt in &func.body {
            self.verify_stmt(stmt, &mut scope, &context);
        }
    }

    fn verify_stmt(&mut self, stmt: &'m Stmt, scope: &mut TypeEnv, context: &ReturnContext) {
        match stmt {
            Stmt::Expr(expr) => self.walk_expr(expr, scope),

            Stmt::Return(value, span) => match (context, value) {
                (ReturnContext::Module, _) => {
                    self.report(TypeError::ReturnOutsideFunction { span: *span });
                    if let Some(value) = value {
                        self.walk_expr(value, scope);
                    }
                }
                (ReturnContext::Function(Some(expected)), Some(value)) => {
                    self.verify_value(expected, value, scope);
                }
                (ReturnContext::Function(Some(expected)), None) => {
                    let none = Expr::Scalar(ScalarKind::None, *span);
                    self.verify_value(expected, &none, scope);
                }
                (ReturnContext::Function(None), Some(value)) => self.walk_expr(value, scope),
                (ReturnContext::Function(None), None) => {}
            },

            Stmt::Assign {
                target,
                annotation,
                value,
                ..
            } => {
                let rebinds_declaration = matches!(context, ReturnContext::Module)
                    && self.declared.contains_key(target.name.as_str());
                if rebinds_declaration {
                    // Reported during collection; the declaration stays in force.
                    self.walk_expr(value, scope);
                    return;
                }
                let binding = match annotation {
                    Some(annotation) => self
                        .resolve_annotation(annotation, &mut Vec::new())
                        .map_or(Binding::Untyped, Binding::Typed),
                    // A plain assignment keeps the name's declared type.
                    None => scope.get_local(&target.name).cloned().unwrap_or(Binding::Untyped),
                };
                match binding.ty() {
                    Some(expected) => self.verify_value(expected, value, scope),
                    None => self.walk_expr(value, scope),
                }
                scope.define_local(&target.name, binding);
            }
        }
    }

    /// Check `expr` in a position declared as `expected`.
    fn verify_value(&mut self, expected: &TypeExpr, expr: &Expr, scope: &TypeEnv) {
        if let Expr::Call(callee, args, span) = expr {
            self.verify_call(callee, args, *span, Some(expected), scope);
            return;
        }

        self.walk_expr(expr, scope);

        let options = self.options;
        let matcher = Matcher::new(scope, &options.widening);
        if let Err(mismatch) = matcher.is_assignable(expected, expr) {
            let found = matcher.describe(expr);
            self.report_mismatch(expected.clone(), found, mismatch, expr.span());
        }
    }

    /// Verify every call and name reference inside `expr`.
    fn walk_expr(&mut self, expr: &Expr, scope: &TypeEnv) {
        match expr {
            Expr::Scalar(..) => {}
            Expr::Dict(entries, _) => {
                for entry in entries {
                    self.walk_expr(&entry.value, scope);
                }
            }
            Expr::Call(callee, args, span) => self.verify_call(callee, args, *span, None, scope),
            Expr::Name(ident) => {
                if !scope.is_bound(&ident.name) {
                    self.report(TypeError::UndefinedName {
                        name: ident.name.clone(),
                        span: ident.span,
                    });
                }
            }
        }
    }

    fn verify_call(
        &mut self,
        callee: &Ident,
        args: &[Expr],
        span: Span,
        context: Option<&TypeExpr>,
        scope: &TypeEnv,
    ) {
        let signature = scope.callable(&callee.name);
        if signature.is_none() {
            match scope.get_local(&callee.name) {
                Some(Binding::Typed(ty)) => self.report(TypeError::NotCallable {
                    name: callee.name.clone(),
                    found: ty.to_string(),
                    span: callee.span,
                }),
                // Poisoned and untyped names are bound but have no signature.
                Some(Binding::Untyped) => {}
                None if !scope.is_bound(&callee.name) => self.report(TypeError::UnknownCallable {
                    name: callee.name.clone(),
                    span: callee.span,
                }),
                None => {}
            }
        }

        for arg in args {
            self.walk_expr(arg, scope);
        }

        let Some(sig) = signature else {
            return;
        };

        let options = self.options;
        let matcher = Matcher::new(scope, &options.widening);
        for mismatch in matcher.check_call(&sig, args, context) {
            let (expected, found, at) = match mismatch.path.first() {
                Some(PathSegment::Argument(i)) => (
                    sig.params()[*i].ty.clone(),
                    matcher.describe(&args[*i]),
                    args[*i].span(),
                ),
                Some(PathSegment::Return) => (
                    context.cloned().unwrap_or_else(|| sig.returns().clone()),
                    sig.returns().to_string(),
                    span,
                ),
                _ => (
                    TypeExpr::Callable(sig.clone()),
                    format!("{}({} arguments)", callee.name, args.len()),
                    span,
                ),
            };
            self.report_mismatch(expected, found, mismatch, at);
        }
    }

    fn report_mismatch(&mut self, expected: TypeExpr, found: String, mismatch: Mismatch, span: Span) {
        self.report(TypeError::Mismatch {
            expected,
            found,
            reason: mismatch.reason,
            path: mismatch.path,
            span,
        });
    }

    /// Record a diagnostic unless an identical one is already recorded.
    ///
    /// Identity includes the span, so distinct violations are only kept
    /// apart when the tree carries distinct spans for them. Trees built
    /// with `Span::default()` everywhere collapse repeats of one violation.
    fn report(&mut self, error: TypeError) {
        if self.errors.iter().any(|e| e.same_as(&error)) {
            debug!("dropping duplicate diagnostic: {}", error);
            return;
        }
        debug!("diagnostic at {:?}: {}", error.span(), error);
        self.errors.push(error);
    }

    fn finish(self) -> CheckOutcome {
        debug_assert_eq!(self.phase, Phase::Done);
        debug!("done: {} diagnostics", self.errors.len());
        CheckOutcome {
            diagnostics: self.errors,
            env: self.env,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::MismatchReason;
    use shapecheck_ast::{DictEntry, FieldDef, Param as AstParam};

    fn sp() -> Span {
        Span::default()
    }

    fn ident(name: &str) -> Ident {
        Ident::new(name, sp())
    }

    fn named(name: &str) -> TypeAnnotation {
        TypeAnnotation::Named(ident(name))
    }

    fn lit(kind: ScalarKind) -> Expr {
        Expr::Scalar(kind, sp())
    }

    fn name(n: &str) -> Expr {
        Expr::Name(ident(n))
    }

    fn call(callee: &str, args: Vec<Expr>) -> Expr {
        Expr::Call(ident(callee), args, sp())
    }

    fn dict(entries: &[(&str, Expr)]) -> Expr {
        Expr::Dict(
            entries
                .iter()
                .map(|(key, value)| DictEntry {
                    key: key.to_string(),
                    value: value.clone(),
                    span: sp(),
                })
                .collect(),
            sp(),
        )
    }

    fn func(name: &str, params: &[(&str, TypeAnnotation)], returns: TypeAnnotation, body: Vec<Stmt>) -> Item {
        Item::Function(Function {
            name: ident(name),
            params: params
                .iter()
                .map(|(n, ty)| AstParam {
                    name: ident(n),
                    ty: ty.clone(),
                    span: sp(),
                })
                .collect(),
            returns,
            body,
            span: sp(),
        })
    }

    fn record(name: &str, bases: &[&str], total: bool, fields: &[(&str, TypeAnnotation, Option<bool>)]) -> Item {
        Item::Record(RecordDecl {
            name: ident(name),
            bases: bases.iter().map(|b| ident(b)).collect(),
            total,
            fields: fields
                .iter()
                .map(|(n, ty, required)| FieldDef {
                    name: ident(n),
                    ty: ty.clone(),
                    required: *required,
                    span: sp(),
                })
                .collect(),
            span: sp(),
        })
    }

    fn my_data() -> Item {
        record(
            "MyData",
            &[],
            true,
            &[("a", named("int"), None), ("b", named("int"), None)],
        )
    }

    fn ret(value: Expr) -> Stmt {
        Stmt::Return(Some(value), sp())
    }

    fn stmt(expr: Expr) -> Item {
        Item::Stmt(Stmt::Expr(expr))
    }

    fn check(items: Vec<Item>) -> Vec<TypeError> {
        check_module(&Module::new(items), &CheckOptions::default()).diagnostics
    }

    /// The sample unit: `foo` returns `True` for `bytes`, `foo(1)` passes an int
    /// for `str`, and `bar({"bar": 0})` misses required keys.
    fn sample() -> Vec<Item> {
        vec![
            func(
                "foo",
                &[("a", named("str"))],
                named("bytes"),
                vec![ret(lit(ScalarKind::Bool))],
            ),
            stmt(call("foo", vec![lit(ScalarKind::Int)])),
            my_data(),
            func(
                "bar",
                &[("data", named("MyData"))],
                named("MyData"),
                vec![ret(name("data"))],
            ),
            stmt(call(
                "bar",
                vec![dict(&[("a", lit(ScalarKind::Int)), ("b", lit(ScalarKind::Int))])],
            )),
            stmt(call("bar", vec![dict(&[("bar", lit(ScalarKind::Int))])])),
        ]
    }

    #[test]
    fn test_check_empty_module() {
        let result = check_program(&Module::default());
        assert!(result.is_ok());
    }

    #[test]
    fn test_sample_reports_each_violation() {
        let errors = check(sample());
        assert_eq!(errors.len(), 3, "{:#?}", errors);

        assert_eq!(errors[0].expected().as_deref(), Some("bytes"));
        assert_eq!(errors[0].actual(), Some("bool"));

        assert_eq!(errors[1].expected().as_deref(), Some("str"));
        assert_eq!(errors[1].actual(), Some("int"));
        assert_eq!(errors[1].path().unwrap().to_string(), "argument 0");

        assert_eq!(errors[2].expected().as_deref(), Some("MyData"));
        assert_eq!(errors[2].actual(), Some("{\"bar\": int}"));
        assert_eq!(errors[2].path().unwrap().to_string(), "argument 0, field \"a\"");
        assert!(matches!(
            &errors[2],
            TypeError::Mismatch { reason: MismatchReason::MissingKey(key), .. } if key == "a"
        ));
    }

    #[test]
    fn test_two_independent_violations_both_reported() {
        let errors = check(vec![
            func("foo", &[("a", named("str"))], named("bytes"), vec![]),
            my_data(),
            func("bar", &[("data", named("MyData"))], named("MyData"), vec![ret(name("data"))]),
            stmt(call("foo", vec![lit(ScalarKind::Int)])),
            stmt(call("bar", vec![dict(&[("bar", lit(ScalarKind::Int))])])),
        ]);
        assert_eq!(errors.len(), 2, "{:#?}", errors);
    }

    #[test]
    fn test_declaration_order_independence() {
        let mut reversed = sample();
        // Move declarations after their uses.
        let decls: Vec<Item> = reversed
            .iter()
            .filter(|item| !matches!(item, Item::Stmt(_)))
            .cloned()
            .collect();
        reversed.retain(|item| matches!(item, Item::Stmt(_)));
        reversed.extend(decls.into_iter().rev());

        let forward: Vec<String> = check(sample()).iter().map(|e| e.to_string()).collect();
        let mut backward: Vec<String> = check(reversed).iter().map(|e| e.to_string()).collect();
        let mut forward_sorted = forward.clone();
        forward_sorted.sort();
        backward.sort();
        assert_eq!(forward_sorted, backward);
    }

    #[test]
    fn test_unknown_callable_is_reported_once_and_run_continues() {
        let errors = check(vec![
            func("foo", &[("a", named("str"))], named("bytes"), vec![]),
            stmt(call("baz", vec![call("foo", vec![lit(ScalarKind::Int)])])),
            stmt(call("foo", vec![lit(ScalarKind::Str)])),
        ]);
        assert_eq!(errors.len(), 2, "{:#?}", errors);
        assert!(matches!(&errors[0], TypeError::UnknownCallable { name, .. } if name == "baz"));
        assert!(matches!(&errors[1], TypeError::Mismatch { .. }));
    }

    #[test]
    fn test_nested_call_in_argument_is_verified() {
        let errors = check(vec![
            func("foo", &[("a", named("str"))], named("bytes"), vec![]),
            func("takes_bytes", &[("b", named("bytes"))], named("None"), vec![]),
            stmt(call("takes_bytes", vec![call("foo", vec![lit(ScalarKind::Int)])])),
            stmt(call("takes_bytes", vec![call("foo", vec![lit(ScalarKind::Str)])])),
        ]);
        assert_eq!(errors.len(), 1, "{:#?}", errors);
        assert_eq!(errors[0].path().unwrap().to_string(), "argument 0");
        assert_eq!(errors[0].expected().as_deref(), Some("str"));
    }

    #[test]
    fn test_nested_call_return_checked_against_parameter() {
        let errors = check(vec![
            func("foo", &[("a", named("str"))], named("bytes"), vec![]),
            func("takes_int", &[("n", named("int"))], named("None"), vec![]),
            stmt(call("takes_int", vec![call("foo", vec![lit(ScalarKind::Str)])])),
        ]);
        assert_eq!(errors.len(), 1, "{:#?}", errors);
        assert_eq!(errors[0].expected().as_deref(), Some("int"));
        assert_eq!(errors[0].actual(), Some("bytes"));
    }

    #[test]
    fn test_returned_call_uses_contextual_return() {
        let errors = check(vec![
            func("foo", &[("a", named("str"))], named("bytes"), vec![]),
            func(
                "wrapper",
                &[("s", named("str"))],
                named("int"),
                vec![ret(call("foo", vec![name("s")]))],
            ),
        ]);
        assert_eq!(errors.len(), 1, "{:#?}", errors);
        assert_eq!(errors[0].path().unwrap().to_string(), "return value");
        assert_eq!(errors[0].expected().as_deref(), Some("int"));
        assert_eq!(errors[0].actual(), Some("bytes"));
    }

    #[test]
    fn test_wrong_arity() {
        let errors = check(vec![
            func("foo", &[("a", named("str"))], named("bytes"), vec![]),
            stmt(call("foo", vec![lit(ScalarKind::Str), lit(ScalarKind::Str)])),
        ]);
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            TypeError::Mismatch { reason: MismatchReason::Arity { expected: 1, found: 2 }, .. }
        ));
    }

    #[test]
    fn test_bare_return_is_none() {
        let errors = check(vec![
            func("f", &[], named("None"), vec![Stmt::Return(None, sp())]),
            func("g", &[], named("int"), vec![Stmt::Return(None, sp())]),
        ]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].actual(), Some("None"));
    }

    #[test]
    fn test_return_outside_function() {
        let errors = check(vec![Item::Stmt(Stmt::Return(None, sp()))]);
        assert!(matches!(&errors[..], [TypeError::ReturnOutsideFunction { .. }]));
    }

    #[test]
    fn test_annotated_assignment_checked_and_bound() {
        let errors = check(vec![
            my_data(),
            func("bar", &[("data", named("MyData"))], named("MyData"), vec![ret(name("data"))]),
            Item::Stmt(Stmt::Assign {
                target: ident("x"),
                annotation: Some(named("MyData")),
                value: dict(&[("a", lit(ScalarKind::Int))]),
                span: sp(),
            }),
            // Plain reassignment keeps the declared type.
            Item::Stmt(Stmt::Assign {
                target: ident("x"),
                annotation: None,
                value: lit(ScalarKind::Str),
                span: sp(),
            }),
            stmt(call("bar", vec![name("x")])),
        ]);
        assert_eq!(errors.len(), 2, "{:#?}", errors);
        assert_eq!(errors[0].path().unwrap().to_string(), "field \"b\"");
        assert_eq!(errors[1].actual(), Some("str"));
    }

    #[test]
    fn test_untyped_variable_matches_anything() {
        let errors = check(vec![
            func("foo", &[("a", named("str"))], named("bytes"), vec![]),
            Item::Stmt(Stmt::Assign {
                target: ident("v"),
                annotation: None,
                value: lit(ScalarKind::Int),
                span: sp(),
            }),
            stmt(call("foo", vec![name("v")])),
        ]);
        assert!(errors.is_empty(), "{:#?}", errors);
    }

    #[test]
    fn test_undefined_name() {
        let errors = check(vec![
            func("foo", &[("a", named("str"))], named("bytes"), vec![]),
            stmt(call("foo", vec![name("missing")])),
        ]);
        assert!(matches!(&errors[..], [TypeError::UndefinedName { name, .. }] if name == "missing"));
    }

    #[test]
    fn test_non_total_record_and_required_marker() {
        let errors = check(vec![
            record(
                "Movie",
                &[],
                false,
                &[("title", named("str"), Some(true)), ("year", named("int"), None)],
            ),
            func("show", &[("m", named("Movie"))], named("None"), vec![]),
            stmt(call("show", vec![dict(&[("title", lit(ScalarKind::Str))])])),
            stmt(call("show", vec![dict(&[("year", lit(ScalarKind::Int))])])),
        ]);
        assert_eq!(errors.len(), 1, "{:#?}", errors);
        assert_eq!(errors[0].path().unwrap().to_string(), "argument 0, field \"title\"");
    }

    #[test]
    fn test_record_inherits_base_fields() {
        let outcome = check_module(
            &Module::new(vec![
                record("Child", &["MyData"], true, &[("c", named("str"), None)]),
                my_data(),
            ]),
            &CheckOptions::default(),
        );
        assert!(outcome.is_clean(), "{:#?}", outcome.diagnostics);
        let child = outcome.env.get_record("Child").unwrap();
        match &child.ty {
            TypeExpr::Record(record) => {
                let names: Vec<_> = record.fields().iter().map(|f| f.name.as_str()).collect();
                assert_eq!(names, ["a", "b", "c"]);
            }
            other => panic!("Expected Record type, got {:?}", other),
        }
    }

    #[test]
    fn test_redeclared_base_field_is_malformed() {
        let errors = check(vec![
            my_data(),
            record("Child", &["MyData"], true, &[("a", named("str"), None)]),
        ]);
        assert!(matches!(&errors[..], [TypeError::MalformedType { name, .. }] if name == "Child"));
    }

    #[test]
    fn test_recursive_record() {
        let errors = check(vec![
            record("A", &[], true, &[("b", named("B"), None)]),
            record("B", &[], true, &[("a", named("A"), None)]),
        ]);
        assert_eq!(errors.len(), 1, "{:#?}", errors);
        assert!(matches!(&errors[0], TypeError::RecursiveRecord { name, .. } if name == "A"));
    }

    #[test]
    fn test_poisoned_function_does_not_cascade() {
        let errors = check(vec![
            func("foo", &[("a", named("Nope"))], named("bytes"), vec![]),
            stmt(call("foo", vec![lit(ScalarKind::Int)])),
        ]);
        assert_eq!(errors.len(), 1, "{:#?}", errors);
        assert!(matches!(&errors[0], TypeError::UnknownType { name, .. } if name == "Nope"));
    }

    #[test]
    fn test_duplicate_parameter_is_malformed() {
        let errors = check(vec![
            func("foo", &[("a", named("str")), ("a", named("int"))], named("bytes"), vec![]),
            stmt(call("foo", vec![lit(ScalarKind::Int)])),
        ]);
        assert_eq!(errors.len(), 1, "{:#?}", errors);
        assert!(matches!(&errors[0], TypeError::MalformedType { .. }));
    }

    #[test]
    fn test_duplicate_definition_keeps_first() {
        let errors = check(vec![
            func("foo", &[("a", named("str"))], named("bytes"), vec![]),
            func("foo", &[("a", named("int"))], named("bytes"), vec![]),
            stmt(call("foo", vec![lit(ScalarKind::Str)])),
        ]);
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], TypeError::DuplicateDefinition { .. }));
    }

    #[test]
    fn test_callable_parameter_is_callable() {
        let callback = TypeAnnotation::Callable {
            params: vec![named("int")],
            returns: Box::new(named("str")),
            span: sp(),
        };
        let errors = check(vec![
            func("fmt", &[("n", named("int"))], named("str"), vec![]),
            func("count", &[("c", named("str"))], named("int"), vec![]),
            func(
                "apply",
                &[("f", callback)],
                named("str"),
                vec![ret(call("f", vec![lit(ScalarKind::Int)]))],
            ),
            stmt(call("apply", vec![name("fmt")])),
            stmt(call("apply", vec![name("count")])),
        ]);
        assert_eq!(errors.len(), 1, "{:#?}", errors);
        assert_eq!(errors[0].path().unwrap().to_string(), "argument 0, argument 0");
    }

    #[test]
    fn test_widening_option() {
        let module = Module::new(vec![
            func("inc", &[("n", named("int"))], named("int"), vec![]),
            stmt(call("inc", vec![lit(ScalarKind::Bool)])),
        ]);
        assert_eq!(check_module(&module, &CheckOptions::default()).diagnostics.len(), 1);

        let options = CheckOptions::default()
            .with_widening(WideningTable::new().allow(ScalarKind::Bool, ScalarKind::Int));
        assert!(check_module(&module, &options).is_clean());
    }

    #[test]
    fn test_duplicate_unknown_type_reported_once() {
        let annotated = Item::Stmt(Stmt::Assign {
            target: ident("g"),
            annotation: Some(named("Missing")),
            value: lit(ScalarKind::Int),
            span: sp(),
        });
        let errors = check(vec![annotated]);
        assert_eq!(errors.len(), 1, "{:#?}", errors);
    }

    fn call_at(callee: &str, args: Vec<Expr>, start: usize) -> Expr {
        let span = Span::new(start, start + callee.len() + 2);
        Expr::Call(Ident::new(callee, Span::new(start, start + callee.len())), args, span)
    }

    fn int_at(start: usize) -> Expr {
        Expr::Scalar(ScalarKind::Int, Span::new(start, start + 1))
    }

    #[test]
    fn test_calling_typed_global_is_reported() {
        let errors = check(vec![
            Item::Stmt(Stmt::Assign {
                target: ident("n"),
                annotation: Some(named("int")),
                value: lit(ScalarKind::Int),
                span: sp(),
            }),
            stmt(call("n", vec![lit(ScalarKind::Int)])),
        ]);
        assert_eq!(errors.len(), 1, "{:#?}", errors);
        assert!(matches!(
            &errors[0],
            TypeError::NotCallable { name, found, .. } if name == "n" && found == "int"
        ));
    }

    #[test]
    fn test_calling_typed_parameter_is_reported() {
        let errors = check(vec![
            my_data(),
            func(
                "run",
                &[("data", named("MyData"))],
                named("None"),
                vec![Stmt::Expr(call("data", vec![name("missing")]))],
            ),
        ]);
        assert_eq!(errors.len(), 2, "{:#?}", errors);
        assert!(matches!(
            &errors[0],
            TypeError::NotCallable { found, .. } if found == "MyData"
        ));
        assert!(matches!(&errors[1], TypeError::UndefinedName { .. }));
    }

    #[test]
    fn test_global_cannot_rebind_function() {
        let errors = check(vec![
            func("foo", &[("a", named("str"))], named("bytes"), vec![]),
            stmt(call_at("foo", vec![int_at(30)], 26)),
            Item::Stmt(Stmt::Assign {
                target: Ident::new("foo", Span::new(40, 43)),
                annotation: None,
                value: int_at(46),
                span: Span::new(40, 47),
            }),
            stmt(call_at("foo", vec![int_at(52)], 48)),
        ]);
        assert_eq!(errors.len(), 3, "{:#?}", errors);
        assert!(matches!(
            &errors[0],
            TypeError::DuplicateDefinition { name, span, .. }
                if name == "foo" && *span == Span::new(40, 43)
        ));
        assert_eq!(errors[1].span(), Span::new(30, 31));
        assert_eq!(errors[1].expected().as_deref(), Some("str"));
        assert_eq!(errors[2].span(), Span::new(52, 53));
    }

    #[test]
    fn test_global_cannot_rebind_record() {
        let errors = check(vec![
            Item::Stmt(Stmt::Assign {
                target: ident("MyData"),
                annotation: None,
                value: lit(ScalarKind::Int),
                span: sp(),
            }),
            my_data(),
        ]);
        assert!(matches!(&errors[..], [TypeError::DuplicateDefinition { name, .. }] if name == "MyData"));
    }

    #[test]
    fn test_dedup_keeps_violations_at_distinct_spans() {
        let foo = func("foo", &[("a", named("str"))], named("bytes"), vec![]);

        let distinct = check(vec![
            foo.clone(),
            stmt(call_at("foo", vec![int_at(4)], 0)),
            stmt(call_at("foo", vec![int_at(11)], 7)),
        ]);
        assert_eq!(distinct.len(), 2, "{:#?}", distinct);

        let collapsed = check(vec![
            foo,
            stmt(call("foo", vec![lit(ScalarKind::Int)])),
            stmt(call("foo", vec![lit(ScalarKind::Int)])),
        ]);
        assert_eq!(collapsed.len(), 1, "{:#?}", collapsed);
    }
}
