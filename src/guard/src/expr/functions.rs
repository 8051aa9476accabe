//! Predicate functions available to rule expressions
//!
//! Functions read the ambient request context passed to the evaluator, not
//! the `#token` / `#user` variables. With no principal bound every identity
//! predicate answers `false`.

use super::error::{ExprError, Result};
use crate::context::RequestContext;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Native function callable from an expression
pub type Function = Arc<dyn Fn(&RequestContext, &[Value]) -> Result<Value> + Send + Sync>;

/// Name → function table
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Function>,
}

impl FunctionRegistry {
    /// Empty table
    pub fn empty() -> Self {
        Self::default()
    }

    /// Table with the built-in identity predicates
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register_predicate("hasRole", |ctx, args| {
            let roles = string_args("hasRole", args)?;
            Ok(ctx.principal().is_some_and(|p| roles.first().is_some_and(|r| p.has_role(r))))
        });
        registry.register_predicate("hasAnyRole", |ctx, args| {
            let roles = string_args("hasAnyRole", args)?;
            Ok(ctx.principal().is_some_and(|p| roles.iter().any(|r| p.has_role(r))))
        });
        registry.register_predicate("hasPermission", |ctx, args| {
            let names = string_args("hasPermission", args)?;
            Ok(ctx.principal().is_some_and(|p| names.first().is_some_and(|n| p.has_permission(n))))
        });
        registry.register_predicate("hasAnyPermission", |ctx, args| {
            let names = string_args("hasAnyPermission", args)?;
            Ok(ctx.principal().is_some_and(|p| names.iter().any(|n| p.has_permission(n))))
        });
        registry.register_predicate("isAuthenticated", |ctx, _| Ok(ctx.is_authenticated()));
        registry.register_predicate("isAnonymous", |ctx, _| Ok(!ctx.is_authenticated()));
        registry.register_predicate("hasUserId", |ctx, args| {
            let ids = string_args("hasUserId", args)?;
            Ok(ctx.principal().is_some_and(|p| ids.first().is_some_and(|id| p.id == *id)))
        });
        registry.register_predicate("hasUsername", |ctx, args| {
            let names = string_args("hasUsername", args)?;
            Ok(ctx.principal()
                .is_some_and(|p| names.first().is_some_and(|n| p.display_name == *n)))
        });
        registry
    }

    /// Register (or replace) a function returning any value
    pub fn register<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&RequestContext, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
    }

    /// Register (or replace) a boolean predicate
    pub fn register_predicate<F>(&mut self, name: impl Into<String>, predicate: F)
    where
        F: Fn(&RequestContext, &[Value]) -> Result<bool> + Send + Sync + 'static,
    {
        self.register(name, move |ctx, args| predicate(ctx, args).map(Value::Bool));
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Invoke `name` with already-evaluated arguments
    pub fn call(&self, name: &str, ctx: &RequestContext, args: &[Value]) -> Result<Value> {
        let function = self
            .get(name)
            .ok_or_else(|| ExprError::UnknownFunction(name.to_string()))?;
        function(ctx, args)
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry").field("functions", &names).finish()
    }
}

/// Flatten string arguments; lists are expanded, nulls dropped
pub fn string_args(function: &str, args: &[Value]) -> Result<Vec<String>> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        push_strings(function, arg, &mut out)?;
    }
    Ok(out)
}

fn push_strings(function: &str, value: &Value, out: &mut Vec<String>) -> Result<()> {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Null => {}
        Value::Array(items) => {
            for item in items {
                push_strings(function, item, out)?;
            }
        }
        other => {
            return Err(ExprError::Function {
                name: function.to_string(),
                message: format!("expected string argument, got {}", other),
            });
        }
    }
    Ok(())
}
